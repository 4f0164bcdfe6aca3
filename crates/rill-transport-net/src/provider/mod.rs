//! # Tokio 宿主提供者（provider）
//!
//! ## 角色定位（Why）
//! - `rill-core` 的宿主能力契约在 Tokio 运行时上的默认实现：名称解析走
//!   `tokio::net::lookup_host`，TCP 与本地套接字经 `socket2` 构建（地址
//!   复用须在 bind 之前施加，监听积压可配置），事件循环由每连接一个的
//!   接收任务驱动；
//! - 该模块整体位于 `runtime-tokio` 特性之下；关闭特性后，三元组可对接
//!   任意自定义 [`NetHost`] 实现。
//!
//! ## 模块概览（How）
//! - [`TokioNetHost`]：能力入口，持有监听构造参数；
//! - `listener`：被动监听实现，含 TCP 与（Unix 平台的）本地套接字；
//! - `socket`：单连接实现，读半部由接收任务泵入事件流，写半部经
//!   互斥锁串行化。

mod listener;
mod socket;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use rill_core::{Endpoint, NetError, NetHost, Resolve, StreamDialer, StreamListener};

use listener::{TokioStreamDialer, TokioStreamListener};

/// 监听积压的缺省值。
const DEFAULT_BACKLOG: u32 = 128;

/// Tokio 运行时上的宿主网络能力。
///
/// # 教案式说明
/// - **意图 (Why)**：为 Acceptor/Connector 提供开箱即用的宿主实现，
///   测试与示例不必自备套接字设施；
/// - **契约 (What)**：
///   - **前置条件**：所有方法必须在 Tokio 运行时内调用；
///   - `stream_listener`/`stream_dialer` 每次返回全新的能力对象，
///     互不共享状态；
/// - **风险 (Trade-offs)**：解析直接委托给运行时的 `lookup_host`，
///   未实现缓存与多地址择优，族定向解析取首个匹配结果。
#[derive(Clone, Debug)]
pub struct TokioNetHost {
    backlog: u32,
}

impl TokioNetHost {
    /// 以缺省参数创建宿主能力。
    pub fn new() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
        }
    }

    /// 调整监听积压。
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }
}

impl Default for TokioNetHost {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析 authority 并保留首个满足谓词的端点。
async fn resolve_first(
    authority: &str,
    keep: fn(&SocketAddr) -> bool,
) -> Result<Endpoint, NetError> {
    let addrs = tokio::net::lookup_host(authority)
        .await
        .map_err(|error| NetError::resolve(authority, error))?;
    addrs
        .filter(keep)
        .map(Endpoint::from)
        .next()
        .ok_or_else(|| NetError::resolve_empty(authority))
}

#[async_trait]
impl Resolve for TokioNetHost {
    async fn resolve_ip(&self, authority: &str) -> Result<Endpoint, NetError> {
        resolve_first(authority, |_| true).await
    }

    async fn resolve_ip4(&self, authority: &str) -> Result<Endpoint, NetError> {
        resolve_first(authority, SocketAddr::is_ipv4).await
    }

    async fn resolve_ip6(&self, authority: &str) -> Result<Endpoint, NetError> {
        resolve_first(authority, SocketAddr::is_ipv6).await
    }
}

#[async_trait]
impl NetHost for TokioNetHost {
    async fn stream_listener(&self) -> Result<Arc<dyn StreamListener>, NetError> {
        Ok(Arc::new(TokioStreamListener::new(self.backlog)))
    }

    async fn stream_dialer(&self) -> Result<Arc<dyn StreamDialer>, NetError> {
        Ok(Arc::new(TokioStreamDialer::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 字面量 authority 的族定向解析各取其族，不匹配时报解析失败。
    #[tokio::test]
    async fn literal_resolution_honours_family() {
        let host = TokioNetHost::new();
        let v4 = host
            .resolve_ip4("127.0.0.1:9000")
            .await
            .expect("IPv4 字面量解析失败");
        assert!(matches!(v4, Endpoint::Ip4 { port: 9000, .. }));

        let v6 = host
            .resolve_ip6("[::1]:80")
            .await
            .expect("IPv6 字面量解析失败");
        assert!(matches!(v6, Endpoint::Ip6 { port: 80, .. }));

        let err = host
            .resolve_ip6("127.0.0.1:80")
            .await
            .expect_err("族不匹配必须失败");
        assert_eq!(err.code(), "net.resolve");
    }
}
