//! # 宿主能力契约（contract）
//!
//! ## 角色定位（Why）
//! - 传输适配层不做套接字系统调用：监听、拨号、解析与字节收发全部委托给
//!   宿主提供的流式套接字设施；本模块以对象安全的 trait 固化这条边界；
//! - Acceptor/Connector/Channel 只依赖这些契约，宿主实现（如
//!   `rill-transport-net` 的 Tokio 提供者或测试中的内存模拟）可整体替换。
//!
//! ## 契约说明（What）
//! - [`Resolve`]：`host:port` 文本到 IP 端点的解析能力，族无关与族定向
//!   两种形态并存；
//! - [`NetHost`]：在解析之上追加“获取监听/拨号能力”的工厂方法，每次调用
//!   返回独立的能力对象；
//! - [`StreamListener`] / [`StreamDialer`] / [`StreamSocket`]：被动监听、
//!   主动拨号与单条双工字节流的最小操作面；
//! - [`StreamConn`]：套接字句柄与其单消费者事件流的成对交付物。
//!
//! ## 事件语义（How）
//! - 套接字事件经 `mpsc` 单消费者流交付：`Received` 仅在接收解锁后产生，
//!   `Closed` 每个套接字至多一次，`Failed` 原样携带底层故障；
//! - 新建套接字的接收处于停止状态，消费者显式 `start_receive` 后数据才会
//!   流动——这也消除了“先有数据后有订阅者”的竞态。

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::endpoint::Endpoint;
use crate::error::NetError;

/// 单条流式套接字的事件。
#[derive(Debug)]
pub enum SocketEvent {
    /// 收到一段入站字节。
    Received(Bytes),
    /// 套接字已关闭；每个套接字至多出现一次。
    Closed,
    /// 底层传输故障，原样透传。
    Failed(NetError),
}

/// 套接字事件的单消费者接收端。
pub type SocketEvents = mpsc::UnboundedReceiver<SocketEvent>;

/// 套接字句柄与其事件流的成对交付物。
///
/// 事件流的所有权随连接一起移交：谁持有 `StreamConn`，谁独占消费其事件。
#[derive(Debug)]
pub struct StreamConn {
    /// 套接字操作面。
    pub socket: Arc<dyn StreamSocket>,
    /// 套接字事件流。
    pub events: SocketEvents,
}

/// 名称解析能力：`host:port` 文本到 IP 端点。
///
/// # 教案式说明
/// - **意图 (Why)**：`tcp` scheme 族无关，需要宿主决定解析落点；`tcp4`/
///   `tcp6` 则要求族定向解析，三个方法分别承载；
/// - **契约 (What)**：成功时返回 [`Endpoint::Ip4`] 或 [`Endpoint::Ip6`]；
///   解析失败以 [`NetError::Resolve`] 返回并原样向上传播；
/// - **风险 (Trade-offs)**：authority 的具体文法（括号、scope id 等）由
///   实现决定，契约只约束输入输出形态。
#[async_trait]
pub trait Resolve: Send + Sync {
    /// 族无关解析，返回 IPv4 或 IPv6 端点。
    async fn resolve_ip(&self, authority: &str) -> Result<Endpoint, NetError>;

    /// 仅解析为 IPv4 端点。
    async fn resolve_ip4(&self, authority: &str) -> Result<Endpoint, NetError>;

    /// 仅解析为 IPv6 端点。
    async fn resolve_ip6(&self, authority: &str) -> Result<Endpoint, NetError>;
}

/// 宿主网络能力入口：解析 + 监听/拨号工厂。
///
/// 要求 `Debug` 以便持有方（Acceptor/Connector）整体派生调试输出。
#[async_trait]
pub trait NetHost: Resolve + fmt::Debug {
    /// 创建新的被动监听能力。
    async fn stream_listener(&self) -> Result<Arc<dyn StreamListener>, NetError>;

    /// 创建新的主动拨号能力。
    async fn stream_dialer(&self) -> Result<Arc<dyn StreamDialer>, NetError>;
}

/// 被动监听能力。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `set_reuse_address` 须在 `listen` 之前调用方可生效；
///   - `listen` 成功后 `local_endpoint` 返回内核实际绑定的端点
///     （含自动分配的端口）；
///   - `accept` 返回 `Ok(Some(conn))` 表示新入站连接；`Ok(None)` 表示
///     监听已（主动或被动）关闭，此后不会再有连接；`Err` 表示一次
///     监听级故障，监听本身可能仍然存活；
///   - `close` 幂等，关闭后挂起中的 `accept` 以 `Ok(None)` 返回。
#[async_trait]
pub trait StreamListener: Send + Sync + fmt::Debug {
    /// 设置地址复用选项。
    fn set_reuse_address(&self, enabled: bool) -> Result<(), NetError>;

    /// 绑定端点并开始监听。
    async fn listen(&self, endpoint: &Endpoint) -> Result<(), NetError>;

    /// 查询监听套接字的实际本地端点。
    async fn local_endpoint(&self) -> Result<Endpoint, NetError>;

    /// 等待下一条入站连接。
    async fn accept(&self) -> Result<Option<StreamConn>, NetError>;

    /// 关闭监听套接字。
    async fn close(&self);
}

/// 主动拨号能力。
#[async_trait]
pub trait StreamDialer: Send + Sync + fmt::Debug {
    /// 选择后续出站连接的本地端点。
    async fn bind(&self, endpoint: &Endpoint) -> Result<(), NetError>;

    /// 向目标端点发起连接。
    ///
    /// 调用方丢弃返回的 Future 即视为放弃本次尝试，实现必须随之中止
    /// 底层连接，不得遗留已建立却无人接收的套接字。
    async fn connect(&self, endpoint: &Endpoint) -> Result<StreamConn, NetError>;
}

/// 单条双工字节流的操作面。
///
/// 事件面见 [`StreamConn::events`]；本 trait 只承载命令方向。
#[async_trait]
pub trait StreamSocket: Send + Sync + fmt::Debug {
    /// 查询本地端点。
    async fn local_endpoint(&self) -> Result<Endpoint, NetError>;

    /// 查询远端端点。
    async fn remote_endpoint(&self) -> Result<Endpoint, NetError>;

    /// 设置 no-delay 选项；对无此概念的族（本地套接字）为空操作。
    fn set_no_delay(&self, enabled: bool) -> Result<(), NetError>;

    /// 发送一段字节；关闭后返回 [`NetError::Closed`]。
    async fn send(&self, data: Bytes) -> Result<(), NetError>;

    /// 恢复接收循环（解锁输入）。
    fn start_receive(&self);

    /// 暂停接收循环（锁定输入）。
    fn stop_receive(&self);

    /// 关闭套接字；幂等。
    async fn close(&self);
}
