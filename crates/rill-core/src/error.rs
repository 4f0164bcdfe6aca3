//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为传输适配层对外暴露的错误语义提供集中定义：校验类错误（地址、状态）、
//!   异步阶段故障（解析、底层 IO）、超时与取消各自独立成变体，
//!   供日志、指标与自动化治理按稳定错误码精确分类；
//! - 取消是一等结果而非故障：调用方通过 [`NetError::is_cancelled`] 区分
//!   “被主动中止”与“真实失败”，避免误触重试或告警。
//!
//! ## 设计要求（What）
//! - 所有变体实现 `thiserror::Error`，兼容 `std::error::Error` 生态；
//! - 每个变体经 [`NetError::code`] 映射到 `net.<语义>` 形式的稳定错误码；
//! - 底层传输故障以 `#[source]` 原样携带 `std::io::Error`，不做语义改写。

use core::time::Duration;

use thiserror::Error;

/// 稳定的操作名常量，用于 [`NetError::Io`] 标注失败环节。
///
/// 命名与宿主能力契约的方法一一对应，保证日志与指标维度收敛。
pub mod ops {
    /// 获取监听能力。
    pub const LISTENER: &str = "listener";
    /// 获取拨号能力。
    pub const DIALER: &str = "dialer";
    /// 建立监听。
    pub const LISTEN: &str = "listen";
    /// 接受入站连接。
    pub const ACCEPT: &str = "accept";
    /// 绑定本地端点。
    pub const BIND: &str = "bind";
    /// 发起出站连接。
    pub const CONNECT: &str = "connect";
    /// 发送数据。
    pub const SEND: &str = "send";
    /// 接收数据。
    pub const RECEIVE: &str = "receive";
    /// 查询本地端点。
    pub const LOCAL_ENDPOINT: &str = "local_endpoint";
    /// 查询远端端点。
    pub const REMOTE_ENDPOINT: &str = "remote_endpoint";
    /// 设置套接字选项。
    pub const SET_OPTION: &str = "set_option";
}

/// 传输适配层的核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：聚合地址校验、生命周期约束与底层传输故障，为上层提供
///   单一的 `?` 传播通道；错误码稳定后，观测与治理策略不随文案变动漂移。
/// - **契约 (What)**：
///   - 所有变体均为 `Send + Sync + 'static`，可跨任务传播；
///   - 校验类错误（[`BadAddress`](NetError::BadAddress)、
///     [`AlreadyBound`](NetError::AlreadyBound)）在触网前同步返回；
///   - 底层故障（[`Io`](NetError::Io)、[`Resolve`](NetError::Resolve)）
///     原样携带根因，调用方可沿 `source()` 链路追溯。
/// - **风险 (Trade-offs)**：`std::io::Error` 不可克隆，需要跨订阅者广播时
///   应以 `Arc<NetError>` 包裹，参见各事件枚举的字段类型。
#[derive(Debug, Error)]
pub enum NetError {
    /// 地址格式非法或 scheme 不受支持。
    #[error("unsupported or malformed transport address `{address}`")]
    BadAddress { address: String },

    /// Acceptor 已启动，拒绝重新绑定。
    #[error("acceptor already started, bind is not allowed")]
    AlreadyBound,

    /// 出站连接超过固定截止时间。
    #[error("connect attempt exceeded {timeout:?}")]
    ConnectionTimeout { timeout: Duration },

    /// 名称解析失败；`source` 缺失时表示解析结果为空集。
    #[error("address resolution failed for `{authority}`")]
    Resolve {
        authority: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// 底层传输故障，`op` 取自 [`ops`] 常量表。
    #[error("transport operation `{op}` failed")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// 通道已关闭，后续发送被拒绝。
    #[error("channel is closed")]
    Closed,

    /// 操作被调用方或组件停机主动中止；不属于故障。
    #[error("operation cancelled")]
    Cancelled,

    /// 当前宿主环境不支持所请求的能力。
    #[error("unsupported capability: {detail}")]
    Unsupported { detail: &'static str },
}

impl NetError {
    /// 构造地址校验错误。
    pub fn bad_address(address: impl Into<String>) -> Self {
        Self::BadAddress {
            address: address.into(),
        }
    }

    /// 构造解析失败错误。
    pub fn resolve(authority: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resolve {
            authority: authority.into(),
            source: Some(source),
        }
    }

    /// 构造“解析结果为空”的失败。
    pub fn resolve_empty(authority: impl Into<String>) -> Self {
        Self::Resolve {
            authority: authority.into(),
            source: None,
        }
    }

    /// 构造底层 IO 故障，`op` 必须取自 [`ops`] 常量表。
    pub fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::Io { op, source }
    }

    /// 返回稳定错误码，遵循 `net.<语义>` 命名。
    ///
    /// - **契约 (What)**：码值一经发布即冻结，观测面板与告警规则可安全
    ///   依赖；新增变体必须同步登记新码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadAddress { .. } => "net.bad_address",
            Self::AlreadyBound => "net.already_bound",
            Self::ConnectionTimeout { .. } => "net.connect_timeout",
            Self::Resolve { .. } => "net.resolve",
            Self::Io { .. } => "net.io",
            Self::Closed => "net.closed",
            Self::Cancelled => "net.cancelled",
            Self::Unsupported { .. } => "net.unsupported",
        }
    }

    /// 是否为“被取消”这一非故障结果。
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
