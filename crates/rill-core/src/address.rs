//! # 传输地址（Address）
//!
//! ## 核心意图（Why）
//! - 以单一不透明字符串 `scheme://authority` 统一表达 TCP4/TCP6/本地套接字
//!   三族传输端点，让上层在不关心套接字族差异的情况下持有、比较与转发地址；
//! - 地址仅按字符串值比较，不在此层做任何网络解析，保证类型本身零依赖、零状态。
//!
//! ## 契约说明（What）
//! - 受支持的 scheme 为 `tcp`（族无关）、`tcp4`、`tcp6`、`local`；
//!   其余 scheme 由 [`codec`](crate::codec) 在翻译阶段拒绝；
//! - `local` 的 authority 为本地套接字名称，空 authority 表示匿名套接字；
//! - 空字符串地址是合法值，语义为“未知/未设定”，用于被动接受的通道。

use core::fmt;

/// `tcp`：族无关的 IP 流式传输，由解析能力决定落到 IPv4 还是 IPv6。
pub const SCHEME_TCP: &str = "tcp";
/// `tcp4`：显式 IPv4 流式传输。
pub const SCHEME_TCP4: &str = "tcp4";
/// `tcp6`：显式 IPv6 流式传输。
pub const SCHEME_TCP6: &str = "tcp6";
/// `local`：本地（unix-domain）流式套接字。
pub const SCHEME_LOCAL: &str = "local";

/// 不透明传输地址，形如 `scheme://authority`。
///
/// # 教案式说明
/// - **意图 (Why)**：对齐多族传输的“单地址类型”诉求，调用方持有 `Address`
///   即可在 Acceptor/Connector 之间自由传递，无需理解底层端点结构；
/// - **契约 (What)**：
///   - 构造后不可变，相等性与哈希完全由内部字符串决定；
///   - `scheme()`/`authority()` 仅做字面切分，不校验内容合法性；
///   - [`Default`] 产生空地址，表示“尚无地址”（如入站通道的原始远端）；
/// - **风险 (Trade-offs)**：不在构造期校验格式，换取零成本的透传语义；
///   非法地址统一在 `codec::to_endpoint` 处以 `BadAddress` 拒绝。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// 以任意字符串构造地址，不做格式校验。
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 返回内部字符串视图。
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 地址是否为空（未设定）。
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 切分出 `://` 之前的 scheme；无分隔符时返回 `None`。
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once("://").map(|(scheme, _)| scheme)
    }

    /// 切分出 `://` 之后的 authority；无分隔符时返回 `None`。
    pub fn authority(&self) -> Option<&str> {
        self.0.split_once("://").map(|(_, authority)| authority)
    }

    /// scheme 是否属于本适配层支持的流式传输族。
    ///
    /// - **契约 (What)**：仅当 scheme 为 `tcp`/`tcp4`/`tcp6`/`local` 之一时
    ///   返回 `true`；缺失 `://` 分隔符按不支持处理。
    pub fn has_stream_scheme(&self) -> bool {
        matches!(
            self.scheme(),
            Some(SCHEME_TCP | SCHEME_TCP4 | SCHEME_TCP6 | SCHEME_LOCAL)
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}
