//! # 具体端点（Endpoint）
//!
//! ## 核心意图（Why）
//! - 为宿主流式套接字设施提供强类型的网络位置：IPv4、IPv6（含链路 id）、
//!   本地套接字与“空端点”；
//! - 与 [`Address`](crate::Address) 互为镜像：`Address` 面向调用方透传，
//!   `Endpoint` 面向宿主消费，两者之间只经由 [`codec`](crate::codec) 翻译。
//!
//! ## 契约说明（What）
//! - 枚举是封闭的：`to_address` 对每个变体都有唯一映射，不存在“未知端点”
//!   分支，翻译的完备性由编译器静态保证；
//! - `Local` 的 `name` 以前导 `\0` 字节标记 Linux 抽象命名空间，空名称表示
//!   匿名套接字；该标记仅在端点层可见，反向翻译时会被剥除。

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// 本地套接字名称中标记抽象命名空间的前导字节。
pub const LOCAL_ABSTRACT_MARK: char = '\0';

/// 宿主流式套接字设施可直接消费的具体端点。
///
/// # 教案式说明
/// - **意图 (Why)**：把“套接字族”从字符串地址中剥离成类型信息，宿主实现
///   按变体直接建立监听/拨号，无需再做字符串判定；
/// - **契约 (What)**：
///   - `Null`：空端点，仅作为“无位置”的占位（如未绑定的查询结果）；
///   - `Ip4`/`Ip6`：原始字节序的地址与主机序端口；`link_id` 对应 IPv6
///     的 scope id，`0` 表示未指定；
///   - `Local`：本地套接字身份，见模块文档的命名约定；
/// - **风险 (Trade-offs)**：枚举封闭意味着新增族需要全链路改动；这是有意
///   选择——翻译层的完备性检查由编译器承担。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// 空端点。
    Null,
    /// IPv4 端点。
    Ip4 { octets: [u8; 4], port: u16 },
    /// IPv6 端点，`link_id` 为链路范围标识（scope id）。
    Ip6 {
        octets: [u8; 16],
        link_id: u32,
        port: u16,
    },
    /// 本地（unix-domain）套接字端点；空 `name` 表示匿名。
    Local { name: String },
}

impl Endpoint {
    /// 构造匿名本地端点。
    pub fn local_anonymous() -> Self {
        Self::Local {
            name: String::new(),
        }
    }

    /// 端点是否承载 IP 族（IPv4 或 IPv6）。
    pub fn is_ip(&self) -> bool {
        matches!(self, Self::Ip4 { .. } | Self::Ip6 { .. })
    }

    /// 转换为标准库 `SocketAddr`，仅对 IP 族有意义。
    ///
    /// - **契约 (What)**：`Null`/`Local` 返回 `None`；`Ip6` 的 `link_id`
    ///   映射为 `SocketAddrV6` 的 scope id。
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Ip4 { octets, port } => Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(*octets),
                *port,
            ))),
            Self::Ip6 {
                octets,
                link_id,
                port,
            } => Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(*octets),
                *port,
                0,
                *link_id,
            ))),
            Self::Null | Self::Local { .. } => None,
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::Ip4 {
                octets: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => Self::Ip6 {
                octets: v6.ip().octets(),
                link_id: v6.scope_id(),
                port: v6.port(),
            },
        }
    }
}

impl From<(IpAddr, u16)> for Endpoint {
    fn from((ip, port): (IpAddr, u16)) -> Self {
        Self::from(SocketAddr::new(ip, port))
    }
}
