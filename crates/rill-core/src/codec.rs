//! # 地址翻译（codec）
//!
//! ## 核心意图（Why）
//! - [`Address`] 与 [`Endpoint`] 之间的唯一翻译点：正向翻译借助解析能力
//!   把 `scheme://authority` 落成具体端点，反向翻译把端点渲染回规范的
//!   地址文本；
//! - 翻译按 scheme/authority 字面切分派发——这是唯一的业务规则，
//!   不引入通用 URI 解析器。
//!
//! ## 契约说明（What）
//! - `tcp` 族无关：解析能力返回 IPv4/IPv6 任一端点即原样透传；
//! - `tcp4`/`tcp6` 族定向：直接请求对应族的解析；
//! - `local`：非空 authority 前插一个 `\0` 字节标记抽象命名空间（反向
//!   翻译时剥除），空 authority 即匿名本地端点；
//! - 其余 scheme 一律 [`NetError::BadAddress`]；解析失败原样向上传播。

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::address::{Address, SCHEME_LOCAL, SCHEME_TCP, SCHEME_TCP4, SCHEME_TCP6};
use crate::contract::Resolve;
use crate::endpoint::{Endpoint, LOCAL_ABSTRACT_MARK};
use crate::error::NetError;

/// 把不透明地址翻译为宿主可消费的端点。
///
/// # 教案式说明
/// - **意图 (Why)**：Acceptor 的监听建立与 Connector 的绑定/拨号共用同一
///   翻译规则，集中在此处避免语义分叉；
/// - **契约 (What)**：
///   - **前置条件**：`resolver` 可用；地址的合法性在本函数内裁决；
///   - **后置条件**：成功时返回与 scheme 对应族的端点；任何失败都不产生
///     网络副作用；
/// - **执行 (How)**：按 `://` 字面切分 scheme 与 authority，逐 scheme
///   派发；`local` 的抽象命名空间标记仅在端点层存在。
pub async fn to_endpoint<R>(resolver: &R, address: &Address) -> Result<Endpoint, NetError>
where
    R: Resolve + ?Sized,
{
    let (Some(scheme), Some(authority)) = (address.scheme(), address.authority()) else {
        return Err(NetError::bad_address(address.as_str()));
    };

    match scheme {
        SCHEME_TCP => resolver.resolve_ip(authority).await,
        SCHEME_TCP4 => resolver.resolve_ip4(authority).await,
        SCHEME_TCP6 => resolver.resolve_ip6(authority).await,
        SCHEME_LOCAL => {
            if authority.is_empty() {
                Ok(Endpoint::local_anonymous())
            } else {
                let mut name = String::with_capacity(authority.len() + 1);
                name.push(LOCAL_ABSTRACT_MARK);
                name.push_str(authority);
                Ok(Endpoint::Local { name })
            }
        }
        _ => Err(NetError::bad_address(address.as_str())),
    }
}

/// 把端点渲染回规范地址文本；全函数无失败路径。
///
/// # 教案式说明
/// - **契约 (What)**：
///   - `Null` → `null://`；
///   - `Ip4` → `tcp4://a.b.c.d:port`；
///   - `Ip6` → `tcp6://[ipv6文本%link]:port`，`link` 为 0 时省略，
///     与标准文本形式及 `SocketAddrV6` 的解析规则对齐；
///   - `Local` → `local://` 拼接剥除 `\0` 标记后的名称；
/// - **风险 (Trade-offs)**：枚举封闭使“未知端点”分支不可表达，完备性
///   由编译器保证。
pub fn to_address(endpoint: &Endpoint) -> Address {
    match endpoint {
        Endpoint::Null => Address::from("null://"),
        Endpoint::Ip4 { octets, port } => {
            Address::from(format!("tcp4://{}:{}", Ipv4Addr::from(*octets), port))
        }
        Endpoint::Ip6 {
            octets,
            link_id,
            port,
        } => {
            let ip = Ipv6Addr::from(*octets);
            if *link_id == 0 {
                Address::from(format!("tcp6://[{ip}]:{port}"))
            } else {
                Address::from(format!("tcp6://[{ip}%{link_id}]:{port}"))
            }
        }
        Endpoint::Local { name } => {
            let visible = name.strip_prefix(LOCAL_ABSTRACT_MARK).unwrap_or(name);
            Address::from(format!("local://{visible}"))
        }
    }
}
