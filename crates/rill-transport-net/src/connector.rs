//! # 主动拨号器（Connector）
//!
//! ## 核心意图（Why）
//! - 持有一次性协商的宿主拨号能力，在其上提供本地端点选择（`bind`）与
//!   带固定截止时间的出站建连（`connect`）；
//! - 每次调用都是独立的可取消操作：拨号器自身没有“启动/停止”概念，
//!   只有单个操作的成功、失败与取消三种结局。
//!
//! ## 截止时间赛跑（How）
//! - `connect` 让连接尝试与 2 秒定时器赛跑：定时器胜出时连接 Future 被
//!   原地丢弃（宿主契约保证随之中止底层尝试），调用以
//!   [`NetError::ConnectionTimeout`] 失败；
//! - 调用方丢弃挂起中的 `connect` Future 同样中止底层尝试——被取消的
//!   建连永远不会凭空完成一条无人接收的通道；
//! - 每次调用结构性地恰好产生一个结局：`async fn` + `select!` 使
//!   “双重完成”在类型层面不可表达，无需额外的已完成守卫标志。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rill_core::{
    Address, Cancellation, EventHub, NetError, NetHost, StreamDialer, StreamSocket, codec,
};
use tokio::sync::{OnceCell, mpsc};

use crate::channel::Channel;
use crate::util::{lock, run_cancellable};

/// 出站建连的固定截止时间。
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Connector 对外发布的事件。
#[derive(Clone, Debug)]
pub enum ConnectorEvent {
    /// 本地绑定地址已更新。
    AddressChanged { address: Address },
}

#[derive(Debug)]
struct ConnectorShared {
    host: Arc<dyn NetHost>,
    dialer: OnceCell<Arc<dyn StreamDialer>>,
    address: Mutex<Address>,
    hub: EventHub<ConnectorEvent>,
    shutdown: Cancellation,
}

impl ConnectorShared {
    /// 获取（必要时协商）拨号能力；协商结果在实例生命周期内只发生一次。
    async fn dial_capability(&self) -> Result<Arc<dyn StreamDialer>, NetError> {
        self.dialer
            .get_or_try_init(|| self.host.stream_dialer())
            .await
            .cloned()
    }
}

/// 主动拨号器。
///
/// # 教案式说明
/// - **意图 (Why)**：与 [`Acceptor`](crate::Acceptor) 互为镜像的主动侧：
///   调用方给出目标地址即可得到一条 [`Channel`]，族差异与能力协商细节
///   被完全遮蔽；
/// - **契约 (What)**：
///   - **前置条件**：构造与调用都必须发生在 Tokio 运行时内；拨号能力在
///     构造期即开始异步预热，所有 `bind`/`connect` 隐式等待它就绪；
///   - **取消**：实例析构触发停机令牌，挂起中的调用以
///     [`NetError::Cancelled`] 结束；调用方丢弃单次调用的 Future 则只
///     中止该次操作；
/// - **风险 (Trade-offs)**：预热失败不缓存，后续调用会重新协商——宿主
///   能力的瞬态故障由此自愈，代价是失败路径上的重复尝试。
#[derive(Debug)]
pub struct Connector {
    shared: Arc<ConnectorShared>,
}

impl Connector {
    /// 以宿主网络能力创建拨号器，并立即预热拨号能力。
    pub fn new(host: Arc<dyn NetHost>) -> Self {
        let shared = Arc::new(ConnectorShared {
            host,
            dialer: OnceCell::new(),
            address: Mutex::new(Address::default()),
            hub: EventHub::new(),
            shutdown: Cancellation::new(),
        });
        let warmup = shared.clone();
        tokio::spawn(async move {
            if let Err(error) = warmup.dial_capability().await {
                tracing::debug!(code = error.code(), "拨号能力预热失败，调用期将重试");
            }
        });
        Self { shared }
    }

    /// 订阅拨号器事件流。
    pub fn events(&self) -> mpsc::UnboundedReceiver<ConnectorEvent> {
        self.shared.hub.subscribe()
    }

    /// 选择后续出站连接的本地端点。
    ///
    /// - **契约 (What)**：scheme 校验同步完成，非法地址不触网；成功后
    ///   记录当前地址并发布 `AddressChanged`；取消以
    ///   [`NetError::Cancelled`] 返回，不算失败。
    pub async fn bind(&self, address: Address) -> Result<(), NetError> {
        if !address.has_stream_scheme() {
            return Err(NetError::bad_address(address.as_str()));
        }
        let shutdown = self.shared.shutdown.child();
        let dialer = run_cancellable(&shutdown, self.shared.dial_capability()).await?;
        let endpoint = run_cancellable(
            &shutdown,
            codec::to_endpoint(self.shared.host.as_ref(), &address),
        )
        .await?;
        run_cancellable(&shutdown, dialer.bind(&endpoint)).await?;

        *lock(&self.shared.address) = address.clone();
        tracing::debug!(%address, "本地绑定地址已更新");
        self.shared
            .hub
            .emit(ConnectorEvent::AddressChanged { address });
        Ok(())
    }

    /// 向目标地址发起出站连接，成功时返回承载该地址的 [`Channel`]。
    ///
    /// - **契约 (What)**：
    ///   - 地址翻译失败（含非法 scheme）不产生任何网络副作用；
    ///   - 超过 [`CONNECT_TIMEOUT`] 时底层尝试被中止，调用以
    ///     [`NetError::ConnectionTimeout`] 失败；
    ///   - 丢弃挂起中的调用 Future 即中止底层尝试，不会交付通道。
    pub async fn connect(&self, address: Address) -> Result<Channel, NetError> {
        let shutdown = self.shared.shutdown.child();
        let dialer = run_cancellable(&shutdown, self.shared.dial_capability()).await?;
        let endpoint = run_cancellable(
            &shutdown,
            codec::to_endpoint(self.shared.host.as_ref(), &address),
        )
        .await?;

        let attempt = tokio::time::timeout(CONNECT_TIMEOUT, dialer.connect(&endpoint));
        let conn = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(NetError::Cancelled),
            outcome = attempt => match outcome {
                Ok(Ok(conn)) => conn,
                Ok(Err(error)) => return Err(error),
                // 定时器胜出：连接 Future 已被丢弃，底层尝试随之中止。
                Err(_elapsed) => {
                    tracing::debug!(%address, "出站连接超时");
                    return Err(NetError::ConnectionTimeout {
                        timeout: CONNECT_TIMEOUT,
                    });
                }
            },
        };

        if let Err(error) = conn.socket.set_no_delay(true) {
            tracing::warn!(code = error.code(), "出站流设置 no-delay 失败");
        }
        tracing::debug!(%address, "出站连接已建立");
        Ok(Channel::spawn(address, conn))
    }

    /// 最近一次成功绑定的地址；初始为空地址。
    pub fn address(&self) -> Address {
        lock(&self.shared.address).clone()
    }

    /// 链路成本提示。
    pub fn cost(&self) -> f64 {
        0.0
    }

    /// 往返时延提示。
    pub fn rtt(&self) -> f64 {
        0.0
    }

    /// 带宽提示。
    pub fn bandwidth(&self) -> f64 {
        f64::MAX
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}
