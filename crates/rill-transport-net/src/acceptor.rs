//! # 被动监听器（Acceptor）
//!
//! ## 核心意图（Why）
//! - 持有一个宿主监听套接字的完整生命周期：绑定校验 → 异步监听建立 →
//!   入站接受循环 → 确定性拆除；
//! - 生命周期事件严格配对：每个 `Started` 恰有一个 `Stopped` 与之对应，
//!   无论拆除由 `stop()`、析构、监听自行关闭还是建立中途取消触发。
//!
//! ## 状态机（What）
//! - `bind()` 仅在未启动时允许，只校验 scheme 并记录地址，不触网；
//! - `start()` 幂等，启动一个可取消的后台任务执行监听序列：获取监听能力
//!   → 开启地址复用 → 地址翻译 → `listen` → 回读实际端点 →
//!   `AddressChanged` → 置位 listen-declared → `Started` → 接受循环；
//! - 接受循环中每条入站流启用 no-delay、包装为 [`Channel`] 并以
//!   `Accepted` 发布；监听级故障以 `Failed` 发布后循环继续；
//! - `stop()`/析构：清除启动位、取消后台任务（取消被吞掉、不算失败）、
//!   关闭监听套接字，并在 listen-declared 守卫下恰好一次发布 `Stopped`；
//! - 建立阶段的其他异常：`Failed`（及已声明时的 `Stopped`）后任务结束，
//!   组件回到可再次 `start()` 的状态，绑定地址保留。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rill_core::{
    Address, Cancellation, EventHub, NetError, NetHost, StreamListener, StreamSocket, codec,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::util::{lock, run_cancellable};

/// 接受循环遇到瞬态故障（如文件描述符耗尽）后的退避间隔。
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Acceptor 对外发布的生命周期事件。
#[derive(Clone, Debug)]
pub enum AcceptorEvent {
    /// 监听已建立；`bound` 为内核实际绑定的地址（含自动分配端口）。
    Started { bind: Address, bound: Address },
    /// 监听已结束；与 `Started` 一一配对。
    Stopped { bind: Address, bound: Address },
    /// 实际绑定地址已确定或变化。
    AddressChanged { bound: Address },
    /// 监听级故障；不代表监听结束。
    Failed {
        bind: Address,
        bound: Address,
        error: Arc<NetError>,
    },
    /// 新的入站连接已包装为通道。
    Accepted(Channel),
}

#[derive(Debug, Default)]
struct Addresses {
    bind: Address,
    bound: Address,
}

#[derive(Debug)]
struct AcceptorShared {
    host: Arc<dyn NetHost>,
    addresses: Mutex<Addresses>,
    started: AtomicBool,
    listen_declared: AtomicBool,
    listener: Mutex<Option<Arc<dyn StreamListener>>>,
    hub: EventHub<AcceptorEvent>,
}

impl AcceptorShared {
    fn snapshot(&self) -> (Address, Address) {
        let guard = lock(&self.addresses);
        (guard.bind.clone(), guard.bound.clone())
    }
}

#[derive(Debug, Default)]
struct RunState {
    cancel: Option<Cancellation>,
    task: Option<JoinHandle<()>>,
}

/// 被动监听器：一个实例至多持有一个宿主监听套接字。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方以“绑定 → 启动 → 订阅事件”的方式消费监听
///   能力，无需感知底层套接字族与异步建立细节；
/// - **契约 (What)**：
///   - **前置条件**：`start()` 必须在 Tokio 运行时内调用；
///   - **事件序**：同一实例内 `Started` 先于其后逻辑相关的
///     `Accepted`/`Failed`，每个 `Started` 恰配对一个 `Stopped`；
///   - **析构**：触发取消即返回，后台任务自行完成收尾（关闭套接字、
///     补发配对的 `Stopped`），不会有回调落入已析构的对象；
/// - **风险 (Trade-offs)**：`stop()` 为异步等待式拆除；`Drop` 只能发出
///   取消信号，拆除完成时刻由后台任务决定。
#[derive(Debug)]
pub struct Acceptor {
    shared: Arc<AcceptorShared>,
    run: Mutex<RunState>,
}

impl Acceptor {
    /// 以宿主网络能力创建监听器；不触网。
    pub fn new(host: Arc<dyn NetHost>) -> Self {
        Self {
            shared: Arc::new(AcceptorShared {
                host,
                addresses: Mutex::new(Addresses::default()),
                started: AtomicBool::new(false),
                listen_declared: AtomicBool::new(false),
                listener: Mutex::new(None),
                hub: EventHub::new(),
            }),
            run: Mutex::new(RunState::default()),
        }
    }

    /// 订阅生命周期事件流。
    pub fn events(&self) -> mpsc::UnboundedReceiver<AcceptorEvent> {
        self.shared.hub.subscribe()
    }

    /// 记录期望的绑定地址。
    ///
    /// - **契约 (What)**：仅在未启动时允许，否则返回
    ///   [`NetError::AlreadyBound`] 且原状态不变；scheme 不属于
    ///   {`local`,`tcp4`,`tcp6`,`tcp`} 时返回 [`NetError::BadAddress`]；
    ///   成功路径不产生任何网络副作用。
    pub fn bind(&self, address: Address) -> Result<(), NetError> {
        if self.shared.started.load(Ordering::Acquire) {
            return Err(NetError::AlreadyBound);
        }
        if !address.has_stream_scheme() {
            return Err(NetError::bad_address(address.as_str()));
        }
        lock(&self.shared.addresses).bind = address;
        Ok(())
    }

    /// 启动监听；已启动时为空操作。
    pub fn start(&self) {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancel = Cancellation::new();
        let task = tokio::spawn(run(self.shared.clone(), cancel.child()));
        let mut state = lock(&self.run);
        state.cancel = Some(cancel);
        state.task = Some(task);
    }

    /// 停止监听并等待拆除完成。
    ///
    /// 后台任务的取消是预期结果，被吞掉而非上报；`Stopped` 在
    /// listen-declared 守卫下恰好发布一次。
    pub async fn stop(&self) {
        self.shared.started.store(false, Ordering::Release);
        let (cancel, task) = {
            let mut state = lock(&self.run);
            (state.cancel.take(), state.task.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task {
            let _ = task.await;
        }
        // 后台任务通常已完成收尾；这里兜底处理“从未启动任务”的路径。
        teardown(&self.shared).await;
    }

    /// 期望的绑定地址。
    pub fn bind_address(&self) -> Address {
        lock(&self.shared.addresses).bind.clone()
    }

    /// 实际绑定地址；监听建立前为空地址。
    pub fn bound_address(&self) -> Address {
        lock(&self.shared.addresses).bound.clone()
    }

    /// 是否处于已启动状态。
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::Acquire)
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

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.shared.started.store(false, Ordering::Release);
        if let Some(cancel) = lock(&self.run).cancel.take() {
            cancel.cancel();
        }
    }
}

/// 后台监听任务：执行监听序列，并保证所有退出路径都走统一收尾。
async fn run(shared: Arc<AcceptorShared>, cancel: Cancellation) {
    match listen_loop(&shared, &cancel).await {
        Ok(()) => {
            let (bind, bound) = shared.snapshot();
            tracing::debug!(%bind, %bound, "监听套接字已自行关闭");
        }
        Err(error) if error.is_cancelled() => {
            tracing::debug!("监听任务被取消");
        }
        Err(error) => {
            let (bind, bound) = shared.snapshot();
            tracing::warn!(code = error.code(), %bind, "监听建立失败");
            shared.hub.emit(AcceptorEvent::Failed {
                bind,
                bound,
                error: Arc::new(error),
            });
        }
    }
    teardown(&shared).await;
}

/// 监听序列与接受循环；返回 `Ok(())` 表示监听自行关闭。
async fn listen_loop(shared: &Arc<AcceptorShared>, cancel: &Cancellation) -> Result<(), NetError> {
    let listener = run_cancellable(cancel, shared.host.stream_listener()).await?;
    *lock(&shared.listener) = Some(listener.clone());

    listener.set_reuse_address(true)?;

    let bind = lock(&shared.addresses).bind.clone();
    let endpoint =
        run_cancellable(cancel, codec::to_endpoint(shared.host.as_ref(), &bind)).await?;
    run_cancellable(cancel, listener.listen(&endpoint)).await?;

    let local = run_cancellable(cancel, listener.local_endpoint()).await?;
    let bound = codec::to_address(&local);
    lock(&shared.addresses).bound = bound.clone();
    shared.hub.emit(AcceptorEvent::AddressChanged {
        bound: bound.clone(),
    });

    shared.listen_declared.store(true, Ordering::Release);
    shared.hub.emit(AcceptorEvent::Started {
        bind: bind.clone(),
        bound: bound.clone(),
    });
    tracing::info!(%bind, %bound, "监听已建立");

    loop {
        match run_cancellable(cancel, listener.accept()).await {
            Ok(Some(conn)) => {
                if let Err(error) = conn.socket.set_no_delay(true) {
                    tracing::warn!(code = error.code(), "入站流设置 no-delay 失败");
                }
                let channel = Channel::spawn(Address::default(), conn);
                shared.hub.emit(AcceptorEvent::Accepted(channel));
            }
            Ok(None) => return Ok(()),
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                tracing::warn!(code = error.code(), "接受入站连接失败");
                shared.hub.emit(AcceptorEvent::Failed {
                    bind: bind.clone(),
                    bound: bound.clone(),
                    error: Arc::new(error),
                });
                // 接受失败多为瞬态（如 EMFILE），退避后继续监听。
                tokio::select! {
                    _ = cancel.cancelled() => return Err(NetError::Cancelled),
                    _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
            }
        }
    }
}

/// 统一收尾：关闭监听套接字、复位启动位，并在守卫下补发配对的 `Stopped`。
///
/// 幂等：后台任务与 `stop()` 都可能经过此处，`swap` 保证 `Stopped`
/// 恰好一次。
async fn teardown(shared: &Arc<AcceptorShared>) {
    let listener = lock(&shared.listener).take();
    if let Some(listener) = listener {
        listener.close().await;
    }
    shared.started.store(false, Ordering::Release);
    if shared.listen_declared.swap(false, Ordering::AcqRel) {
        let (bind, bound) = shared.snapshot();
        tracing::info!(%bind, %bound, "监听已停止");
        shared.hub.emit(AcceptorEvent::Stopped { bind, bound });
    }
}
