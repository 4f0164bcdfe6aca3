//! 集成测试共享设施：内存版宿主能力实现。
//!
//! # 测试目标（Why）
//! - 在不触碰真实网络的前提下验证三元组的契约行为：生命周期配对、
//!   取消/超时语义与通道事件转发；
//! - 监听与拨号行为可注入（就绪 / 挂起 / 失败），连接尝试的中止可被
//!   观测，覆盖真实套接字难以确定性复现的路径。
//!
//! # 结构安排（How）
//! - [`MockHost`]：宿主能力入口，按调用次序记录其创建的监听器；
//! - [`MockListener`] / [`MockDialer`]：行为可配置的监听与拨号能力；
//! - [`socket_pair`]：交叉连线的内存双工套接字对，两侧各带事件注入口。

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rill_core::{
    Cancellation, Endpoint, NetError, NetHost, Resolve, SocketEvent, StreamConn, StreamDialer,
    StreamListener, StreamSocket, ops,
};
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};

/// 等待事件的统一超时，防止断言失败演变为测试悬挂。
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// 从事件流中取下一个事件，超时即失败。
pub async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("等待事件超时")
        .expect("事件流意外终止")
}

/// 初始化测试期日志输出；重复调用安全。
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 监听能力的注入行为。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenBehavior {
    /// `listen` 立即成功。
    Ready,
    /// `listen` 永久挂起，模拟缓慢的监听建立。
    Hang,
    /// `listen` 以地址占用失败。
    Fail,
}

/// 拨号能力的注入行为。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialBehavior {
    /// `connect` 立即交付内存套接字对的一侧。
    Ready,
    /// `connect` 永久挂起，模拟不可达目标。
    Hang,
    /// `connect` 以拒绝连接失败。
    Fail,
}

/// 内存宿主：字面量解析 + 可注入的监听/拨号能力。
#[derive(Debug)]
pub struct MockHost {
    listen_behavior: Mutex<ListenBehavior>,
    listeners: Mutex<Vec<Arc<MockListener>>>,
    dialer: Arc<MockDialer>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listen_behavior: Mutex::new(ListenBehavior::Ready),
            listeners: Mutex::new(Vec::new()),
            dialer: Arc::new(MockDialer::new(DialBehavior::Ready)),
        })
    }

    pub fn set_listen_behavior(&self, behavior: ListenBehavior) {
        *lock(&self.listen_behavior) = behavior;
    }

    pub fn set_dial_behavior(&self, behavior: DialBehavior) {
        self.dialer.set_behavior(behavior);
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn dialer(&self) -> Arc<MockDialer> {
        self.dialer.clone()
    }

    /// 等待宿主创建出监听器（Acceptor 的后台任务异步到达）。
    pub async fn wait_listener(&self) -> Arc<MockListener> {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                if let Some(listener) = lock(&self.listeners).last().cloned() {
                    return listener;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("等待监听器创建超时")
    }
}

fn parse_literal(authority: &str) -> Result<Endpoint, NetError> {
    authority
        .parse::<std::net::SocketAddr>()
        .map(Endpoint::from)
        .map_err(|_| NetError::resolve_empty(authority))
}

#[async_trait]
impl Resolve for MockHost {
    async fn resolve_ip(&self, authority: &str) -> Result<Endpoint, NetError> {
        parse_literal(authority)
    }

    async fn resolve_ip4(&self, authority: &str) -> Result<Endpoint, NetError> {
        match parse_literal(authority)? {
            ep @ Endpoint::Ip4 { .. } => Ok(ep),
            _ => Err(NetError::resolve_empty(authority)),
        }
    }

    async fn resolve_ip6(&self, authority: &str) -> Result<Endpoint, NetError> {
        match parse_literal(authority)? {
            ep @ Endpoint::Ip6 { .. } => Ok(ep),
            _ => Err(NetError::resolve_empty(authority)),
        }
    }
}

#[async_trait]
impl NetHost for MockHost {
    async fn stream_listener(&self) -> Result<Arc<dyn StreamListener>, NetError> {
        let listener = Arc::new(MockListener::new(*lock(&self.listen_behavior)));
        lock(&self.listeners).push(listener.clone());
        Ok(listener)
    }

    async fn stream_dialer(&self) -> Result<Arc<dyn StreamDialer>, NetError> {
        Ok(self.dialer.clone())
    }
}

#[derive(Debug)]
enum AcceptItem {
    Conn(StreamConn),
    Fault(NetError),
}

/// 行为可注入的内存监听器。
#[derive(Debug)]
pub struct MockListener {
    behavior: ListenBehavior,
    bound: Mutex<Option<Endpoint>>,
    reuse: AtomicBool,
    listen_entered: watch::Sender<bool>,
    inbound_tx: mpsc::UnboundedSender<AcceptItem>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<AcceptItem>>,
    closed: Cancellation,
    close_calls: AtomicUsize,
}

impl MockListener {
    fn new(behavior: ListenBehavior) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (listen_entered, _) = watch::channel(false);
        Self {
            behavior,
            bound: Mutex::new(None),
            reuse: AtomicBool::new(false),
            listen_entered,
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            closed: Cancellation::new(),
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn reuse_enabled(&self) -> bool {
        self.reuse.load(Ordering::Acquire)
    }

    pub fn bound_endpoint(&self) -> Option<Endpoint> {
        lock(&self.bound).clone()
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::Acquire)
    }

    /// 注入一条入站连接。
    pub fn push_conn(&self, conn: StreamConn) {
        let _ = self.inbound_tx.send(AcceptItem::Conn(conn));
    }

    /// 注入一次监听级故障。
    pub fn push_fault(&self, error: NetError) {
        let _ = self.inbound_tx.send(AcceptItem::Fault(error));
    }

    /// 模拟监听套接字自行关闭。
    pub fn simulate_closed(&self) {
        self.closed.cancel();
    }

    /// 等待 `listen` 被调用（Hang 行为下任务已挂起其中）。
    pub async fn wait_listen_called(&self) {
        let mut rx = self.listen_entered.subscribe();
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while !*rx.borrow() {
                rx.changed().await.expect("listen 标记通道关闭");
            }
        })
        .await
        .expect("等待 listen 调用超时");
    }
}

#[async_trait]
impl StreamListener for MockListener {
    fn set_reuse_address(&self, enabled: bool) -> Result<(), NetError> {
        self.reuse.store(enabled, Ordering::Release);
        Ok(())
    }

    async fn listen(&self, endpoint: &Endpoint) -> Result<(), NetError> {
        self.listen_entered.send_replace(true);
        match self.behavior {
            ListenBehavior::Ready => {
                *lock(&self.bound) = Some(endpoint.clone());
                Ok(())
            }
            ListenBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            ListenBehavior::Fail => Err(NetError::io(
                ops::LISTEN,
                io::Error::new(io::ErrorKind::AddrInUse, "simulated bind failure"),
            )),
        }
    }

    async fn local_endpoint(&self) -> Result<Endpoint, NetError> {
        // 端口 0 的请求在这里落成固定的“内核分配”端口。
        match lock(&self.bound).clone() {
            Some(Endpoint::Ip4 { octets, port }) => Ok(Endpoint::Ip4 {
                octets,
                port: if port == 0 { 4321 } else { port },
            }),
            Some(other) => Ok(other),
            None => Err(NetError::io(
                ops::LOCAL_ENDPOINT,
                io::Error::new(io::ErrorKind::NotConnected, "listener is not listening"),
            )),
        }
    }

    async fn accept(&self) -> Result<Option<StreamConn>, NetError> {
        let mut rx = self.inbound_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Ok(None),
            item = rx.recv() => match item {
                Some(AcceptItem::Conn(conn)) => Ok(Some(conn)),
                Some(AcceptItem::Fault(error)) => Err(error),
                None => Ok(None),
            }
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::AcqRel);
        self.closed.cancel();
    }
}

/// 拨向挂起目标的尝试被丢弃时置位观测标志。
#[derive(Debug)]
struct AbortGuard {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl AbortGuard {
    fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::Release);
        }
    }
}

/// 行为可注入的内存拨号器。
#[derive(Debug)]
pub struct MockDialer {
    behavior: Mutex<DialBehavior>,
    bound: Mutex<Option<Endpoint>>,
    bind_calls: AtomicUsize,
    connect_started: watch::Sender<bool>,
    connect_aborted: Arc<AtomicBool>,
    peers_tx: mpsc::UnboundedSender<(PairHandles, Arc<MockSocket>)>,
    peers_rx: AsyncMutex<mpsc::UnboundedReceiver<(PairHandles, Arc<MockSocket>)>>,
}

impl MockDialer {
    fn new(behavior: DialBehavior) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let (connect_started, _) = watch::channel(false);
        Self {
            behavior: Mutex::new(behavior),
            bound: Mutex::new(None),
            bind_calls: AtomicUsize::new(0),
            connect_started,
            connect_aborted: Arc::new(AtomicBool::new(false)),
            peers_tx,
            peers_rx: AsyncMutex::new(peers_rx),
        }
    }

    pub fn set_behavior(&self, behavior: DialBehavior) {
        *lock(&self.behavior) = behavior;
    }

    pub fn bound_endpoint(&self) -> Option<Endpoint> {
        lock(&self.bound).clone()
    }

    pub fn bind_count(&self) -> usize {
        self.bind_calls.load(Ordering::Acquire)
    }

    pub fn connect_aborted(&self) -> bool {
        self.connect_aborted.load(Ordering::Acquire)
    }

    /// 等待 `connect` 进入执行。
    pub async fn wait_connect_started(&self) {
        let mut rx = self.connect_started.subscribe();
        tokio::time::timeout(EVENT_TIMEOUT, async {
            while !*rx.borrow() {
                rx.changed().await.expect("connect 标记通道关闭");
            }
        })
        .await
        .expect("等待 connect 调用超时");
    }

    /// 取出 Ready 行为交付的对端侧与本端具体套接字（便于断言选项）。
    pub async fn take_peer(&self) -> (PairHandles, Arc<MockSocket>) {
        let mut rx = self.peers_rx.lock().await;
        tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("等待对端套接字超时")
            .expect("对端通道意外关闭")
    }
}

#[async_trait]
impl StreamDialer for MockDialer {
    async fn bind(&self, endpoint: &Endpoint) -> Result<(), NetError> {
        self.bind_calls.fetch_add(1, Ordering::AcqRel);
        *lock(&self.bound) = Some(endpoint.clone());
        Ok(())
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<StreamConn, NetError> {
        self.connect_started.send_replace(true);
        let guard = AbortGuard::new(self.connect_aborted.clone());
        let behavior = *lock(&self.behavior);
        match behavior {
            DialBehavior::Hang => {
                std::future::pending::<()>().await;
                guard.disarm();
                Err(NetError::Cancelled)
            }
            DialBehavior::Fail => {
                guard.disarm();
                Err(NetError::io(
                    ops::CONNECT,
                    io::Error::new(io::ErrorKind::ConnectionRefused, "simulated refusal"),
                ))
            }
            DialBehavior::Ready => {
                let (mine, theirs) = socket_pair_between(
                    Endpoint::Ip4 {
                        octets: [127, 0, 0, 1],
                        port: 50000,
                    },
                    endpoint.clone(),
                );
                let _ = self.peers_tx.send((theirs, mine.socket.clone()));
                guard.disarm();
                Ok(mine.conn)
            }
        }
    }
}

/// 内存双工套接字的一侧：连接、具体套接字引用与事件注入口。
#[derive(Debug)]
pub struct PairHandles {
    pub conn: StreamConn,
    pub socket: Arc<MockSocket>,
    pub inject: mpsc::UnboundedSender<SocketEvent>,
}

/// 以缺省端点创建交叉连线的套接字对。
pub fn socket_pair() -> (PairHandles, PairHandles) {
    socket_pair_between(
        Endpoint::Ip4 {
            octets: [127, 0, 0, 1],
            port: 1111,
        },
        Endpoint::Ip4 {
            octets: [127, 0, 0, 1],
            port: 2222,
        },
    )
}

/// 指定两端端点创建套接字对；`a` 的远端即 `b` 的本地。
pub fn socket_pair_between(a_local: Endpoint, b_local: Endpoint) -> (PairHandles, PairHandles) {
    let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
    let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
    let a = make_side(a_to_b_tx, b_to_a_rx, a_local.clone(), b_local.clone());
    let b = make_side(b_to_a_tx, a_to_b_rx, b_local, a_local);
    (a, b)
}

fn make_side(
    to_peer: mpsc::UnboundedSender<Bytes>,
    from_peer: mpsc::UnboundedReceiver<Bytes>,
    local: Endpoint,
    remote: Endpoint,
) -> PairHandles {
    let (gate_tx, gate_rx) = watch::channel(false);
    let closed = Cancellation::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let socket = Arc::new(MockSocket {
        to_peer: Mutex::new(Some(to_peer)),
        gate: gate_tx,
        closed: closed.child(),
        local,
        remote,
        no_delay: AtomicBool::new(false),
    });
    tokio::spawn(pair_pump(from_peer, gate_rx, closed, events_tx.clone()));
    PairHandles {
        conn: StreamConn {
            socket: socket.clone(),
            events: events_rx,
        },
        socket,
        inject: events_tx,
    }
}

/// 内存套接字：命令面实现；事件由配对泵任务产生。
#[derive(Debug)]
pub struct MockSocket {
    to_peer: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    gate: watch::Sender<bool>,
    closed: Cancellation,
    local: Endpoint,
    remote: Endpoint,
    no_delay: AtomicBool,
}

impl MockSocket {
    pub fn no_delay_enabled(&self) -> bool {
        self.no_delay.load(Ordering::Acquire)
    }
}

#[async_trait]
impl StreamSocket for MockSocket {
    async fn local_endpoint(&self) -> Result<Endpoint, NetError> {
        Ok(self.local.clone())
    }

    async fn remote_endpoint(&self) -> Result<Endpoint, NetError> {
        Ok(self.remote.clone())
    }

    fn set_no_delay(&self, enabled: bool) -> Result<(), NetError> {
        self.no_delay.store(enabled, Ordering::Release);
        Ok(())
    }

    async fn send(&self, data: Bytes) -> Result<(), NetError> {
        match &*lock(&self.to_peer) {
            Some(tx) => tx.send(data).map_err(|_| NetError::Closed),
            None => Err(NetError::Closed),
        }
    }

    fn start_receive(&self) {
        self.gate.send_replace(true);
    }

    fn stop_receive(&self) {
        self.gate.send_replace(false);
    }

    async fn close(&self) {
        self.closed.cancel();
        // 丢弃发送端，对端随之观察到流终止。
        lock(&self.to_peer).take();
    }
}

/// 配对泵：门闸放行时把对端字节转为事件。
async fn pair_pump(
    mut from_peer: mpsc::UnboundedReceiver<Bytes>,
    mut gate: watch::Receiver<bool>,
    closed: Cancellation,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    loop {
        if !*gate.borrow() {
            tokio::select! {
                biased;
                _ = closed.cancelled() => {
                    let _ = events.send(SocketEvent::Closed);
                    return;
                }
                changed = gate.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            }
        }
        tokio::select! {
            biased;
            _ = closed.cancelled() => {
                let _ = events.send(SocketEvent::Closed);
                return;
            }
            changed = gate.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            data = from_peer.recv() => match data {
                Some(bytes) => {
                    if events.send(SocketEvent::Received(bytes)).is_err() {
                        return;
                    }
                }
                None => {
                    let _ = events.send(SocketEvent::Closed);
                    return;
                }
            }
        }
    }
}
