//! Tokio 宿主提供者的被动监听与主动拨号实现。
//!
//! ## 要点（What）
//! - TCP 监听经 `socket2` 构建：地址复用必须在 bind 之前施加，监听积压
//!   由 [`TokioNetHost`](super::TokioNetHost) 注入；
//! - 本地套接字在 Linux 上支持抽象命名空间（名称以 `\0` 标记）；匿名
//!   监听由提供者自动分配唯一抽象名，效果等同内核 autobind；
//! - `close` 先触发取消再回收内核句柄，挂起中的 `accept` 以 `Ok(None)`
//!   收敛，不会与关闭路径死锁。

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rill_core::{
    Cancellation, Endpoint, NetError, StreamConn, StreamDialer, StreamListener, ops,
};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex as AsyncMutex;

#[cfg(unix)]
use rill_core::LOCAL_ABSTRACT_MARK;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use super::socket::{StreamIo, TokioStreamSocket};
use crate::util::lock;

#[derive(Debug)]
enum ListenerKind {
    Idle,
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// Tokio 被动监听能力。
///
/// # 教案式说明
/// - **契约 (What)**：每个实例至多承载一次 `listen`；实际本地端点在
///   `listen` 成功时缓存，之后的 `local_endpoint` 查询不再触碰内核；
/// - **并发 (How)**：内核句柄由异步互斥锁保护；`close` 先置取消位再取锁，
///   持锁挂起的 `accept` 会先感知取消并让出锁。
#[derive(Debug)]
pub(super) struct TokioStreamListener {
    backlog: u32,
    reuse_address: AtomicBool,
    inner: AsyncMutex<ListenerKind>,
    local: StdMutex<Option<Endpoint>>,
    closed: Cancellation,
}

impl TokioStreamListener {
    pub(super) fn new(backlog: u32) -> Self {
        Self {
            backlog,
            reuse_address: AtomicBool::new(false),
            inner: AsyncMutex::new(ListenerKind::Idle),
            local: StdMutex::new(None),
            closed: Cancellation::new(),
        }
    }
}

#[async_trait]
impl StreamListener for TokioStreamListener {
    fn set_reuse_address(&self, enabled: bool) -> Result<(), NetError> {
        // 选项在 listen 时统一施加到新建套接字上。
        self.reuse_address.store(enabled, Ordering::Release);
        Ok(())
    }

    async fn listen(&self, endpoint: &Endpoint) -> Result<(), NetError> {
        let mut inner = self.inner.lock().await;
        if !matches!(&*inner, ListenerKind::Idle) {
            return Err(NetError::io(
                ops::LISTEN,
                io::Error::new(io::ErrorKind::AlreadyExists, "listener already bound"),
            ));
        }
        let reuse = self.reuse_address.load(Ordering::Acquire);
        let (kind, local) = match endpoint {
            ep @ (Endpoint::Ip4 { .. } | Endpoint::Ip6 { .. }) => {
                // IP 族端点必有对应的 SocketAddr
                let Some(addr) = ep.to_socket_addr() else {
                    return Err(NetError::Unsupported {
                        detail: "ip endpoint without socket address",
                    });
                };
                let listener = bind_tcp(addr, self.backlog, reuse)?;
                let local = listener
                    .local_addr()
                    .map_err(|error| NetError::io(ops::LISTEN, error))?;
                (ListenerKind::Tcp(listener), Endpoint::from(local))
            }
            Endpoint::Local { name } => {
                #[cfg(unix)]
                {
                    let (listener, local) = bind_local(name)?;
                    (ListenerKind::Unix(listener), local)
                }
                #[cfg(not(unix))]
                {
                    let _ = name;
                    return Err(NetError::Unsupported {
                        detail: "local sockets are not available on this platform",
                    });
                }
            }
            Endpoint::Null => return Err(NetError::bad_address("null://")),
        };
        *lock(&self.local) = Some(local);
        *inner = kind;
        Ok(())
    }

    async fn local_endpoint(&self) -> Result<Endpoint, NetError> {
        lock(&self.local).clone().ok_or_else(|| {
            NetError::io(
                ops::LOCAL_ENDPOINT,
                io::Error::new(io::ErrorKind::NotConnected, "listener is not listening"),
            )
        })
    }

    async fn accept(&self) -> Result<Option<StreamConn>, NetError> {
        let inner = self.inner.lock().await;
        match &*inner {
            ListenerKind::Idle => Err(NetError::io(
                ops::ACCEPT,
                io::Error::new(io::ErrorKind::NotConnected, "listener is not listening"),
            )),
            ListenerKind::Tcp(listener) => {
                tokio::select! {
                    biased;
                    _ = self.closed.cancelled() => Ok(None),
                    result = listener.accept() => match result {
                        Ok((stream, peer)) => {
                            let local = stream
                                .local_addr()
                                .map(Endpoint::from)
                                .map_err(|error| NetError::io(ops::ACCEPT, error))?;
                            Ok(Some(TokioStreamSocket::spawn(
                                StreamIo::Tcp(stream),
                                local,
                                Endpoint::from(peer),
                            )))
                        }
                        Err(error) => Err(NetError::io(ops::ACCEPT, error)),
                    }
                }
            }
            #[cfg(unix)]
            ListenerKind::Unix(listener) => {
                tokio::select! {
                    biased;
                    _ = self.closed.cancelled() => Ok(None),
                    result = listener.accept() => match result {
                        Ok((stream, peer)) => {
                            let local = lock(&self.local)
                                .clone()
                                .unwrap_or_else(Endpoint::local_anonymous);
                            Ok(Some(TokioStreamSocket::spawn(
                                StreamIo::Unix(stream),
                                local,
                                tokio_unix_endpoint(&peer),
                            )))
                        }
                        Err(error) => Err(NetError::io(ops::ACCEPT, error)),
                    }
                }
            }
        }
    }

    async fn close(&self) {
        self.closed.cancel();
        let mut inner = self.inner.lock().await;
        *inner = ListenerKind::Idle;
    }
}

/// Tokio 主动拨号能力。
///
/// # 教案式说明
/// - **契约 (What)**：`bind` 以试绑定校验本地端点可用性并记录选择，
///   真正的绑定在每次 `connect` 时施加到新建套接字；绑定的本地端点仅
///   施加于同族的出站连接；
/// - **取消 (How)**：`connect` 返回的 Future 被丢弃时，内部的
///   `TcpSocket::connect` 随之丢弃，内核中的半开尝试被关闭——这正是
///   上层超时与调用方取消所依赖的语义。
#[derive(Debug)]
pub(super) struct TokioStreamDialer {
    local: StdMutex<Option<Endpoint>>,
}

impl TokioStreamDialer {
    pub(super) fn new() -> Self {
        Self {
            local: StdMutex::new(None),
        }
    }
}

#[async_trait]
impl StreamDialer for TokioStreamDialer {
    async fn bind(&self, endpoint: &Endpoint) -> Result<(), NetError> {
        match endpoint {
            Endpoint::Null => {
                *lock(&self.local) = None;
                Ok(())
            }
            ep @ (Endpoint::Ip4 { .. } | Endpoint::Ip6 { .. }) => {
                let Some(addr) = ep.to_socket_addr() else {
                    return Err(NetError::Unsupported {
                        detail: "ip endpoint without socket address",
                    });
                };
                let socket = tcp_socket_for(&addr, ops::BIND)?;
                socket
                    .bind(addr)
                    .map_err(|error| NetError::io(ops::BIND, error))?;
                *lock(&self.local) = Some(ep.clone());
                Ok(())
            }
            Endpoint::Local { name } => {
                #[cfg(unix)]
                {
                    let _ = name;
                    *lock(&self.local) = Some(endpoint.clone());
                    return Ok(());
                }
                #[cfg(not(unix))]
                {
                    let _ = name;
                    Err(NetError::Unsupported {
                        detail: "local sockets are not available on this platform",
                    })
                }
            }
        }
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<StreamConn, NetError> {
        match endpoint {
            ep @ (Endpoint::Ip4 { .. } | Endpoint::Ip6 { .. }) => {
                let Some(addr) = ep.to_socket_addr() else {
                    return Err(NetError::Unsupported {
                        detail: "ip endpoint without socket address",
                    });
                };
                let socket = tcp_socket_for(&addr, ops::CONNECT)?;
                let bound = lock(&self.local)
                    .clone()
                    .and_then(|ep| ep.to_socket_addr())
                    .filter(|bound| bound.is_ipv4() == addr.is_ipv4());
                if let Some(local) = bound {
                    socket
                        .bind(local)
                        .map_err(|error| NetError::io(ops::BIND, error))?;
                }
                let stream = socket
                    .connect(addr)
                    .await
                    .map_err(|error| NetError::io(ops::CONNECT, error))?;
                let local = stream
                    .local_addr()
                    .map(Endpoint::from)
                    .map_err(|error| NetError::io(ops::CONNECT, error))?;
                let remote = stream
                    .peer_addr()
                    .map(Endpoint::from)
                    .map_err(|error| NetError::io(ops::CONNECT, error))?;
                Ok(TokioStreamSocket::spawn(StreamIo::Tcp(stream), local, remote))
            }
            Endpoint::Local { name } => {
                #[cfg(unix)]
                return connect_local(name).await;
                #[cfg(not(unix))]
                {
                    let _ = name;
                    Err(NetError::Unsupported {
                        detail: "local sockets are not available on this platform",
                    })
                }
            }
            Endpoint::Null => Err(NetError::bad_address("null://")),
        }
    }
}

fn tcp_socket_for(addr: &SocketAddr, op: &'static str) -> Result<TcpSocket, NetError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    };
    socket.map_err(|error| NetError::io(op, error))
}

/// 经 `socket2` 构建 TCP 监听：复用选项在 bind 之前施加。
fn bind_tcp(addr: SocketAddr, backlog: u32, reuse: bool) -> Result<TcpListener, NetError> {
    let into_err = |error| NetError::io(ops::LISTEN, error);
    let socket =
        Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).map_err(into_err)?;
    socket.set_reuse_address(reuse).map_err(into_err)?;
    socket.bind(&addr.into()).map_err(into_err)?;
    socket.listen(backlog as i32).map_err(into_err)?;
    socket.set_nonblocking(true).map_err(into_err)?;
    TcpListener::from_std(socket.into()).map_err(into_err)
}

/// 绑定本地监听：抽象名（Linux）、匿名自动命名或路径名。
#[cfg(unix)]
fn bind_local(name: &str) -> Result<(UnixListener, Endpoint), NetError> {
    let into_err = |error| NetError::io(ops::LISTEN, error);
    let std_listener = if let Some(abstract_name) = name.strip_prefix(LOCAL_ABSTRACT_MARK) {
        bind_abstract(abstract_name)?
    } else if name.is_empty() {
        bind_abstract(&auto_local_name())?
    } else {
        std::os::unix::net::UnixListener::bind(name).map_err(into_err)?
    };
    std_listener.set_nonblocking(true).map_err(into_err)?;
    let local = std_listener
        .local_addr()
        .map(|addr| std_unix_endpoint(&addr))
        .map_err(into_err)?;
    let listener = UnixListener::from_std(std_listener).map_err(into_err)?;
    Ok((listener, local))
}

#[cfg(target_os = "linux")]
fn bind_abstract(name: &str) -> Result<std::os::unix::net::UnixListener, NetError> {
    use std::os::linux::net::SocketAddrExt;
    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())
        .map_err(|error| NetError::io(ops::LISTEN, error))?;
    std::os::unix::net::UnixListener::bind_addr(&addr)
        .map_err(|error| NetError::io(ops::LISTEN, error))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn bind_abstract(_name: &str) -> Result<std::os::unix::net::UnixListener, NetError> {
    Err(NetError::Unsupported {
        detail: "abstract local sockets require linux",
    })
}

/// 匿名本地监听的自动命名：进程内单调序号保证唯一。
#[cfg(unix)]
fn auto_local_name() -> String {
    use std::sync::atomic::AtomicU64;
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    format!(
        "rill-{}-{}",
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(unix)]
fn std_unix_endpoint(addr: &std::os::unix::net::SocketAddr) -> Endpoint {
    if let Some(path) = addr.as_pathname() {
        return Endpoint::Local {
            name: path.to_string_lossy().into_owned(),
        };
    }
    #[cfg(target_os = "linux")]
    {
        use std::os::linux::net::SocketAddrExt;
        if let Some(name) = addr.as_abstract_name() {
            let mut full = String::with_capacity(name.len() + 1);
            full.push(LOCAL_ABSTRACT_MARK);
            full.push_str(&String::from_utf8_lossy(name));
            return Endpoint::Local { name: full };
        }
    }
    Endpoint::local_anonymous()
}

#[cfg(unix)]
fn tokio_unix_endpoint(addr: &tokio::net::unix::SocketAddr) -> Endpoint {
    match addr.as_pathname() {
        Some(path) => Endpoint::Local {
            name: path.to_string_lossy().into_owned(),
        },
        None => Endpoint::local_anonymous(),
    }
}

/// 建立本地出站连接；阻塞式 connect 移交阻塞线程池执行。
#[cfg(unix)]
async fn connect_local(name: &str) -> Result<StreamConn, NetError> {
    let into_err = |error| NetError::io(ops::CONNECT, error);
    let stream = if let Some(abstract_name) = name.strip_prefix(LOCAL_ABSTRACT_MARK) {
        connect_abstract(abstract_name).await?
    } else if name.is_empty() {
        // 匿名端点没有可拨向的身份
        return Err(NetError::bad_address("local://"));
    } else {
        UnixStream::connect(name).await.map_err(into_err)?
    };
    let local = stream
        .local_addr()
        .map(|addr| tokio_unix_endpoint(&addr))
        .map_err(into_err)?;
    let remote = Endpoint::Local {
        name: name.to_owned(),
    };
    Ok(TokioStreamSocket::spawn(StreamIo::Unix(stream), local, remote))
}

#[cfg(target_os = "linux")]
async fn connect_abstract(name: &str) -> Result<UnixStream, NetError> {
    use std::os::linux::net::SocketAddrExt;
    let into_err = |error| NetError::io(ops::CONNECT, error);
    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())
        .map_err(into_err)?;
    let std_stream = tokio::task::spawn_blocking(move || {
        std::os::unix::net::UnixStream::connect_addr(&addr)
    })
    .await
    .map_err(|join_error| NetError::io(ops::CONNECT, io::Error::other(join_error)))?
    .map_err(into_err)?;
    std_stream.set_nonblocking(true).map_err(into_err)?;
    UnixStream::from_std(std_stream).map_err(into_err)
}

#[cfg(all(unix, not(target_os = "linux")))]
async fn connect_abstract(_name: &str) -> Result<UnixStream, NetError> {
    Err(NetError::Unsupported {
        detail: "abstract local sockets require linux",
    })
}
