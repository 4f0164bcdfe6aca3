//! Tokio 宿主提供者的单连接实现。
//!
//! ## 要点（What）
//! - 连接一经包装即拆分读写半部：读半部由独立接收任务泵入事件流，
//!   写半部经异步互斥锁串行化，互不阻塞；
//! - 接收任务以 watch 门闸实现输入锁定，新建连接的门闸处于关闭状态，
//!   `start_receive` 之前不产生任何 `Received` 事件；
//! - `Closed` 事件仅由接收任务发布，天然恰好一次：显式关闭、对端 EOF
//!   与读故障三条退出路径互斥。

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use rill_core::{
    Cancellation, Endpoint, NetError, SocketEvent, StreamConn, StreamSocket, ops,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, tcp};
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};

#[cfg(unix)]
use tokio::net::{UnixStream, unix};

/// 单次接收的缓冲步长。
const RECV_CHUNK: usize = 8 * 1024;

/// 族无关的流句柄。
#[derive(Debug)]
pub(super) enum StreamIo {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

#[derive(Debug)]
enum ReadIo {
    Tcp(tcp::OwnedReadHalf),
    #[cfg(unix)]
    Unix(unix::OwnedReadHalf),
}

#[derive(Debug)]
enum WriteIo {
    Tcp(tcp::OwnedWriteHalf),
    #[cfg(unix)]
    Unix(unix::OwnedWriteHalf),
}

impl StreamIo {
    fn into_split(self) -> (ReadIo, WriteIo) {
        match self {
            Self::Tcp(stream) => {
                let (read, write) = stream.into_split();
                (ReadIo::Tcp(read), WriteIo::Tcp(write))
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                let (read, write) = stream.into_split();
                (ReadIo::Unix(read), WriteIo::Unix(write))
            }
        }
    }
}

impl ReadIo {
    async fn read_chunk(&mut self, buffer: &mut BytesMut) -> io::Result<usize> {
        match self {
            Self::Tcp(read) => read.read_buf(buffer).await,
            #[cfg(unix)]
            Self::Unix(read) => read.read_buf(buffer).await,
        }
    }
}

impl WriteIo {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(write) => write.write_all(data).await,
            #[cfg(unix)]
            Self::Unix(write) => write.write_all(data).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(write) => AsyncWriteExt::shutdown(write).await,
            #[cfg(unix)]
            Self::Unix(write) => AsyncWriteExt::shutdown(write).await,
        }
    }

    fn set_no_delay(&self, enabled: bool) -> io::Result<()> {
        match self {
            Self::Tcp(write) => write.as_ref().set_nodelay(enabled),
            // 本地套接字无 no-delay 概念
            #[cfg(unix)]
            Self::Unix(_) => Ok(()),
        }
    }
}

/// Tokio 单连接套接字。
///
/// # 教案式说明
/// - **契约 (What)**：本地/远端端点在构造时定格，端点查询不再触碰内核；
///   `send` 在 `close` 之后返回 [`NetError::Closed`]；
/// - **并发 (How)**：命令面（本类型）与事件面（接收任务）只通过取消令牌
///   与门闸通信，不共享可变状态。
#[derive(Debug)]
pub(super) struct TokioStreamSocket {
    writer: AsyncMutex<Option<WriteIo>>,
    local: Endpoint,
    remote: Endpoint,
    gate: watch::Sender<bool>,
    closed: Cancellation,
}

impl TokioStreamSocket {
    /// 包装连接并启动接收任务，返回套接字与其事件流。
    pub(super) fn spawn(io: StreamIo, local: Endpoint, remote: Endpoint) -> StreamConn {
        let (read, write) = io.into_split();
        let (gate_tx, gate_rx) = watch::channel(false);
        let closed = Cancellation::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let socket = Arc::new(Self {
            writer: AsyncMutex::new(Some(write)),
            local,
            remote,
            gate: gate_tx,
            closed: closed.child(),
        });
        tokio::spawn(receive_loop(read, gate_rx, closed, events_tx));
        StreamConn {
            socket,
            events: events_rx,
        }
    }
}

#[async_trait]
impl StreamSocket for TokioStreamSocket {
    async fn local_endpoint(&self) -> Result<Endpoint, NetError> {
        Ok(self.local.clone())
    }

    async fn remote_endpoint(&self) -> Result<Endpoint, NetError> {
        Ok(self.remote.clone())
    }

    fn set_no_delay(&self, enabled: bool) -> Result<(), NetError> {
        // 仅在通道移交消费者之前调用，此时写半部必然空闲。
        let Ok(guard) = self.writer.try_lock() else {
            return Err(NetError::io(
                ops::SET_OPTION,
                io::Error::new(io::ErrorKind::WouldBlock, "socket write half is busy"),
            ));
        };
        match guard.as_ref() {
            Some(writer) => writer
                .set_no_delay(enabled)
                .map_err(|error| NetError::io(ops::SET_OPTION, error)),
            None => Err(NetError::Closed),
        }
    }

    async fn send(&self, data: Bytes) -> Result<(), NetError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(NetError::Closed);
        };
        writer
            .write_all(&data)
            .await
            .map_err(|error| NetError::io(ops::SEND, error))
    }

    fn start_receive(&self) {
        self.gate.send_replace(true);
    }

    fn stop_receive(&self) {
        self.gate.send_replace(false);
    }

    async fn close(&self) {
        self.closed.cancel();
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            let _ = writer.shutdown().await;
        }
    }
}

/// 接收任务：门闸放行时读取字节并泵入事件流。
///
/// 退出路径（互斥，各自发布至多一个终结事件）：
/// - 取消令牌置位（显式关闭）→ `Closed`；
/// - 读到 EOF → `Closed`；
/// - 读故障 → `Failed`；
/// - 事件接收端或门闸发送端消失 → 静默退出。
async fn receive_loop(
    mut read: ReadIo,
    mut gate: watch::Receiver<bool>,
    closed: Cancellation,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let mut buffer = BytesMut::with_capacity(RECV_CHUNK);
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
        buffer.reserve(RECV_CHUNK);
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
            result = read.read_chunk(&mut buffer) => match result {
                Ok(0) => {
                    let _ = events.send(SocketEvent::Closed);
                    return;
                }
                Ok(_) => {
                    if events.send(SocketEvent::Received(buffer.split().freeze())).is_err() {
                        return;
                    }
                }
                Err(error) => {
                    let _ = events.send(SocketEvent::Failed(NetError::io(ops::RECEIVE, error)));
                    return;
                }
            }
        }
    }
}
