//! # 双工通道（Channel）
//!
//! ## 核心意图（Why）
//! - 把一条已建立的宿主字节流包装成生命周期自治的通道对象：入站事件原样
//!   转发给消费者，命令（发送、关闭、流控）原样转发给底层套接字；
//! - 通道自身不做成帧、不做缓冲，唯一的背压手段是锁定/解锁底层接收循环。
//!
//! ## 生命周期（What）
//! - 通道由 Acceptor（入站接受）或 Connector（出站建连）创建；
//! - “牵涉”语义：只要消费者侧（外部 [`Channel`] 克隆）或套接字侧（中继
//!   任务的事件订阅）仍有一方存活，通道即为牵涉状态；最后一个外部克隆
//!   丢弃时触发拆除令牌，底层套接字被关闭、中继任务结束——不存在外部的
//!   显式销毁调用；
//! - 新建通道的输入处于锁定状态，消费者调用 [`Channel::unlock_input`]
//!   后数据才开始流动。

use std::sync::Arc;

use bytes::Bytes;
use rill_core::{
    Address, Cancellation, EventHub, NetError, SocketEvent, SocketEvents, StreamConn, StreamSocket,
    codec,
};
use tokio::sync::mpsc;

/// 通道对外发布的事件。
#[derive(Clone, Debug)]
pub enum ChannelEvent {
    /// 入站数据，未经任何改写。
    Input(Bytes),
    /// 底层套接字已关闭；每条通道至多一次。
    Closed,
    /// 底层传输故障，原样透传。
    Failed(Arc<NetError>),
}

#[derive(Debug)]
struct ChannelShared {
    original_remote: Address,
    socket: Arc<dyn StreamSocket>,
    hub: EventHub<ChannelEvent>,
}

/// 消费者侧的牵涉凭据：最后一份克隆丢弃时触发拆除。
#[derive(Debug)]
struct Involvement {
    teardown: Cancellation,
}

impl Drop for Involvement {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}

/// 生命周期自治的双工字节流通道。
///
/// # 教案式说明
/// - **意图 (Why)**：调用方获得的是可克隆的轻量句柄；句柄即牵涉凭据，
///   丢弃所有克隆等价于宣告“消费者不再需要这条连接”；
/// - **契约 (What)**：
///   - [`events`](Self::events) 返回有序事件流，晚订阅者看不到历史事件；
///   - [`send`](Self::send) 在关闭后返回 [`NetError::Closed`]；
///   - [`original_remote_address`](Self::original_remote_address) 对入站
///     通道为空地址（接受侧无从得知调用方想要到达的地址）；
/// - **风险 (Trade-offs)**：事件转发经一层无界队列，锁定输入可停住底层
///   接收循环，但已入队的事件仍会送达订阅者。
#[derive(Clone, Debug)]
pub struct Channel {
    shared: Arc<ChannelShared>,
    _involvement: Arc<Involvement>,
}

impl Channel {
    /// 把宿主交付的连接包装成通道并启动事件中继任务。
    ///
    /// - **前置条件**：当前线程位于 Tokio 运行时内；
    /// - **后置条件**：返回的句柄是唯一的消费者侧凭据，中继任务持有
    ///   套接字侧。
    pub(crate) fn spawn(original_remote: Address, conn: StreamConn) -> Self {
        let StreamConn { socket, events } = conn;
        let shared = Arc::new(ChannelShared {
            original_remote,
            socket,
            hub: EventHub::new(),
        });
        let teardown = Cancellation::new();
        tokio::spawn(relay(shared.clone(), events, teardown.child()));
        Self {
            shared,
            _involvement: Arc::new(Involvement { teardown }),
        }
    }

    /// 订阅通道事件流。
    pub fn events(&self) -> mpsc::UnboundedReceiver<ChannelEvent> {
        self.shared.hub.subscribe()
    }

    /// 发送一段字节；无额外缓冲承诺，语义与底层套接字一致。
    pub async fn send(&self, data: Bytes) -> Result<(), NetError> {
        self.shared.socket.send(data).await
    }

    /// 锁定输入：暂停底层接收循环，唯一的背压手段。
    pub fn lock_input(&self) {
        self.shared.socket.stop_receive();
    }

    /// 解锁输入：恢复底层接收循环。
    pub fn unlock_input(&self) {
        self.shared.socket.start_receive();
    }

    /// 关闭底层套接字；`Closed` 事件由套接字闭环回报，至多一次。
    pub async fn close(&self) {
        self.shared.socket.close().await;
    }

    /// 查询本地地址：底层端点经 [`codec::to_address`] 渲染。
    ///
    /// 底层查询的失败或取消原样转发，不做语义翻译。
    pub async fn local_address(&self) -> Result<Address, NetError> {
        let endpoint = self.shared.socket.local_endpoint().await?;
        Ok(codec::to_address(&endpoint))
    }

    /// 查询远端地址，语义同 [`local_address`](Self::local_address)。
    pub async fn remote_address(&self) -> Result<Address, NetError> {
        let endpoint = self.shared.socket.remote_endpoint().await?;
        Ok(codec::to_address(&endpoint))
    }

    /// 调用方当初想要到达的地址；入站通道为空地址。
    pub fn original_remote_address(&self) -> Address {
        self.shared.original_remote.clone()
    }
}

/// 事件中继：套接字事件 → 通道事件，直至任一侧退出牵涉。
async fn relay(shared: Arc<ChannelShared>, mut source: SocketEvents, teardown: Cancellation) {
    loop {
        tokio::select! {
            _ = teardown.cancelled() => {
                // 消费者侧已全部离场：关闭套接字，结束中继。
                shared.socket.close().await;
                tracing::debug!("通道牵涉结束，底层套接字已释放");
                return;
            }
            event = source.recv() => match event {
                Some(SocketEvent::Received(data)) => {
                    shared.hub.emit(ChannelEvent::Input(data));
                }
                Some(SocketEvent::Closed) => {
                    shared.hub.emit(ChannelEvent::Closed);
                }
                Some(SocketEvent::Failed(error)) => {
                    tracing::debug!(code = error.code(), "通道底层故障");
                    shared.hub.emit(ChannelEvent::Failed(Arc::new(error)));
                }
                // 套接字侧事件流终止，中继随之结束。
                None => return,
            }
        }
    }
}
