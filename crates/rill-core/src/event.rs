//! # 通知流（EventHub）
//!
//! ## 核心意图（Why）
//! - 以“能力对象 + 具名通知流”替代继承式回调：组件暴露固定的事件枚举，
//!   观察者按需订阅，互不阻塞；
//! - 事件在单一任务内按发生顺序发布，订阅者侧的接收顺序与发布顺序一致，
//!   这是生命周期配对（`Started`/`Stopped`）语义的基础。
//!
//! ## 实现策略（How）
//! - 订阅者列表持有无界 `mpsc` 发送端；`emit` 克隆事件逐一投递，
//!   发送失败（订阅者已丢弃接收端）即从列表剔除；
//! - 无订阅者时事件被丢弃——通知是尽力而为的观测面，不承载控制流。

use std::sync::Mutex;

use tokio::sync::mpsc;

/// 轻量观察者注册表，按订阅者扇出克隆事件。
///
/// # 教案式说明
/// - **意图 (Why)**：Acceptor/Connector/Channel 的事件面都只需要
///   “订阅 + 有序投递 + 自动清理”三项能力，集中实现避免样板扩散；
/// - **契约 (What)**：
///   - `subscribe` 返回独立接收端，晚订阅者看不到历史事件；
///   - `emit` 不阻塞、不失败；事件类型须 `Clone`（错误以 `Arc` 包裹）；
/// - **风险 (Trade-offs)**：无界队列依赖订阅者及时消费；事件体量小且
///   频率受连接数约束，实践中不构成内存风险。
#[derive(Debug, Default)]
pub struct EventHub<T> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> EventHub<T> {
    /// 创建空注册表。
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// 注册新订阅者，返回其事件接收端。
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// 向所有在册订阅者投递事件，剔除已断开者。
    pub fn emit(&self, event: T) {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 多订阅者都按发布顺序收到事件，断开者被自动剔除。
    #[tokio::test]
    async fn fan_out_preserves_order_and_prunes_dropped() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let second = hub.subscribe();
        drop(second);

        hub.emit(1u32);
        hub.emit(2u32);

        assert_eq!(first.recv().await, Some(1));
        assert_eq!(first.recv().await, Some(2));
    }

    /// 无订阅者时 `emit` 静默丢弃事件。
    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let hub: EventHub<u32> = EventHub::new();
        hub.emit(7);
    }
}
