//! # 取消原语（Cancellation）
//!
//! ## 核心意图（Why）
//! - 所有长时间运行的操作（监听建立、出站连接、事件中继）都必须可被外部
//!   主动打断，以避免资源占用扩散；
//! - 取消是协作式的：持有令牌的任务在挂起点感知取消并执行自身的回滚路径，
//!   框架不强制终止正在执行的 Future。
//!
//! ## 实现策略（How）
//! - 原子位承载取消状态，`cancel` 首次置位返回 `true`，供调用方区分
//!   “本次触发”与“早已取消”；
//! - 叠加 `tokio::sync::Notify` 提供 [`Cancellation::cancelled`] 等待点，
//!   任务可直接 `select!` 取消信号与 IO Future，无需轮询。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// 协作式取消令牌，可克隆共享同一取消位。
///
/// # 教案式说明
/// - **意图 (Why)**：统一 Acceptor/Connector/Channel 三者的停机语义，
///   任何一侧触发取消后，所有派生令牌同时可见；
/// - **契约 (What)**：
///   - 构造后处于“未取消”状态；
///   - `cancel` 幂等，重复调用返回 `false`；
///   - `cancelled().await` 在取消后立即返回，包括“先取消后等待”的时序；
/// - **风险 (Trade-offs)**：未提供回调注册接口，等待方必须主动挂起在
///   `cancelled()` 上；这保持了实现极简，也与 `select!` 的使用方式吻合。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

impl Cancellation {
    /// 创建处于“未取消”状态的令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 标记取消并唤醒所有等待者。
    ///
    /// 返回 `true` 表示本次调用首次触发取消。
    pub fn cancel(&self) -> bool {
        let first = self
            .inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// 挂起直至令牌被取消；已取消时立即返回。
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // 置位发生在 notified 注册之后也不会丢失唤醒：再查一次标志。
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// 派生共享同一取消位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 首次取消返回 `true`，重复取消幂等。
    #[test]
    fn cancel_is_idempotent_and_first_call_wins() {
        let token = Cancellation::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
        assert!(token.child().is_cancelled());
    }

    /// 等待方在取消后被唤醒，先取消后等待同样立即返回。
    #[tokio::test]
    async fn cancelled_wakes_waiters_in_both_orders() {
        let token = Cancellation::new();
        let waiter = token.child();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.expect("等待任务不应崩溃");

        let pre = Cancellation::new();
        pre.cancel();
        pre.cancelled().await;
    }
}
