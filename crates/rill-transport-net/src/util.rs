//! 内部工具：取消注入与互斥锁的中毒恢复。

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use rill_core::{Cancellation, NetError};

/// 让 `operation` 与取消信号赛跑；取消胜出时以 [`NetError::Cancelled`] 返回。
///
/// # 教案式说明
/// - **意图 (Why)**：Acceptor 的监听序列与 Connector 的绑定/拨号都由多个
///   挂起点组成，统一经本函数注入取消语义，避免每个挂起点手写 `select!`；
/// - **契约 (What)**：
///   - 取消分支优先判定（`biased`），已取消的令牌保证立即短路；
///   - 取消胜出时 `operation` 被原地丢弃，其内部未完成的 IO 随之中止；
/// - **风险 (Trade-offs)**：要求被包裹的 Future 满足丢弃即中止的语义，
///   这正是宿主契约对 `connect` 等操作的要求。
pub(crate) async fn run_cancellable<T, F>(cancel: &Cancellation, operation: F) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(NetError::Cancelled),
        result = operation => result,
    }
}

/// 获取互斥锁并恢复中毒状态：状态字段的不变量不依赖恐慌边界。
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
