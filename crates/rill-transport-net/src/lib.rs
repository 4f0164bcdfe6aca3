#![doc = r#"
# rill-transport-net

## 设计动机（Why）
- **定位**：该 crate 提供流式传输适配层的核心三元组——被动监听器
  [`Acceptor`]、主动拨号器 [`Connector`] 与双工通道 [`Channel`]——
  把宿主流式套接字设施的族差异与异步生命周期封装在统一的
  “监听 / 建连 / 通道”契约之后。
- **架构角色**：三元组只消费 `rill-core` 的宿主能力契约；默认特性
  `runtime-tokio` 附带一个 Tokio 宿主提供者 [`TokioNetHost`]，
  覆盖 TCP4/TCP6 与（Unix 平台的）本地套接字。
- **设计理念**：长时间运行的操作都是可取消的协作式任务，取消是预期
  结局而非故障；生命周期通知严格配对（每个 `Started` 恰有一个
  `Stopped`），建连的超时与取消保证不遗留无人接收的套接字。

## 核心契约（What）
- **输入条件**：调用方必须在 Tokio 运行时内使用本实现；地址为
  `scheme://authority` 形式，scheme 限于 {`tcp`,`tcp4`,`tcp6`,`local`}；
- **输出保障**：每个异步调用恰好以 {值, 错误, 取消} 之一收敛；出站
  建连受固定 2 秒截止时间约束，超时即中止底层尝试；
- **通道生命周期**：通道随“牵涉”终止而确定性拆除——消费者侧全部
  离场或套接字侧终结事件出现时，底层句柄立即释放。

## 实现策略（How）
- **取消注入**：所有挂起点经内部工具函数与取消令牌赛跑（`select!` +
  `biased`），取消胜出时未完成的 IO Future 被原地丢弃；
- **事件面**：组件以 `EventHub` 发布有序通知流，订阅互不阻塞；
- **流控**：通道不引入缓冲，锁定/解锁输入直接控制底层接收循环。

## 风险与考量（Trade-offs）
- **析构语义**：`Drop` 只能同步发出取消信号，套接字回收由后台任务
  异步完成；需要确定性时刻的调用方应使用异步的 `stop()`/`close()`；
- **接受循环退避**：监听级瞬态故障以固定 100ms 退避重试，未实现
  指数退避；
- **写路径串行化**：单连接的写半部经互斥锁串行化，超高并发写入场景
  可进一步拆分发送队列。
"#]

mod acceptor;
mod channel;
mod connector;
#[cfg(feature = "runtime-tokio")]
mod provider;
mod util;

pub use acceptor::{Acceptor, AcceptorEvent};
pub use channel::{Channel, ChannelEvent};
pub use connector::{CONNECT_TIMEOUT, Connector, ConnectorEvent};
#[cfg(feature = "runtime-tokio")]
pub use provider::TokioNetHost;
