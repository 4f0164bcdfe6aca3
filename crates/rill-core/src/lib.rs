#![doc = r#"
# rill-core

## 设计动机（Why）
- **定位**：该 crate 承载流式传输适配层的纯契约：不透明地址与具体端点的
  数据模型、两者间的翻译规则、稳定错误域，以及宿主流式套接字设施的
  能力边界。
- **架构角色**：`rill-transport-net` 的 Acceptor/Connector/Channel 三元组
  只消费本 crate 的契约；宿主实现（Tokio 提供者、测试内存模拟）则实现
  这些契约，双方经由 trait 对象解耦。
- **设计理念**：强调“边界即契约”——套接字系统调用、名称解析与事件循环
  全部留在宿主侧，本 crate 不产生任何网络副作用。

## 核心契约（What）
- **地址模型**：[`Address`]（`scheme://authority` 不透明字符串）与
  [`Endpoint`]（IPv4/IPv6/本地套接字/空端点的封闭枚举）；
- **翻译规则**：[`codec::to_endpoint`] / [`codec::to_address`]，
  按 scheme 字面切分派发，往返翻译可复现等价地址；
- **错误域**：[`NetError`]，每个变体携带 `net.<语义>` 形式的稳定错误码，
  取消是独立结果而非故障；
- **能力边界**：[`contract`] 模块的 `Resolve`/`NetHost`/`StreamListener`/
  `StreamDialer`/`StreamSocket` 对象安全 trait 族。

## 实现策略（How）
- **并发原语**：[`Cancellation`] 以原子位加 `Notify` 提供可等待的协作式
  取消；[`EventHub`] 以订阅者列表扇出有序通知；
- **运行时中立**：仅依赖 `tokio/sync` 的同步原语，不绑定调度器；
  异步契约统一经 `async-trait` 保持对象安全。

## 风险与考量（Trade-offs）
- **无界通知队列**：事件扇出依赖订阅者及时消费，事件体量受连接数约束，
  未引入背压；
- **地址零校验**：`Address` 构造不做格式检查，非法输入推迟到翻译阶段
  统一拒绝，换取透传路径的零成本。
"#]

mod address;
mod cancel;
pub mod codec;
pub mod contract;
mod endpoint;
mod error;
mod event;

pub use address::{Address, SCHEME_LOCAL, SCHEME_TCP, SCHEME_TCP4, SCHEME_TCP6};
pub use cancel::Cancellation;
pub use contract::{
    NetHost, Resolve, SocketEvent, SocketEvents, StreamConn, StreamDialer, StreamListener,
    StreamSocket,
};
pub use endpoint::{Endpoint, LOCAL_ABSTRACT_MARK};
pub use error::{NetError, ops};
pub use event::EventHub;
