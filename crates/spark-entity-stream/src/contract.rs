//! 实体流的三类能力契约：生产者 [`Writer`]、消费者 [`Reader`] 与被动观察者 [`Observer`]。
//!
//! # 设计缘起（Why）
//! - 传输层、编解码层只通过这组 Trait 与实体流交互；实体流本身不做 I/O、不解析数据项，
//!   对数据项类型 `T` 保持完全泛型。
//! - 回调的“抛出”以 `Err(Cause)` 表达，由流核心按失败隔离规则转换为终止事件。
//!
//! # 契约约束（What）
//! - 所有回调均以 `&self` 接收：流核心可能在生产者自身的句柄调用内部重入它
//!   （例如 `write` 完成挂起的取消时回调 `on_abort`），实现方需用短临界区保护自身状态，
//!   且不得在持锁期间调用句柄方法。
//! - 同一方向上的回调不会被并发调用：生产者侧与消费者侧各自串行。
//! - 流核心从不在持有内部锁时调用这些回调。

use crate::error::Cause;
use crate::handle::{ReadHandle, WriteHandle};

/// 生产者契约：在获得信用后通过 [`WriteHandle`] 写出数据项。
///
/// # 教案式说明
/// - **意图 (Why)**：生产者不直接感知消费者，只依赖句柄上的 `remaining()` 与
///   `on_write_possible` 唤醒实现背压。
/// - **契约 (What)**：
///   - `on_init`：读取端挂载后调用且仅调用一次，交付写句柄；返回 `Err` 会使流进入中止态；
///   - `on_write_possible`：生产者此前观察到 `remaining() == 0` 后，首次有新信用时调用；
///   - `on_abort`：流因取消或投递失败而中止时调用，至多一次。
/// - **风险提示 (Trade-offs)**：任何回调返回的 `Err` 都只会被记录日志，不会反向传播给
///   触发调用链的一方。
pub trait Writer<T>: Send + Sync + 'static {
    /// 接收写句柄。
    fn on_init(&self, handle: WriteHandle<T>) -> Result<(), Cause>;

    /// 有新的信用可用。
    fn on_write_possible(&self) -> Result<(), Cause>;

    /// 流被中止，`cause` 为取消条件或导致中止的失败。
    fn on_abort(&self, cause: Cause) -> Result<(), Cause>;
}

/// 消费者契约：通过 [`ReadHandle`] 授予信用并接收数据与终止通知。
///
/// # 契约（What）
/// - 对于正常使用，`on_done` 与 `on_error` 恰好收到其一；
/// - `on_data_available` 返回 `Err` 会中止整条流：生产者收到 `on_abort`，观察者收到 `on_error`；
///   本读取端随后收到一次 `on_error` 作为它唯一的终止通知（不会再收到 `on_done`）；
/// - `on_init` 返回 `Err` 同样中止整条流，但本读取端不会再被回调（取消挂起期间除外）；
/// - `on_done` 返回 `Err` 时流已结束，失败仅以 `on_abort` 的形式尽力告知生产者。
pub trait Reader<T>: Send + Sync + 'static {
    /// 接收读句柄。
    fn on_init(&self, handle: ReadHandle) -> Result<(), Cause>;

    /// 收到一个数据项。
    fn on_data_available(&self, item: T) -> Result<(), Cause>;

    /// 生产者正常结束。
    fn on_done(&self) -> Result<(), Cause>;

    /// 流以失败结束。
    fn on_error(&self, cause: Cause) -> Result<(), Cause>;
}

/// 被动观察者：以只读方式旁听数据与终止事件，不参与流控。
///
/// 观察者按注册顺序、先于读取端收到事件；任何 `Err` 都被记录并忽略。
pub trait Observer<T>: Send + Sync + 'static {
    fn on_data_available(&self, item: &T) -> Result<(), Cause> {
        let _ = item;
        Ok(())
    }

    fn on_done(&self) -> Result<(), Cause> {
        Ok(())
    }

    fn on_error(&self, cause: &Cause) -> Result<(), Cause> {
        let _ = cause;
        Ok(())
    }
}
