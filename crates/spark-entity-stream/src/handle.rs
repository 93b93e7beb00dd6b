//! 生产者与消费者手中的能力句柄。
//!
//! # 设计缘起（Why）
//! - 句柄是绑定到某一条流核心的无状态视图：自身不持有任何状态，每次调用都在核心锁下转发；
//! - 生产者只拿到 [`WriteHandle`]，消费者只拿到 [`ReadHandle`]，两端无法越权操作对方的能力。
//!
//! # 契约说明（What）
//! - 句柄可自由克隆，克隆体指向同一条流；
//! - 协议违例以 `Err(StreamError::Violation(..))` 同步返回给调用方，其它失败都被转换为终止事件。

use std::fmt;
use std::sync::Arc;

use crate::error::{Cause, StreamError};
use crate::stream::Core;

/// 读句柄背后的消费侧控制面，对数据项类型做擦除。
pub(crate) trait ReadControl: Send + Sync {
    fn request(&self, n: u32) -> Result<(), StreamError>;

    fn cancel(&self);

    fn label(&self) -> &str;
}

/// 生产者侧句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：生产者通过它写出数据项并宣告结束，同时借 `remaining()` 感知背压。
/// - **契约 (What)**：
///   - `write`：消耗一个信用；终止后写入返回 `WriteAfterTerminal`，超出信用返回 `CreditExceeded`，
///     流已中止时静默忽略；
///   - `done`/`error`：仅在活跃（或取消挂起）时生效，其余情况幂等；
///   - `remaining`：返回当前信用；为 0 时顺带登记 “下一次有信用时回调 `on_write_possible`”。
/// - **风险提示 (Trade-offs)**：同一生产者对句柄的调用需由调用方自行串行化，协议不防御两个生产者线程并发写入。
pub struct WriteHandle<T> {
    core: Arc<Core<T>>,
}

impl<T> Clone for WriteHandle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: 'static> WriteHandle<T> {
    pub(crate) fn new(core: Arc<Core<T>>) -> Self {
        Self { core }
    }

    /// 写出一个数据项。
    pub fn write(&self, item: T) -> Result<(), StreamError> {
        self.core.write(item)
    }

    /// 正常结束。
    pub fn done(&self) {
        self.core.done();
    }

    /// 以失败结束。
    pub fn error(&self, cause: Cause) {
        self.core.error(cause);
    }

    /// 剩余信用；非活跃时为 0。
    pub fn remaining(&self) -> u32 {
        self.core.remaining()
    }
}

impl<T: 'static> fmt::Debug for WriteHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("stream", &self.core.label())
            .finish()
    }
}

/// 消费者侧句柄。
///
/// # 教案式说明
/// - **意图 (Why)**：消费者以 `request(n)` 授予生产者 `n` 个额外写入许可，以 `cancel()` 发起协作式取消。
/// - **契约 (What)**：
///   - `request(0)` 返回 `NonPositiveRequest`；非活跃时为空操作；信用累加在上限处饱和；
///   - `cancel()`：生产者空闲（正在等待 `on_write_possible`）时立即中止，否则挂起为 `AbortRequested`，
///     由生产者下一次句柄调用完成中止；终态下为空操作。
#[derive(Clone)]
pub struct ReadHandle {
    control: Arc<dyn ReadControl>,
}

impl ReadHandle {
    pub(crate) fn new(control: Arc<dyn ReadControl>) -> Self {
        Self { control }
    }

    /// 授予 `n` 个写入许可。
    pub fn request(&self, n: u32) -> Result<(), StreamError> {
        self.control.request(n)
    }

    /// 取消流。
    pub fn cancel(&self) {
        self.control.cancel();
    }
}

impl fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHandle")
            .field("stream", &self.control.label())
            .finish()
    }
}
