//! 连接器：同时充当上游流的读取端与下游流的生产者，把下游信用翻译为上游需求。
//!
//! # 设计缘起（Why）
//! - 代理、转码、埋点等中间环节需要把一条流接到另一条流上，而两端互不感知；
//!   连接器让上游的生产节奏始终跟随下游消费者的授信，既不过量拉取，也不会饿死下游。
//!
//! # 信用翻译（How）
//! - `outstanding` 记录 “已向上游请求、尚未转发到下游” 的数据项数；
//! - 每转发一项后计算 `diff = 下游 remaining() - outstanding`，`diff > 0` 时向上游补请求 `diff` 项；
//! - 下游 `on_write_possible` 时把 `outstanding` 重置为下游剩余信用并整体向上游请求。
//!
//! # 并发约束（What）
//! - 上游方向（读取端回调）与下游方向（生产者回调）可能来自不同线程，共享字段由一把短临界区互斥锁保护；
//! - 锁从不跨越任何句柄调用：句柄先克隆出来，再在锁外调用。

use std::fmt;
use std::mem;

use tracing::debug;

use crate::contract::{Reader, Writer};
use crate::error::Cause;
use crate::handle::{ReadHandle, WriteHandle};
use crate::sync::Mutex;

type Transform<I, O> = Box<dyn Fn(I) -> Result<O, Cause> + Send + Sync>;

/// 读取端先于写句柄收到的终止事件，待下游可写时补发。
enum Pending {
    Done,
    Error(Cause),
}

struct State<O> {
    write: Option<WriteHandle<O>>,
    read: Option<ReadHandle>,
    outstanding: i64,
    aborted: bool,
    pending: Option<Pending>,
}

/// 流水线中的一级连接器。
///
/// # 教案式说明
/// - **意图 (Why)**：作为 `Arc<Connector>` 同时交给上游 `set_reader` 与下游 `EntityStream::new`，
///   在两条流之间转发数据、完成与失败，并把下游中止回传为上游取消。
/// - **契约 (What)**：
///   - 上游 `on_done`/`on_error` 在写句柄存在时转发给下游；尚无写句柄（仅作读取端）时暂存，
///     待下游 `on_write_possible` 补发；
///   - 下游 `on_abort` 后置位 `aborted` 并取消上游，之后到达的数据项直接丢弃；
///   - 转换函数返回 `Err` 时下游以该原因失败，上游随之中止。
/// - **风险提示 (Trade-offs)**：`outstanding` 以 `i64` 计数，不做饱和处理；它的量级受下游信用上限约束。
pub struct Connector<I, O = I> {
    state: Mutex<State<O>>,
    transform: Transform<I, O>,
}

impl<T: Send + 'static> Connector<T, T> {
    /// 原样转发的连接器。
    pub fn new() -> Self {
        Self::with_transform(Ok)
    }
}

impl<T: Send + 'static> Default for Connector<T, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: 'static, O: 'static> Connector<I, O> {
    /// 在转发前对每个数据项执行转换。
    pub fn with_transform<F>(transform: F) -> Self
    where
        F: Fn(I) -> Result<O, Cause> + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(State {
                write: None,
                read: None,
                outstanding: 0,
                aborted: false,
                pending: None,
            }),
            transform: Box::new(transform),
        }
    }

    /// 由流水线之外的调用方取消上游。
    pub fn cancel(&self) {
        let read = self.state.lock().read.clone();
        if let Some(read) = read {
            read.cancel();
        }
    }

    /// 已向上游请求但尚未转发的数据项数。
    pub fn outstanding(&self) -> i64 {
        self.state.lock().outstanding
    }

    /// 下游是否已中止。
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// 向上游补齐 `下游剩余信用 - outstanding` 的差额。
    fn top_up(&self, write: &WriteHandle<O>) -> Result<(), Cause> {
        let remaining = i64::from(write.remaining());
        let (read, diff) = {
            let mut state = self.state.lock();
            let Some(read) = state.read.clone() else {
                return Ok(());
            };
            let diff = remaining - state.outstanding;
            if diff <= 0 {
                return Ok(());
            }
            state.outstanding += diff;
            (read, diff)
        };
        let requested = u32::try_from(diff).unwrap_or(u32::MAX);
        read.request(requested)?;
        Ok(())
    }
}

impl<I: Send + 'static, O: Send + 'static> Reader<I> for Connector<I, O> {
    fn on_init(&self, handle: ReadHandle) -> Result<(), Cause> {
        let (write, aborted) = {
            let mut state = self.state.lock();
            state.read = Some(handle.clone());
            (state.write.clone(), state.aborted)
        };
        if aborted {
            debug!("downstream aborted before upstream attached; cancelling upstream");
            handle.cancel();
            return Ok(());
        }
        match write {
            Some(write) => self.top_up(&write),
            None => Ok(()),
        }
    }

    fn on_data_available(&self, item: I) -> Result<(), Cause> {
        let write = {
            let mut state = self.state.lock();
            if state.aborted {
                return Ok(());
            }
            state.outstanding -= 1;
            state.write.clone()
        };
        let Some(write) = write else {
            debug!("connector has no downstream; dropping item");
            return Ok(());
        };

        let item = match (self.transform)(item) {
            Ok(item) => item,
            Err(cause) => {
                debug!(error = %cause, "connector transform failed; failing downstream");
                write.error(cause.clone());
                return Err(cause);
            }
        };
        write.write(item)?;
        self.top_up(&write)
    }

    fn on_done(&self) -> Result<(), Cause> {
        let write = {
            let mut state = self.state.lock();
            if state.write.is_none() {
                state.pending = Some(Pending::Done);
            }
            state.write.clone()
        };
        if let Some(write) = write {
            write.done();
        }
        Ok(())
    }

    fn on_error(&self, cause: Cause) -> Result<(), Cause> {
        let write = {
            let mut state = self.state.lock();
            if state.write.is_none() {
                state.pending = Some(Pending::Error(cause.clone()));
            }
            state.write.clone()
        };
        if let Some(write) = write {
            write.error(cause);
        }
        Ok(())
    }
}

impl<I: Send + 'static, O: Send + 'static> Writer<O> for Connector<I, O> {
    fn on_init(&self, handle: WriteHandle<O>) -> Result<(), Cause> {
        self.state.lock().write = Some(handle);
        Ok(())
    }

    fn on_write_possible(&self) -> Result<(), Cause> {
        let (write, read, pending) = {
            let mut state = self.state.lock();
            let pending = state.pending.take();
            (state.write.clone(), state.read.clone(), pending)
        };
        let Some(write) = write else {
            return Ok(());
        };
        match pending {
            Some(Pending::Error(cause)) => {
                write.error(cause);
                return Ok(());
            }
            Some(Pending::Done) => {
                write.done();
                return Ok(());
            }
            None => {}
        }

        let remaining = write.remaining();
        let Some(read) = read else {
            // 上游尚未挂载：读句柄到达时由 on_init 补请求。
            return Ok(());
        };
        let previous = mem::replace(&mut self.state.lock().outstanding, i64::from(remaining));
        debug!(previous, remaining, "downstream write possible; requesting upstream");
        if remaining > 0 {
            read.request(remaining)?;
        }
        Ok(())
    }

    fn on_abort(&self, cause: Cause) -> Result<(), Cause> {
        let read = {
            let mut state = self.state.lock();
            state.aborted = true;
            state.read.clone()
        };
        debug!(error = %cause, "downstream aborted; cancelling upstream");
        if let Some(read) = read {
            read.cancel();
        }
        Ok(())
    }
}

impl<I, O> fmt::Debug for Connector<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Connector")
            .field("outstanding", &state.outstanding)
            .field("aborted", &state.aborted)
            .field("has_upstream", &state.read.is_some())
            .field("has_downstream", &state.write.is_some())
            .finish()
    }
}
