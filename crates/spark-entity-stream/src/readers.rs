//! 常用读取端实现。
//!
//! - [`CollectingReader`]：按批授信并收集全部数据项，经 `oneshot` 通道交付结果，是同步代码与异步调用方之间的桥；
//! - [`DrainReader`]：以最大信用读取并丢弃数据项，只统计数量；
//! - [`CancelingReader`]：挂载即取消，用于不需要实体内容的调用方。

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::channel::oneshot;
use tracing::debug;

use crate::contract::Reader;
use crate::error::Cause;
use crate::handle::ReadHandle;
use crate::sync::Mutex;

/// 收集结果：成功时为全部数据项，失败时为终止原因。
pub type Collected<T> = Result<Vec<T>, Cause>;

/// 收集全部数据项的读取端。
///
/// # 教案式说明
/// - **意图 (Why)**：上层（例如把响应体整体解码的调用方）只关心最终结果，
///   不希望自行维护信用与终止状态。
/// - **逻辑 (How)**：`on_init` 请求 `batch` 项；每收满一批再请求下一批；`on_done`/`on_error`
///   通过 `oneshot::Sender` 交付结果，发送端只会被取走一次。
/// - **契约 (What)**：接收端被丢弃时结果静默丢失，不视为错误。
pub struct CollectingReader<T> {
    batch: NonZeroU32,
    state: Mutex<Collecting<T>>,
}

struct Collecting<T> {
    handle: Option<ReadHandle>,
    items: Vec<T>,
    in_batch: u32,
    sender: Option<oneshot::Sender<Collected<T>>>,
}

impl<T> CollectingReader<T> {
    /// 一次性授予最大信用的收集器。
    pub fn new() -> (Self, oneshot::Receiver<Collected<T>>) {
        Self::with_batch(NonZeroU32::MAX)
    }

    /// 每批授予 `batch` 个信用的收集器。
    pub fn with_batch(batch: NonZeroU32) -> (Self, oneshot::Receiver<Collected<T>>) {
        let (sender, receiver) = oneshot::channel();
        let reader = Self {
            batch,
            state: Mutex::new(Collecting {
                handle: None,
                items: Vec::new(),
                in_batch: 0,
                sender: Some(sender),
            }),
        };
        (reader, receiver)
    }

    fn complete(&self, result: Collected<T>) {
        let sender = {
            let mut state = self.state.lock();
            state.handle = None;
            state.sender.take()
        };
        if let Some(sender) = sender
            && sender.send(result).is_err()
        {
            debug!("collected result dropped: receiver is gone");
        }
    }
}

impl<T: Send + 'static> Reader<T> for CollectingReader<T> {
    fn on_init(&self, handle: ReadHandle) -> Result<(), Cause> {
        self.state.lock().handle = Some(handle.clone());
        handle.request(self.batch.get())?;
        Ok(())
    }

    fn on_data_available(&self, item: T) -> Result<(), Cause> {
        let refill = {
            let mut state = self.state.lock();
            state.items.push(item);
            state.in_batch += 1;
            if state.in_batch < self.batch.get() {
                None
            } else {
                state.in_batch = 0;
                state.handle.clone()
            }
        };
        if let Some(handle) = refill {
            handle.request(self.batch.get())?;
        }
        Ok(())
    }

    fn on_done(&self) -> Result<(), Cause> {
        let items = std::mem::take(&mut self.state.lock().items);
        self.complete(Ok(items));
        Ok(())
    }

    fn on_error(&self, cause: Cause) -> Result<(), Cause> {
        self.state.lock().items.clear();
        self.complete(Err(cause));
        Ok(())
    }
}

/// 读取并丢弃全部数据项的读取端，完成时交付丢弃的数量。
pub struct DrainReader {
    drained: AtomicU64,
    handle: Mutex<Option<ReadHandle>>,
    sender: Mutex<Option<oneshot::Sender<Result<u64, Cause>>>>,
}

impl DrainReader {
    pub fn new() -> (Self, oneshot::Receiver<Result<u64, Cause>>) {
        let (sender, receiver) = oneshot::channel();
        let reader = Self {
            drained: AtomicU64::new(0),
            handle: Mutex::new(None),
            sender: Mutex::new(Some(sender)),
        };
        (reader, receiver)
    }

    /// 截至目前已丢弃的数据项数。
    pub fn drained(&self) -> u64 {
        self.drained.load(Ordering::Acquire)
    }

    fn complete(&self, result: Result<u64, Cause>) {
        self.handle.lock().take();
        let sender = self.sender.lock().take();
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }
}

impl<T: 'static> Reader<T> for DrainReader {
    fn on_init(&self, handle: ReadHandle) -> Result<(), Cause> {
        *self.handle.lock() = Some(handle.clone());
        handle.request(u32::MAX)?;
        Ok(())
    }

    fn on_data_available(&self, item: T) -> Result<(), Cause> {
        drop(item);
        self.drained.fetch_add(1, Ordering::AcqRel);
        // 每丢弃一项补回一个信用，使信用上限小于 u32::MAX 时也能读完。
        let handle = self.handle.lock().clone();
        if let Some(handle) = handle {
            handle.request(1)?;
        }
        Ok(())
    }

    fn on_done(&self) -> Result<(), Cause> {
        self.complete(Ok(self.drained()));
        Ok(())
    }

    fn on_error(&self, cause: Cause) -> Result<(), Cause> {
        self.complete(Err(cause));
        Ok(())
    }
}

/// 挂载即取消的读取端。
#[derive(Clone, Copy, Debug, Default)]
pub struct CancelingReader;

impl<T: 'static> Reader<T> for CancelingReader {
    fn on_init(&self, handle: ReadHandle) -> Result<(), Cause> {
        handle.cancel();
        Ok(())
    }

    fn on_data_available(&self, _item: T) -> Result<(), Cause> {
        Ok(())
    }

    fn on_done(&self) -> Result<(), Cause> {
        Ok(())
    }

    fn on_error(&self, _cause: Cause) -> Result<(), Cause> {
        Ok(())
    }
}
