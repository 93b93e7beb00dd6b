//! 常用生产者实现。
//!
//! # 设计缘起（Why）
//! - 多数调用方的数据源在创建流时就已确定：空实体、单个数据项、一段内存中的字节或一个迭代器；
//!   这里提供对应的生产者，统一遵守 “有信用才写、信用耗尽则等待 `on_write_possible`” 的节奏。
//!
//! # 实现约束（What）
//! - 所有生产者都只在短临界区内读写自身状态，调用句柄方法前先释放锁：
//!   句柄调用可能同步重入 `on_abort`。

use std::fmt;
use std::marker::PhantomData;
use std::mem;

use bytes::Bytes;
use tracing::debug;

use crate::contract::Writer;
use crate::error::Cause;
use crate::handle::WriteHandle;
use crate::sync::Mutex;

/// 不产生任何数据项、在首次可写时立即结束的生产者。
pub struct EmptyWriter<T> {
    handle: Mutex<Option<WriteHandle<T>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EmptyWriter<T> {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for EmptyWriter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Writer<T> for EmptyWriter<T> {
    fn on_init(&self, handle: WriteHandle<T>) -> Result<(), Cause> {
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn on_write_possible(&self) -> Result<(), Cause> {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.done();
        }
        Ok(())
    }

    fn on_abort(&self, _cause: Cause) -> Result<(), Cause> {
        self.handle.lock().take();
        Ok(())
    }
}

/// 写出单个数据项后结束的生产者。
///
/// # 契约（What）
/// - 数据项在首次 `on_write_possible` 时写出并紧接着 `done()`；
/// - 中止时丢弃尚未写出的数据项。
pub struct SingletonWriter<T> {
    state: Mutex<Singleton<T>>,
}

struct Singleton<T> {
    handle: Option<WriteHandle<T>>,
    item: Option<T>,
}

impl<T> SingletonWriter<T> {
    pub fn new(item: T) -> Self {
        Self {
            state: Mutex::new(Singleton {
                handle: None,
                item: Some(item),
            }),
        }
    }
}

impl<T: Send + 'static> Writer<T> for SingletonWriter<T> {
    fn on_init(&self, handle: WriteHandle<T>) -> Result<(), Cause> {
        self.state.lock().handle = Some(handle);
        Ok(())
    }

    fn on_write_possible(&self) -> Result<(), Cause> {
        let (handle, item) = {
            let mut state = self.state.lock();
            (state.handle.take(), state.item.take())
        };
        let Some(handle) = handle else {
            return Ok(());
        };
        if let Some(item) = item {
            handle.write(item)?;
        }
        handle.done();
        Ok(())
    }

    fn on_abort(&self, cause: Cause) -> Result<(), Cause> {
        let mut state = self.state.lock();
        state.handle = None;
        if state.item.take().is_some() {
            debug!(error = %cause, "singleton writer aborted before writing");
        }
        Ok(())
    }
}

impl<T> fmt::Debug for SingletonWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SingletonWriter")
            .field("written", &state.item.is_none())
            .finish()
    }
}

/// 从迭代器按信用逐项写出的生产者。
///
/// # 教案式说明
/// - **意图 (Why)**：把任意同步数据源接入实体流，同时严格服从背压。
/// - **逻辑 (How)**：每次 `on_write_possible` 时循环 “检查 `remaining()` → 取下一项 → `write`”，
///   `remaining()` 归零即返回等待下一次唤醒；迭代器耗尽后 `done()`。
/// - **契约 (What)**：`on_abort` 后丢弃迭代器，循环在下一次检查时退出。
pub struct IterWriter<I: Iterator> {
    state: Mutex<IterState<I>>,
}

struct IterState<I: Iterator> {
    handle: Option<WriteHandle<I::Item>>,
    iter: Option<I>,
}

impl<I: Iterator> IterWriter<I> {
    pub fn new(source: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            state: Mutex::new(IterState {
                handle: None,
                iter: Some(source.into_iter()),
            }),
        }
    }

    /// 取出下一项；迭代器耗尽时交出句柄以便结束，已中止时返回 `Stopped`。
    fn advance(&self) -> Step<I::Item> {
        let mut state = self.state.lock();
        let Some(handle) = state.handle.clone() else {
            return Step::Stopped;
        };
        let Some(iter) = state.iter.as_mut() else {
            return Step::Stopped;
        };
        match iter.next() {
            Some(item) => Step::Item(handle, item),
            None => {
                state.iter = None;
                state.handle = None;
                Step::Exhausted(handle)
            }
        }
    }
}

enum Step<T> {
    Item(WriteHandle<T>, T),
    Exhausted(WriteHandle<T>),
    Stopped,
}

impl<I> Writer<I::Item> for IterWriter<I>
where
    I: Iterator + Send + 'static,
    I::Item: 'static,
{
    fn on_init(&self, handle: WriteHandle<I::Item>) -> Result<(), Cause> {
        self.state.lock().handle = Some(handle);
        Ok(())
    }

    fn on_write_possible(&self) -> Result<(), Cause> {
        loop {
            let handle = self.state.lock().handle.clone();
            match handle {
                Some(handle) if handle.remaining() > 0 => {}
                _ => return Ok(()),
            }
            match self.advance() {
                Step::Item(handle, item) => handle.write(item)?,
                Step::Exhausted(handle) => {
                    handle.done();
                    return Ok(());
                }
                Step::Stopped => return Ok(()),
            }
        }
    }

    fn on_abort(&self, cause: Cause) -> Result<(), Cause> {
        let dropped = {
            let mut state = self.state.lock();
            state.handle = None;
            mem::take(&mut state.iter)
        };
        if dropped.is_some() {
            debug!(error = %cause, "iterator writer aborted");
        }
        Ok(())
    }
}

/// 把一段字节按固定大小切分为零拷贝分片的迭代器。
#[derive(Clone, Debug)]
pub struct ByteChunks {
    data: Bytes,
    chunk_size: usize,
}

impl Iterator for ByteChunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.data.is_empty() {
            return None;
        }
        let at = self.chunk_size.min(self.data.len());
        Some(self.data.split_to(at))
    }
}

/// 以 `chunk_size` 字节为单位写出 `data` 的生产者；`chunk_size` 为 0 时按 1 处理。
///
/// 分片与原始 `Bytes` 共享底层缓冲区，不发生复制。
pub fn chunked_bytes(data: Bytes, chunk_size: usize) -> IterWriter<ByteChunks> {
    IterWriter::new(ByteChunks {
        data,
        chunk_size: chunk_size.max(1),
    })
}
