//! 集成测试共享的记录型桩实现。
//!
//! # 教案级说明
//! - **意图 (Why)**：各测试只关心 “流核心在何时、以何种顺序回调了谁”，因此桩实现把每一次回调
//!   追加到事件日志中，由测试在事后断言；
//! - **契约 (What)**：桩实现从不在持有自身锁时调用句柄方法，与生产代码遵守同一条重入约束；
//! - **注意事项 (Trade-offs)**：数据项以 `T: Clone` 形式回读，测试统一使用 `&'static str` 或整数。

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use spark_entity_stream::{Cause, Observer, ReadHandle, Reader, WriteHandle, Writer};

/// 生产者侧回调记录。
#[derive(Clone, Debug)]
pub enum WriterEvent {
    Init,
    WritePossible,
    Abort(Cause),
}

/// 读取端与观察者侧回调记录。
#[derive(Clone, Debug)]
pub enum ReaderEvent<T> {
    Init,
    Data(T),
    Done,
    Error(Cause),
}

/// 只记录回调、由测试手动驱动写入的生产者。
pub struct RecordingWriter<T> {
    handle: Mutex<Option<WriteHandle<T>>>,
    events: Mutex<Vec<WriterEvent>>,
    init_failure: Option<Cause>,
    write_possible_failure: Option<Cause>,
}

impl<T: Send + 'static> RecordingWriter<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None, None))
    }

    pub fn failing_init(cause: Cause) -> Arc<Self> {
        Arc::new(Self::build(Some(cause), None))
    }

    pub fn failing_write_possible(cause: Cause) -> Arc<Self> {
        Arc::new(Self::build(None, Some(cause)))
    }

    fn build(init_failure: Option<Cause>, write_possible_failure: Option<Cause>) -> Self {
        Self {
            handle: Mutex::new(None),
            events: Mutex::new(Vec::new()),
            init_failure,
            write_possible_failure,
        }
    }

    pub fn handle(&self) -> WriteHandle<T> {
        self.handle
            .lock()
            .clone()
            .expect("生产者尚未收到 on_init")
    }

    pub fn events(&self) -> Vec<WriterEvent> {
        self.events.lock().clone()
    }

    pub fn init_count(&self) -> usize {
        self.count(|event| matches!(event, WriterEvent::Init))
    }

    pub fn write_possible_count(&self) -> usize {
        self.count(|event| matches!(event, WriterEvent::WritePossible))
    }

    pub fn aborts(&self) -> Vec<Cause> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WriterEvent::Abort(cause) => Some(cause.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&WriterEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }
}

impl<T: Send + 'static> Writer<T> for RecordingWriter<T> {
    fn on_init(&self, handle: WriteHandle<T>) -> Result<(), Cause> {
        *self.handle.lock() = Some(handle);
        self.events.lock().push(WriterEvent::Init);
        match &self.init_failure {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    fn on_write_possible(&self) -> Result<(), Cause> {
        self.events.lock().push(WriterEvent::WritePossible);
        match &self.write_possible_failure {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    fn on_abort(&self, cause: Cause) -> Result<(), Cause> {
        self.events.lock().push(WriterEvent::Abort(cause));
        Ok(())
    }
}

/// 记录全部回调的读取端，可选地在 `on_init` 中授信或在指定回调中失败。
pub struct RecordingReader<T> {
    handle: Mutex<Option<ReadHandle>>,
    events: Mutex<Vec<ReaderEvent<T>>>,
    initial_request: Option<u32>,
    cancel_in_init: bool,
    init_failure: Option<Cause>,
    data_failure: Option<Cause>,
    done_failure: Option<Cause>,
}

impl<T: Clone + Send + 'static> RecordingReader<T> {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            events: Mutex::new(Vec::new()),
            initial_request: None,
            cancel_in_init: false,
            init_failure: None,
            data_failure: None,
            done_failure: None,
        }
    }

    pub fn requesting(mut self, n: u32) -> Self {
        self.initial_request = Some(n);
        self
    }

    /// 在 `on_init` 中授信之后立即取消。
    pub fn cancelling_in_init(mut self) -> Self {
        self.cancel_in_init = true;
        self
    }

    /// `on_init` 在授信与取消之后返回该失败。
    pub fn failing_init(mut self, cause: Cause) -> Self {
        self.init_failure = Some(cause);
        self
    }

    pub fn failing_data(mut self, cause: Cause) -> Self {
        self.data_failure = Some(cause);
        self
    }

    pub fn failing_done(mut self, cause: Cause) -> Self {
        self.done_failure = Some(cause);
        self
    }

    pub fn handle(&self) -> ReadHandle {
        self.handle
            .lock()
            .clone()
            .expect("读取端尚未收到 on_init")
    }

    pub fn items(&self) -> Vec<T> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ReaderEvent::Data(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn done_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ReaderEvent::Done))
            .count()
    }

    pub fn errors(&self) -> Vec<Cause> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ReaderEvent::Error(cause) => Some(cause.clone()),
                _ => None,
            })
            .collect()
    }

    /// 收到的终止通知总数（`on_done` 与 `on_error` 之和）。
    pub fn terminal_count(&self) -> usize {
        self.done_count() + self.errors().len()
    }
}

impl<T: Clone + Send + 'static> Reader<T> for RecordingReader<T> {
    fn on_init(&self, handle: ReadHandle) -> Result<(), Cause> {
        *self.handle.lock() = Some(handle.clone());
        self.events.lock().push(ReaderEvent::Init);
        if let Some(n) = self.initial_request {
            handle.request(n)?;
        }
        if self.cancel_in_init {
            handle.cancel();
        }
        match &self.init_failure {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    fn on_data_available(&self, item: T) -> Result<(), Cause> {
        self.events.lock().push(ReaderEvent::Data(item));
        match &self.data_failure {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    fn on_done(&self) -> Result<(), Cause> {
        self.events.lock().push(ReaderEvent::Done);
        match &self.done_failure {
            Some(cause) => Err(cause.clone()),
            None => Ok(()),
        }
    }

    fn on_error(&self, cause: Cause) -> Result<(), Cause> {
        self.events.lock().push(ReaderEvent::Error(cause));
        Ok(())
    }
}

/// 记录事件的观察者；`failing()` 版本在每个回调中都返回错误。
pub struct RecordingObserver<T> {
    events: Mutex<Vec<ReaderEvent<T>>>,
    failing: bool,
}

impl<T: Clone + Send + 'static> RecordingObserver<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            failing: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        })
    }

    pub fn items(&self) -> Vec<T> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ReaderEvent::Data(item) => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn done_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ReaderEvent::Done))
            .count()
    }

    pub fn errors(&self) -> Vec<Cause> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ReaderEvent::Error(cause) => Some(cause.clone()),
                _ => None,
            })
            .collect()
    }

    fn outcome(&self) -> Result<(), Cause> {
        if self.failing {
            Err(Cause::msg("observer failure"))
        } else {
            Ok(())
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observer<T> for RecordingObserver<T> {
    fn on_data_available(&self, item: &T) -> Result<(), Cause> {
        self.events.lock().push(ReaderEvent::Data(item.clone()));
        self.outcome()
    }

    fn on_done(&self) -> Result<(), Cause> {
        self.events.lock().push(ReaderEvent::Done);
        self.outcome()
    }

    fn on_error(&self, cause: &Cause) -> Result<(), Cause> {
        self.events.lock().push(ReaderEvent::Error(cause.clone()));
        self.outcome()
    }
}
