//! 观察者扇出：按注册顺序向全部观察者投递事件，逐个隔离失败。

use std::sync::Arc;

use tracing::warn;

use crate::contract::Observer;
use crate::error::{Cause, StreamError};

/// 冻结后的观察者序列。
///
/// # 教案式说明
/// - **意图 (Why)**：读取端挂载时观察者列表即被冻结，之后只读；以 `Arc<[_]>` 保存，
///   写路径在锁内克隆一次引用计数即可在锁外遍历。
/// - **契约 (What)**：
///   - 遍历顺序即注册顺序；
///   - 单个观察者返回 `Err` 只记录 `warn` 日志，不中断后续观察者，也不影响读取端投递。
pub(crate) struct ObserverSet<T> {
    observers: Arc<[Arc<dyn Observer<T>>]>,
}

impl<T> Clone for ObserverSet<T> {
    fn clone(&self) -> Self {
        Self {
            observers: Arc::clone(&self.observers),
        }
    }
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self {
            observers: Arc::from(Vec::new()),
        }
    }
}

impl<T> From<Vec<Arc<dyn Observer<T>>>> for ObserverSet<T> {
    fn from(observers: Vec<Arc<dyn Observer<T>>>) -> Self {
        Self {
            observers: Arc::from(observers),
        }
    }
}

impl<T: 'static> ObserverSet<T> {
    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn data(&self, label: &str, item: &T) {
        for observer in self.observers.iter() {
            if let Err(cause) = observer.on_data_available(item) {
                log_failure(label, "on_data_available", cause);
            }
        }
    }

    pub(crate) fn done(&self, label: &str) {
        for observer in self.observers.iter() {
            if let Err(cause) = observer.on_done() {
                log_failure(label, "on_done", cause);
            }
        }
    }

    pub(crate) fn error(&self, label: &str, cause: &Cause) {
        for observer in self.observers.iter() {
            if let Err(failure) = observer.on_error(cause) {
                log_failure(label, "on_error", failure);
            }
        }
    }
}

fn log_failure(label: &str, stage: &'static str, cause: Cause) {
    let failure = StreamError::Observer { stage, cause };
    warn!(stream = %label, error = %failure, "observer failure ignored");
}
