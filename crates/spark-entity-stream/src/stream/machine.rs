//! 实体流核心状态机。
//!
//! # 设计缘起（Why）
//! - 生产者侧（`write`/`done`/`error`/`remaining`）与消费者侧（`request`/`cancel`）可能来自不同线程，
//!   核心以一把互斥锁作为唯一同步点，保证状态与信用的线性一致视图。
//! - 所有用户回调都在锁外执行：锁内只做状态判定并克隆出需要回调的能力引用，
//!   回调返回后若需再次判定，则重新加锁复核。
//!
//! # 状态机（What）
//! ```text
//! Uninitialized ──set_reader──▶ Active ──done/error──▶ Finished
//!                                 │  └──cancel(生产者空闲)/投递失败──▶ Aborted
//!                                 └──cancel(生产者可能在途)──▶ AbortRequested ──下一次生产者调用──▶ Aborted
//! Active ──writer.on_init 失败──▶ InitFailed { cause, notified }
//! ```
//! - 终止转换只由完成转换的那一次调用负责通知，并在同一临界区内取走 writer/reader/observers，
//!   之后的任何调用都找不到可通知的对象，从而保证 “至多一次”。
//! - 取走能力引用同时打断 `句柄 → 核心 → 能力 → 句柄` 的引用环，终止后核心可被确定性释放。

use std::mem;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::EntityStreamConfig;
use crate::contract::{Observer, Reader, Writer};
use crate::error::{Cause, ProtocolViolation, StreamError};
use crate::handle::{ReadControl, ReadHandle, WriteHandle};
use crate::stream::StreamState;
use crate::stream::fanout::ObserverSet;
use crate::sync::{Mutex, MutexGuard};

/// 内部阶段；`InitFailed` 取代了 “生产者初始化失败后替换读句柄” 的哨兵对象。
enum Phase {
    Uninitialized,
    Active,
    AbortRequested,
    Finished,
    Aborted,
    InitFailed { cause: Cause, notified: bool },
}

impl Phase {
    fn is_open(&self) -> bool {
        matches!(self, Phase::Active | Phase::AbortRequested)
    }

    fn public(&self) -> StreamState {
        match self {
            Phase::Uninitialized => StreamState::Uninitialized,
            Phase::Active => StreamState::Active,
            Phase::AbortRequested => StreamState::AbortRequested,
            Phase::Finished => StreamState::Finished,
            Phase::Aborted | Phase::InitFailed { .. } => StreamState::Aborted,
        }
    }
}

struct Inner<T> {
    phase: Phase,
    writer: Option<Arc<dyn Writer<T>>>,
    reader: Option<Arc<dyn Reader<T>>>,
    pending_observers: Vec<Arc<dyn Observer<T>>>,
    observers: ObserverSet<T>,
    remaining: u32,
    notify_write_possible: bool,
}

impl<T> Inner<T> {
    /// `InitFailed` 且尚未通知时标记为已通知，返回原始失败与待通知对象。
    fn take_init_failure(&mut self) -> Option<(Cause, Released<T>)> {
        let cause = match &mut self.phase {
            Phase::InitFailed { cause, notified } if !*notified => {
                *notified = true;
                cause.clone()
            }
            _ => return None,
        };
        Some((cause, self.release()))
    }

    /// 取走全部能力引用；仅在终止转换的临界区内调用。
    fn release(&mut self) -> Released<T> {
        Released {
            writer: self.writer.take(),
            reader: self.reader.take(),
            observers: mem::take(&mut self.observers),
        }
    }
}

/// 终止时从核心中取出的能力引用，在锁外完成通知。
struct Released<T> {
    writer: Option<Arc<dyn Writer<T>>>,
    reader: Option<Arc<dyn Reader<T>>>,
    observers: ObserverSet<T>,
}

pub(crate) struct Core<T> {
    label: String,
    credit_limit: u32,
    inner: Mutex<Inner<T>>,
}

impl<T: 'static> Core<T> {
    pub(crate) fn new(writer: Arc<dyn Writer<T>>, config: EntityStreamConfig) -> Self {
        Self {
            label: config.label,
            // 上限为 0 时唤醒生产者却无信用可写，按 1 处理。
            credit_limit: config.credit_limit.max(1),
            inner: Mutex::new(Inner {
                phase: Phase::Uninitialized,
                writer: Some(writer),
                reader: None,
                pending_observers: Vec::new(),
                observers: ObserverSet::default(),
                remaining: 0,
                notify_write_possible: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock()
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn state(&self) -> StreamState {
        self.lock().phase.public()
    }

    pub(crate) fn observer_count(&self) -> usize {
        let inner = self.lock();
        inner.pending_observers.len() + inner.observers.len()
    }

    pub(crate) fn add_observer(&self, observer: Arc<dyn Observer<T>>) -> Result<(), StreamError> {
        let mut inner = self.lock();
        if !matches!(inner.phase, Phase::Uninitialized) {
            return Err(ProtocolViolation::AlreadyInitialized.into());
        }
        inner.pending_observers.push(observer);
        Ok(())
    }

    /// 挂载读取端并依次初始化生产者与读取端。
    ///
    /// # 执行逻辑（How）
    /// 1. 锁内：校验仍处于 `Uninitialized`，冻结观察者序列，进入 `Active`；
    /// 2. 锁外：`writer.on_init(写句柄)`；失败则进入 `InitFailed` 并通知生产者中止；
    /// 3. 锁外：`reader.on_init(读句柄)`；失败按当前阶段分支处理（见 `reader_init_failed`）。
    pub(crate) fn attach(
        self: &Arc<Self>,
        reader: Arc<dyn Reader<T>>,
    ) -> Result<(), StreamError> {
        let writer = {
            let mut inner = self.lock();
            if !matches!(inner.phase, Phase::Uninitialized) {
                return Err(ProtocolViolation::AlreadyInitialized.into());
            }
            inner.phase = Phase::Active;
            inner.reader = Some(Arc::clone(&reader));
            let pending = mem::take(&mut inner.pending_observers);
            inner.observers = ObserverSet::from(pending);
            inner.writer.clone()
        };
        debug!(stream = %self.label, "entity stream activated");

        if let Some(writer) = writer
            && let Err(cause) = writer.on_init(WriteHandle::new(Arc::clone(self)))
        {
            self.log_delivery("writer.on_init", &cause);
            self.writer_init_failed(cause);
        }

        let control: Arc<dyn ReadControl> = Arc::clone(self) as Arc<dyn ReadControl>;
        if let Err(cause) = reader.on_init(ReadHandle::new(control)) {
            self.log_delivery("reader.on_init", &cause);
            self.reader_init_failed(cause);
        }
        Ok(())
    }

    fn writer_init_failed(&self, cause: Cause) {
        let writer = {
            let mut inner = self.lock();
            if !inner.phase.is_open() {
                // 生产者在 on_init 内已自行终止，终止通知已经发出。
                return;
            }
            inner.phase = Phase::InitFailed {
                cause: cause.clone(),
                notified: false,
            };
            inner.writer.take()
        };
        self.safe_abort_writer(writer.as_deref(), cause);
    }

    /// 读取端初始化失败。
    ///
    /// - `InitFailed` 且尚未通知：以读取端自身的失败通知观察者与读取端，仅一次；
    /// - `Active`：中止，通知生产者与观察者，不回调读取端；
    /// - `AbortRequested`：中止，额外通知读取端；
    /// - 其余阶段：并发路径已将流推进到终态，保持惰性，仅记录日志。
    fn reader_init_failed(&self, cause: Cause) {
        let mut inner = self.lock();
        if let Some((_, released)) = inner.take_init_failure() {
            drop(inner);
            self.notify_error(&released, &cause);
            return;
        }
        let notify_reader = match inner.phase {
            Phase::Active => false,
            Phase::AbortRequested => true,
            Phase::InitFailed { .. } => return,
            _ => {
                debug!(
                    stream = %self.label,
                    "reader on_init failure raced with termination; nothing to notify"
                );
                return;
            }
        };
        inner.phase = Phase::Aborted;
        let released = inner.release();
        drop(inner);
        self.do_cancel(released, cause, notify_reader);
    }

    pub(crate) fn write(&self, item: T) -> Result<(), StreamError> {
        let (reader, observers) = {
            let mut inner = self.lock();
            match inner.phase {
                Phase::Finished => return Err(ProtocolViolation::WriteAfterTerminal.into()),
                Phase::Active | Phase::AbortRequested => {}
                _ => return Ok(()),
            }
            inner.remaining = inner
                .remaining
                .checked_sub(1)
                .ok_or(ProtocolViolation::CreditExceeded)?;
            if matches!(inner.phase, Phase::AbortRequested) {
                inner.phase = Phase::Aborted;
                let released = inner.release();
                drop(inner);
                self.do_cancel(released, Cause::aborted(), false);
                return Ok(());
            }
            match inner.reader.clone() {
                Some(reader) => (reader, inner.observers.clone()),
                None => return Ok(()),
            }
        };

        observers.data(&self.label, &item);

        if let Err(cause) = reader.on_data_available(item) {
            self.log_delivery("reader.on_data_available", &cause);
            self.abort_if_open(cause, true);
            return Ok(());
        }

        // 投递期间到达的 cancel() 由本次调用收尾。
        let released = {
            let mut inner = self.lock();
            if !matches!(inner.phase, Phase::AbortRequested) {
                return Ok(());
            }
            inner.phase = Phase::Aborted;
            inner.release()
        };
        self.do_cancel(released, Cause::aborted(), false);
        Ok(())
    }

    pub(crate) fn done(&self) {
        let Some(released) = self.finish() else {
            return;
        };
        released.observers.done(&self.label);
        if let Some(reader) = released.reader.as_deref()
            && let Err(cause) = reader.on_done()
        {
            self.log_delivery("reader.on_done", &cause);
            self.safe_abort_writer(released.writer.as_deref(), cause);
        }
    }

    pub(crate) fn error(&self, cause: Cause) {
        let Some(released) = self.finish() else {
            return;
        };
        released.observers.error(&self.label, &cause);
        if let Some(reader) = released.reader.as_deref()
            && let Err(failure) = reader.on_error(cause)
        {
            self.log_delivery("reader.on_error", &failure);
            self.safe_abort_writer(released.writer.as_deref(), failure);
        }
    }

    /// `done`/`error` 共用的转换：`Active` 进入 `Finished` 并返回待通知对象；
    /// `AbortRequested` 在此完成中止并返回 `None`；其余阶段为幂等空操作。
    fn finish(&self) -> Option<Released<T>> {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Active => {
                inner.phase = Phase::Finished;
                debug!(stream = %self.label, "entity stream finished");
                Some(inner.release())
            }
            Phase::AbortRequested => {
                inner.phase = Phase::Aborted;
                let released = inner.release();
                drop(inner);
                self.do_cancel(released, Cause::aborted(), false);
                None
            }
            _ => None,
        }
    }

    pub(crate) fn remaining(&self) -> u32 {
        let mut inner = self.lock();
        match inner.phase {
            Phase::Active => {
                if inner.remaining == 0 {
                    inner.notify_write_possible = true;
                }
                inner.remaining
            }
            Phase::AbortRequested => {
                inner.phase = Phase::Aborted;
                let released = inner.release();
                drop(inner);
                self.do_cancel(released, Cause::aborted(), false);
                0
            }
            _ => 0,
        }
    }

    fn request_credit(&self, n: u32) -> Result<(), StreamError> {
        if n == 0 {
            return Err(ProtocolViolation::NonPositiveRequest { requested: n }.into());
        }

        let writer = {
            let mut inner = self.lock();
            if let Some((cause, released)) = inner.take_init_failure() {
                drop(inner);
                self.notify_error(&released, &cause);
                return Ok(());
            }
            if !matches!(inner.phase, Phase::Active) {
                return Ok(());
            }

            let total = u64::from(inner.remaining) + u64::from(n);
            inner.remaining = match u32::try_from(total) {
                Ok(total) if total <= self.credit_limit => total,
                _ => {
                    warn!(
                        stream = %self.label,
                        requested = n,
                        limit = self.credit_limit,
                        "credit overflow, saturating at limit"
                    );
                    self.credit_limit
                }
            };

            if !mem::replace(&mut inner.notify_write_possible, false) {
                return Ok(());
            }
            inner.writer.clone()
        };

        if let Some(writer) = writer
            && let Err(cause) = writer.on_write_possible()
        {
            self.log_delivery("writer.on_write_possible", &cause);
            // on_write_possible 执行期间不会有其它生产者侧调用在途。
            self.abort_if_open(cause, true);
        }
        Ok(())
    }

    fn cancel_stream(&self) {
        let mut inner = self.lock();
        if let Some((cause, released)) = inner.take_init_failure() {
            drop(inner);
            self.notify_error(&released, &cause);
            return;
        }
        match inner.phase {
            Phase::Active if inner.notify_write_possible => {
                // 生产者正在等待 on_write_possible，不可能同时处于句柄调用中，可立即中止。
                inner.phase = Phase::Aborted;
                let released = inner.release();
                drop(inner);
                debug!(stream = %self.label, "entity stream cancelled while writer idle");
                self.do_cancel(released, Cause::aborted(), false);
            }
            Phase::Active => {
                inner.phase = Phase::AbortRequested;
                debug!(stream = %self.label, "abort requested; deferring to writer");
            }
            _ => {}
        }
    }

    fn abort_if_open(&self, cause: Cause, notify_reader: bool) {
        let released = {
            let mut inner = self.lock();
            if !inner.phase.is_open() {
                return;
            }
            inner.phase = Phase::Aborted;
            inner.release()
        };
        self.do_cancel(released, cause, notify_reader);
    }

    fn do_cancel(&self, released: Released<T>, cause: Cause, notify_reader: bool) {
        debug!(stream = %self.label, aborted = cause.is_aborted(), "entity stream aborted");
        self.safe_abort_writer(released.writer.as_deref(), cause.clone());
        released.observers.error(&self.label, &cause);
        if notify_reader {
            self.safe_notify_error_to_reader(released.reader.as_deref(), cause);
        }
    }

    fn notify_error(&self, released: &Released<T>, cause: &Cause) {
        released.observers.error(&self.label, cause);
        self.safe_notify_error_to_reader(released.reader.as_deref(), cause.clone());
    }

    fn log_delivery(&self, stage: &'static str, cause: &Cause) {
        let failure = StreamError::Delivery {
            stage,
            cause: cause.clone(),
        };
        warn!(stream = %self.label, error = %failure, "callback failed");
    }

    fn safe_abort_writer(&self, writer: Option<&dyn Writer<T>>, cause: Cause) {
        if let Some(writer) = writer
            && let Err(failure) = writer.on_abort(cause)
        {
            self.log_delivery("writer.on_abort", &failure);
        }
    }

    fn safe_notify_error_to_reader(&self, reader: Option<&dyn Reader<T>>, cause: Cause) {
        if let Some(reader) = reader
            && let Err(failure) = reader.on_error(cause)
        {
            let failure = StreamError::Delivery {
                stage: "reader.on_error",
                cause: failure,
            };
            error!(stream = %self.label, error = %failure, "reader failed while being notified of an error");
        }
    }
}

impl<T: 'static> ReadControl for Core<T> {
    fn request(&self, n: u32) -> Result<(), StreamError> {
        self.request_credit(n)
    }

    fn cancel(&self) {
        self.cancel_stream();
    }

    fn label(&self) -> &str {
        &self.label
    }
}
