//! 实体流：持有一个生产者、一组冻结的观察者与一个消费者，并通过两个窄能力句柄居间协调。
//!
//! # 设计目标（Why）
//! - 让传输层与编解码层在互不感知的前提下交换数据项，由消费者以信用控制节奏（背压），
//!   任一侧都可以独立取消或失败；
//! - 以 “一条流一把锁” 作为并发控制单元，锁从不跨越用户回调。
//!
//! # 使用方式（How）
//! ```rust
//! use std::sync::Arc;
//! use spark_entity_stream::{CollectingReader, EntityStream, SingletonWriter, StreamState};
//!
//! let stream = EntityStream::<&str>::new(Arc::new(SingletonWriter::new("hello")));
//! let (reader, result) = CollectingReader::<&str>::new();
//! stream.set_reader(Arc::new(reader)).unwrap();
//! let items = futures::executor::block_on(result).unwrap().unwrap();
//! assert_eq!(items, vec!["hello"]);
//! assert_eq!(stream.state(), StreamState::Finished);
//! ```

mod fanout;
mod machine;

use std::fmt;
use std::sync::Arc;

use crate::config::EntityStreamConfig;
use crate::contract::{Observer, Reader, Writer};
use crate::error::StreamError;

pub(crate) use self::machine::Core;

/// 对外可见的流状态。
///
/// - `Uninitialized` 为初始态；`Finished` 与 `Aborted` 为终态；
/// - `AbortRequested` 只能由 `Active` 到达，并总是收敛到 `Aborted`；
/// - 生产者初始化失败的流报告为 `Aborted`。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StreamState {
    Uninitialized,
    Active,
    AbortRequested,
    Finished,
    Aborted,
}

impl StreamState {
    /// 是否已处于终态。
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Finished | StreamState::Aborted)
    }
}

/// 一条实体流。
///
/// # 教案式说明
/// - **意图 (Why)**：作为生产者与消费者之间唯一的中介，负责把 `WriteHandle`/`ReadHandle`
///   交给两端，并执行终止与取消状态机。
/// - **契约 (What)**：
///   - `add_observer` 只能在 `set_reader` 之前调用，插入顺序即投递顺序；
///   - `set_reader` 只能成功一次，之后生产者的 `on_init` 与读取端的 `on_init` 依次在调用线程上执行；
///   - 克隆得到的是同一条流的另一个引用，不会复制状态。
/// - **风险提示 (Trade-offs)**：终止前核心持有生产者/读取端的强引用；若流永远不终止，
///   这些对象也不会被释放。
pub struct EntityStream<T> {
    core: Arc<Core<T>>,
}

impl<T> Clone for EntityStream<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: 'static> EntityStream<T> {
    /// 以默认配置创建实体流。
    pub fn new(writer: Arc<dyn Writer<T>>) -> Self {
        Self::with_config(writer, EntityStreamConfig::default())
    }

    /// 以指定配置创建实体流；调用方负责事先 [`EntityStreamConfig::validate`]，
    /// 未校验的零信用上限按 1 处理。
    pub fn with_config(writer: Arc<dyn Writer<T>>, config: EntityStreamConfig) -> Self {
        Self {
            core: Arc::new(Core::new(writer, config)),
        }
    }

    /// 追加观察者；读取端挂载后调用返回 [`ProtocolViolation::AlreadyInitialized`](crate::ProtocolViolation::AlreadyInitialized)。
    pub fn add_observer(&self, observer: Arc<dyn Observer<T>>) -> Result<(), StreamError> {
        self.core.add_observer(observer)
    }

    /// 挂载读取端，激活流。
    pub fn set_reader(&self, reader: Arc<dyn Reader<T>>) -> Result<(), StreamError> {
        self.core.attach(reader)
    }

    /// 当前状态快照。
    pub fn state(&self) -> StreamState {
        self.core.state()
    }

    /// 日志标签。
    pub fn label(&self) -> &str {
        self.core.label()
    }
}

impl<T: 'static> fmt::Debug for EntityStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStream")
            .field("label", &self.core.label())
            .field("state", &self.core.state())
            .field("observers", &self.core.observer_count())
            .finish()
    }
}
