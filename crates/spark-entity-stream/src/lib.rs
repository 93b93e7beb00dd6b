#![deny(unsafe_code)]

//! `spark-entity-stream`：基于信用额度的响应式实体流协议核心。
//!
//! # 教案式说明
//! - **意图（Why）**：传输层产生的数据（例如收到的字节分片）与编解码层消费的数据之间需要一条
//!   带背压、可双向取消的通道；本 Crate 只负责这条通道的协议状态机，不做 I/O，也不解析数据项。
//! - **逻辑（How）**：
//!   - 生产者实现 [`Writer`]，通过 [`WriteHandle`] 在有信用时写出数据项；
//!   - 消费者实现 [`Reader`]，通过 [`ReadHandle`] 授予信用或取消；
//!   - 任意数量的 [`Observer`] 在读取端之前旁听数据与终止事件；
//!   - [`Connector`] 同时作为上游的读取端与下游的生产者，把多条流串成流水线。
//! - **契约（What）**：
//!   - 写入次数永远不超过已授予的信用；
//!   - 读取端恰好收到一次 `on_done` 或 `on_error`，生产者至多收到一次 `on_abort`；
//!   - 协议违例以 [`StreamError::Violation`] 同步返回给违例方，回调失败被转换为终止事件。
//! - **风险与权衡（Trade-offs）**：所有方法同步执行到底，不阻塞、不挂起；
//!   调用方需保证同一方向上的句柄调用串行化。

pub mod config;
pub mod connector;
pub mod contract;
pub mod error;
pub mod handle;
pub mod readers;
pub mod stream;
pub mod streams;
mod sync;
pub mod writers;

pub use config::EntityStreamConfig;
pub use connector::Connector;
pub use contract::{Observer, Reader, Writer};
pub use error::{Cause, ConfigError, ProtocolViolation, StreamError};
pub use handle::{ReadHandle, WriteHandle};
pub use readers::{CancelingReader, Collected, CollectingReader, DrainReader};
pub use stream::{EntityStream, StreamState};
pub use streams::{empty_stream, new_entity_stream, singleton_stream};
pub use writers::{ByteChunks, EmptyWriter, IterWriter, SingletonWriter, chunked_bytes};
