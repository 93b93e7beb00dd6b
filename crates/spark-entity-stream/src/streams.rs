//! 创建实体流的便捷入口。

use std::sync::Arc;

use crate::contract::Writer;
use crate::stream::EntityStream;
use crate::writers::{EmptyWriter, SingletonWriter};

/// 以给定生产者创建实体流，等价于 [`EntityStream::new`]。
pub fn new_entity_stream<T: 'static>(writer: Arc<dyn Writer<T>>) -> EntityStream<T> {
    EntityStream::new(writer)
}

/// 不含任何数据项的实体流：读取端首次授信后即收到 `on_done`。
pub fn empty_stream<T: 'static>() -> EntityStream<T> {
    EntityStream::new(Arc::new(EmptyWriter::new()))
}

/// 只含一个数据项的实体流。
pub fn singleton_stream<T: Send + 'static>(item: T) -> EntityStream<T> {
    EntityStream::new(Arc::new(SingletonWriter::new(item)))
}
