//! 取消语义：生产者空闲时立即中止，写入在途时挂起为 `AbortRequested` 并由生产者收尾。

mod support;

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;
use spark_entity_stream::{Cause, EntityStream, ReadHandle, Reader, StreamState};
use support::{RecordingObserver, RecordingReader, RecordingWriter};

type Item = u32;

#[test]
fn cancel_while_writer_idle_aborts_immediately() {
    let writer = RecordingWriter::<Item>::new();
    let observer = RecordingObserver::<Item>::new();
    let stream = EntityStream::<Item>::new(writer.clone());
    stream.add_observer(observer.clone()).unwrap();
    let reader = Arc::new(RecordingReader::<Item>::new());
    stream.set_reader(reader.clone()).unwrap();

    // 尚未授信：生产者仍在等待 on_write_possible。
    reader.handle().cancel();

    assert_eq!(stream.state(), StreamState::Aborted);
    let aborts = writer.aborts();
    assert_eq!(aborts.len(), 1);
    assert!(aborts[0].is_aborted(), "消费端取消应合成 reader aborted 原因");
    assert!(observer.errors()[0].is_aborted());
    assert_eq!(reader.terminal_count(), 0, "取消方自身不再收到终止通知");
    assert_eq!(writer.handle().remaining(), 0);
}

#[test]
fn cancel_with_credit_outstanding_is_completed_by_the_next_writer_call() {
    let writer = RecordingWriter::<Item>::new();
    let stream = EntityStream::<Item>::new(writer.clone());
    let reader = Arc::new(RecordingReader::<Item>::new().requesting(3));
    stream.set_reader(reader.clone()).unwrap();

    reader.handle().cancel();
    assert_eq!(stream.state(), StreamState::AbortRequested);
    assert!(writer.aborts().is_empty(), "生产者可能在途，不得立即中止");

    assert_eq!(writer.handle().remaining(), 0);
    assert_eq!(stream.state(), StreamState::Aborted);
    assert_eq!(writer.aborts().len(), 1);

    writer.handle().done();
    reader.handle().cancel();
    assert_eq!(writer.aborts().len(), 1, "on_abort 至多一次");
    assert_eq!(reader.terminal_count(), 0);
}

#[test]
fn done_racing_with_cancel_becomes_abort() {
    let writer = RecordingWriter::<Item>::new();
    let stream = EntityStream::<Item>::new(writer.clone());
    let reader = Arc::new(RecordingReader::<Item>::new().requesting(1));
    stream.set_reader(reader.clone()).unwrap();

    reader.handle().cancel();
    writer.handle().done();

    assert_eq!(stream.state(), StreamState::Aborted);
    assert_eq!(writer.aborts().len(), 1);
    assert_eq!(reader.done_count(), 0, "取消已生效，done 不再投递");
}

/// 在 `on_data_available` 中停住投递线程，直到测试放行。
struct GatedReader {
    handle: Mutex<Option<ReadHandle>>,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
    received: Mutex<Vec<Item>>,
}

impl Reader<Item> for GatedReader {
    fn on_init(&self, handle: ReadHandle) -> Result<(), Cause> {
        *self.handle.lock() = Some(handle.clone());
        handle.request(5)?;
        Ok(())
    }

    fn on_data_available(&self, item: Item) -> Result<(), Cause> {
        self.received.lock().push(item);
        self.entered
            .lock()
            .send(())
            .map_err(|_| Cause::msg("test harness gone"))?;
        self.release
            .lock()
            .recv()
            .map_err(|_| Cause::msg("test harness gone"))?;
        Ok(())
    }

    fn on_done(&self) -> Result<(), Cause> {
        Ok(())
    }

    fn on_error(&self, _cause: Cause) -> Result<(), Cause> {
        Ok(())
    }
}

#[test]
fn cancel_during_in_flight_write_is_completed_when_write_returns() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let reader = Arc::new(GatedReader {
        handle: Mutex::new(None),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
        received: Mutex::new(Vec::new()),
    });
    let writer = RecordingWriter::<Item>::new();
    let stream = EntityStream::<Item>::new(writer.clone());
    stream.set_reader(reader.clone()).unwrap();

    let handle = writer.handle();
    let producer = thread::spawn(move || handle.write(7));

    entered_rx.recv().expect("投递线程应进入读取端回调");
    let read_handle = reader.handle.lock().clone().expect("读取端已初始化");
    read_handle.cancel();
    assert_eq!(stream.state(), StreamState::AbortRequested);
    assert!(writer.aborts().is_empty(), "在途写入返回前不得中止");

    release_tx.send(()).unwrap();
    producer
        .join()
        .expect("生产者线程不应 panic")
        .expect("在途写入本身应成功");

    assert_eq!(stream.state(), StreamState::Aborted);
    let aborts = writer.aborts();
    assert_eq!(aborts.len(), 1, "生产者恰好收到一次 on_abort");
    assert!(aborts[0].is_aborted());
    assert_eq!(*reader.received.lock(), vec![7]);
}
