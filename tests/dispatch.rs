//! Upload dispatcher integration tests.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use framesift::{
    DirectorySink, FrameSink, JpegEncoder, PendingUpload, PixelBuffer, SinkFuture,
    UploadDispatcher, UploadError, UploadRecord,
};

use common::{RecordingSink, test_user};

fn pending(frame_number: u64, pixels: PixelBuffer) -> PendingUpload {
    PendingUpload {
        frame_number,
        timestamp: Duration::from_millis(frame_number * 100),
        pixels,
        quality: 0.8,
        user: test_user(),
    }
}

/// Holds earlier frames longer so later ones finish first.
#[derive(Default, Clone)]
struct StaggeredSink {
    completed: Arc<Mutex<Vec<u64>>>,
}

impl FrameSink for StaggeredSink {
    fn deliver(&self, record: UploadRecord) -> SinkFuture<'_> {
        Box::pin(async move {
            let delay = 120_u64.saturating_sub(record.frame_number * 40);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completed.lock().unwrap().push(record.frame_number);
            Ok::<(), UploadError>(())
        })
    }
}

#[tokio::test]
async fn shutdown_drains_in_flight_uploads() {
    let sink = StaggeredSink::default();
    let dispatcher = UploadDispatcher::spawn(Arc::new(sink.clone()), Arc::new(JpegEncoder));
    let handle = dispatcher.handle();

    for frame_number in 1..=3 {
        assert!(handle.dispatch(pending(frame_number, PixelBuffer::black(32, 32))));
    }
    drop(handle);

    let stats = dispatcher.shutdown().await;
    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 0);

    // Completion order follows the sink, not the dispatch order.
    assert_eq!(*sink.completed.lock().unwrap(), vec![3, 2, 1]);
}

#[tokio::test]
async fn encode_failure_skips_only_that_frame() {
    let sink = RecordingSink::default();
    let dispatcher = UploadDispatcher::spawn(Arc::new(sink.clone()), Arc::new(JpegEncoder));
    let handle = dispatcher.handle();

    let empty = PixelBuffer::from_raw(0, 0, Vec::new()).unwrap();
    handle.dispatch(pending(1, empty));
    handle.dispatch(pending(2, PixelBuffer::black(16, 16)));
    drop(handle);

    let stats = dispatcher.shutdown().await;
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(sink.frame_numbers(), vec![2]);
}

#[tokio::test]
async fn directory_sink_writes_jpeg_files() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let output = directory.path().join("frames");
    let sink = DirectorySink::new(&output).expect("Failed to create sink directory");

    let dispatcher = UploadDispatcher::spawn(Arc::new(sink), Arc::new(JpegEncoder));
    let handle = dispatcher.handle();
    handle.dispatch(pending(20, PixelBuffer::black(64, 48)));
    drop(handle);

    let stats = dispatcher.shutdown().await;
    assert_eq!(stats.succeeded, 1);

    let written = std::fs::read(output.join("frame_20.jpg")).expect("frame was not written");
    let decoded = image::load_from_memory(&written).expect("written frame is not an image");
    assert_eq!(decoded.width(), 64);
    assert_eq!(decoded.height(), 48);
}
