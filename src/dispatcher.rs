//! Fire-and-forget frame uploads.
//!
//! The sampling loop hands upload-eligible frames to a [`DispatchHandle`].
//! Handing off is a non-blocking channel send; a background
//! [`UploadDispatcher`] task encodes each frame on the blocking pool and
//! delivers it to a [`FrameSink`] in its own detached task. Several frames of
//! one job may be in flight at once and complete in any order.
//!
//! Failures stay here: an encode failure skips that frame, a sink failure is
//! logged, and neither is retried or reported to the job.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, JoinSet};

use crate::{
    encoder::FrameEncoder, error::UploadError, frame::PixelBuffer, identity::UserIdentity,
};

/// Boxed future returned by [`FrameSink::deliver`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>>;

/// One encoded frame ready to leave the process.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    /// 1-based count of samples processed when the frame was dispatched.
    pub frame_number: u64,
    /// Position of the frame on the video timeline.
    pub timestamp: Duration,
    /// Encoded JPEG bytes.
    pub image_payload: Vec<u8>,
    /// User the frame is attributed to.
    pub user: UserIdentity,
}

impl UploadRecord {
    /// File name used for the image part, `frame_{n}.jpg`.
    pub fn file_name(&self) -> String {
        format!("frame_{}.jpg", self.frame_number)
    }
}

/// A frame captured by the sampling loop, not yet encoded.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    /// 1-based count of samples processed at dispatch time.
    pub frame_number: u64,
    /// Position of the frame on the video timeline.
    pub timestamp: Duration,
    /// Owned copy of the captured pixels.
    pub pixels: PixelBuffer,
    /// Encoding quality in `(0.0, 1.0]`.
    pub quality: f32,
    /// User the frame is attributed to.
    pub user: UserIdentity,
}

/// Destination for encoded frames. One call is one send attempt.
pub trait FrameSink: Send + Sync {
    /// Deliver `record`.
    fn deliver(&self, record: UploadRecord) -> SinkFuture<'_>;
}

/// Counters describing what happened to dispatched frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Frames accepted from the sampling loop.
    pub dispatched: u64,
    /// Frames the sink accepted.
    pub succeeded: u64,
    /// Frames the sink rejected or could not be reached for.
    pub failed: u64,
    /// Frames dropped before sending because encoding failed.
    pub skipped: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl DispatchCounters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.dispatched.load(Ordering::Acquire),
            succeeded: self.succeeded.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
        }
    }
}

/// Cloneable, non-blocking entry point into an [`UploadDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    sender: UnboundedSender<PendingUpload>,
}

impl DispatchHandle {
    /// Queue `upload` and return immediately.
    ///
    /// Returns `false` (and drops the frame) if the dispatcher has shut down.
    pub fn dispatch(&self, upload: PendingUpload) -> bool {
        let frame_number = upload.frame_number;
        match self.sender.send(upload) {
            Ok(()) => {
                log::debug!("Queued frame {frame_number} for upload");
                true
            }
            Err(_) => {
                log::warn!("Upload dispatcher is closed; dropping frame {frame_number}");
                false
            }
        }
    }
}

/// Background task that turns [`PendingUpload`]s into sink deliveries.
pub struct UploadDispatcher {
    sender: UnboundedSender<PendingUpload>,
    counters: Arc<DispatchCounters>,
    worker: JoinHandle<()>,
}

impl UploadDispatcher {
    /// Spawn the dispatcher on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn FrameSink>, encoder: Arc<dyn FrameEncoder>) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        let counters = Arc::new(DispatchCounters::default());
        let worker = tokio::spawn(run_dispatcher(receiver, sink, encoder, counters.clone()));

        Self {
            sender,
            counters,
            worker,
        }
    }

    /// A handle the sampling loop can dispatch through.
    pub fn handle(&self) -> DispatchHandle {
        DispatchHandle {
            sender: self.sender.clone(),
        }
    }

    /// Live counters. In-flight frames are counted as dispatched only.
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Stop accepting frames and wait for every in-flight delivery.
    ///
    /// Resolves once all [`DispatchHandle`]s (including those held by
    /// controllers) have been dropped and the queue is drained.
    pub async fn shutdown(self) -> DispatchStats {
        let Self {
            sender,
            counters,
            worker,
        } = self;
        drop(sender);
        if let Err(error) = worker.await {
            log::error!("Upload dispatcher task failed: {error}");
        }
        counters.snapshot()
    }
}

async fn run_dispatcher(
    mut receiver: UnboundedReceiver<PendingUpload>,
    sink: Arc<dyn FrameSink>,
    encoder: Arc<dyn FrameEncoder>,
    counters: Arc<DispatchCounters>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            upload = receiver.recv() => {
                let Some(upload) = upload else { break };
                counters.dispatched.fetch_add(1, Ordering::AcqRel);
                in_flight.spawn(deliver_one(
                    upload,
                    sink.clone(),
                    encoder.clone(),
                    counters.clone(),
                ));
            }
            Some(finished) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(error) = finished {
                    counters.failed.fetch_add(1, Ordering::AcqRel);
                    log::error!("Upload task aborted: {error}");
                }
            }
        }
    }

    while let Some(finished) = in_flight.join_next().await {
        if let Err(error) = finished {
            counters.failed.fetch_add(1, Ordering::AcqRel);
            log::error!("Upload task aborted: {error}");
        }
    }
    log::debug!("Upload dispatcher drained");
}

async fn deliver_one(
    upload: PendingUpload,
    sink: Arc<dyn FrameSink>,
    encoder: Arc<dyn FrameEncoder>,
    counters: Arc<DispatchCounters>,
) {
    let PendingUpload {
        frame_number,
        timestamp,
        pixels,
        quality,
        user,
    } = upload;

    let encoded =
        tokio::task::spawn_blocking(move || encoder.encode(&pixels, quality)).await;
    let image_payload = match encoded {
        Ok(Ok(payload)) => payload,
        Ok(Err(error)) => {
            counters.skipped.fetch_add(1, Ordering::AcqRel);
            log::error!("Skipping upload of frame {frame_number}: {error}");
            return;
        }
        Err(error) => {
            counters.skipped.fetch_add(1, Ordering::AcqRel);
            log::error!("Skipping upload of frame {frame_number}: encoder task failed: {error}");
            return;
        }
    };

    let record = UploadRecord {
        frame_number,
        timestamp,
        image_payload,
        user,
    };

    match sink.deliver(record).await {
        Ok(()) => {
            counters.succeeded.fetch_add(1, Ordering::AcqRel);
        }
        Err(error) => {
            counters.failed.fetch_add(1, Ordering::AcqRel);
            log::warn!("Upload of frame {frame_number} failed: {error}");
        }
    }
}

/// Writes each frame to `frame_{n}.jpg` inside a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    /// Create the sink, creating `directory` if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self, std::io::Error> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }
}

impl FrameSink for DirectorySink {
    fn deliver(&self, record: UploadRecord) -> SinkFuture<'_> {
        Box::pin(async move {
            let path = self.directory.join(record.file_name());
            tokio::fs::write(&path, &record.image_payload).await?;
            log::info!(
                "Saved frame {} ({:.3}s) to {}",
                record.frame_number,
                record.timestamp.as_secs_f64(),
                path.display()
            );
            Ok::<(), UploadError>(())
        })
    }
}
