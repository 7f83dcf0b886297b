//! Shared fixtures for the integration tests: a scripted video source that
//! records its seeks and drops, and in-memory frame sinks.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use framesift::{
    FrameCapturer, FrameSiftError, FrameSink, JobController, JobProgress, JpegEncoder,
    MediaDecoder, PixelBuffer, ProgressCallback, SamplingOptions, SinkFuture, StaticIdentity,
    UploadDispatcher, UploadError, UploadRecord, UserIdentity, VideoInfo,
};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 360;

/// What a [`ScriptedSource`] did, readable after the source is gone.
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    seeks: Arc<Mutex<Vec<Duration>>>,
    drops: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn seeks(&self) -> Vec<Duration> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn seek_count(&self) -> usize {
        self.seeks.lock().unwrap().len()
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// In-memory video of a fixed duration with optional injected failures.
pub struct ScriptedSource {
    duration: Duration,
    pixels: PixelBuffer,
    probe: SourceProbe,
    fail_load: bool,
    fail_seek_at: Option<usize>,
    seek_delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(duration_seconds: f64) -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        let source = Self {
            duration: Duration::from_secs_f64(duration_seconds),
            pixels: PixelBuffer::black(WIDTH, HEIGHT),
            probe: probe.clone(),
            fail_load: false,
            fail_seek_at: None,
            seek_delay: None,
        };
        (source, probe)
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Fail the seek with this 0-based index.
    pub fn failing_seek_at(mut self, index: usize) -> Self {
        self.fail_seek_at = Some(index);
        self
    }

    /// Block every seek for `delay`.
    pub fn slow_seeks(mut self, delay: Duration) -> Self {
        self.seek_delay = Some(delay);
        self
    }
}

impl MediaDecoder for ScriptedSource {
    fn load(&mut self) -> Result<VideoInfo, FrameSiftError> {
        if self.fail_load {
            return Err(FrameSiftError::Decode {
                path: PathBuf::from("scripted.mp4"),
                reason: "not a playable video".to_string(),
            });
        }
        Ok(VideoInfo {
            duration: self.duration,
            width: WIDTH,
            height: HEIGHT,
            frames_per_second: 30.0,
            codec: "scripted".to_string(),
        })
    }

    fn seek(&mut self, timestamp: Duration) -> Result<(), FrameSiftError> {
        let index = {
            let mut seeks = self.probe.seeks.lock().unwrap();
            seeks.push(timestamp);
            seeks.len() - 1
        };
        if let Some(delay) = self.seek_delay {
            std::thread::sleep(delay);
        }
        if self.fail_seek_at == Some(index) || timestamp > self.duration {
            return Err(FrameSiftError::Seek {
                timestamp,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl FrameCapturer for ScriptedSource {
    fn capture(&mut self) -> Result<&PixelBuffer, FrameSiftError> {
        Ok(&self.pixels)
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.probe.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps every delivered record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<UploadRecord>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<UploadRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn frame_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.records().iter().map(|record| record.frame_number).collect();
        numbers.sort_unstable();
        numbers
    }
}

impl FrameSink for RecordingSink {
    fn deliver(&self, record: UploadRecord) -> SinkFuture<'_> {
        Box::pin(async move {
            self.records.lock().unwrap().push(record);
            Ok::<(), UploadError>(())
        })
    }
}

/// Rejects every delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl FrameSink for FailingSink {
    fn deliver(&self, _record: UploadRecord) -> SinkFuture<'_> {
        Box::pin(async {
            Err::<(), _>(UploadError::Io(std::io::Error::other("endpoint unreachable")))
        })
    }
}

/// Records every published snapshot and optionally runs a hook on each.
#[derive(Default)]
pub struct RecordingProgress {
    snapshots: Mutex<Vec<JobProgress>>,
    hook: Option<Box<dyn Fn(&JobProgress) + Send + Sync>>,
}

impl RecordingProgress {
    pub fn with_hook(hook: impl Fn(&JobProgress) + Send + Sync + 'static) -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
            hook: Some(Box::new(hook)),
        }
    }

    pub fn snapshots(&self) -> Vec<JobProgress> {
        self.snapshots.lock().unwrap().clone()
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, progress: &JobProgress) {
        self.snapshots.lock().unwrap().push(*progress);
        if let Some(hook) = &self.hook {
            hook(progress);
        }
    }
}

pub fn test_user() -> UserIdentity {
    UserIdentity::new("7b0e4c1d-user").with_email("ops@example.com")
}

/// Default cadence without the inter-sample pause.
pub fn fast_options() -> SamplingOptions {
    SamplingOptions::new().with_yield_delay(Duration::ZERO)
}

pub fn pipeline(sink: Arc<dyn FrameSink>) -> (UploadDispatcher, JobController) {
    let dispatcher = UploadDispatcher::spawn(sink, Arc::new(JpegEncoder));
    let controller =
        JobController::new(Arc::new(StaticIdentity::new(test_user())), dispatcher.handle());
    (dispatcher, controller)
}
