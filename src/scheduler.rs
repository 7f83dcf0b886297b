//! The sampling loop.
//!
//! Sample `k` sits at `k * interval / nominal_fps` seconds. For each `k`
//! whose timestamp is still inside the video, the scheduler checks for
//! cancellation, seeks, captures, counts the sample, hands every Nth sample
//! to the upload dispatcher, and yields briefly before the next one.
//!
//! Seeking and capturing are blocking calls; they run on Tokio's blocking
//! pool while the source is moved in and back out, so the scheduler remains
//! the decoder's only owner.

use std::time::Duration;

use crate::{
    configuration::SamplingOptions,
    decoder::{FrameCapturer, MediaDecoder, VideoSource},
    dispatcher::{DispatchHandle, PendingUpload},
    error::FrameSiftError,
    frame::{PixelBuffer, SampledFrame},
    identity::UserIdentity,
    job::JobContext,
};

/// Timestamp, in seconds, of sample `index`.
pub fn sample_timestamp_seconds(index: u64, interval_frames: u32, nominal_fps: f64) -> f64 {
    index as f64 * interval_frames as f64 / nominal_fps
}

/// `floor(duration * fps / interval)`, the progress denominator.
///
/// Zero, negative and non-finite durations estimate zero samples.
pub fn estimated_sample_count(duration_seconds: f64, interval_frames: u32, nominal_fps: f64) -> u64 {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 || interval_frames == 0 {
        return 0;
    }
    (duration_seconds * nominal_fps / interval_frames as f64).floor() as u64
}

/// `min(100, floor(current / duration * 100))`.
pub fn progress_percent(current_seconds: f64, duration_seconds: f64) -> u8 {
    if duration_seconds.is_nan() || duration_seconds <= 0.0 {
        return 100;
    }
    let percent = (current_seconds / duration_seconds * 100.0).floor();
    percent.clamp(0.0, 100.0) as u8
}

/// Whether the sample that brings the processed count to `processed` is
/// transmitted upstream.
pub fn is_upload_eligible(processed: u64, upload_every: u64) -> bool {
    upload_every > 0 && processed > 0 && processed % upload_every == 0
}

/// How a sampling run ended.
#[derive(Debug)]
pub(crate) enum SchedulerOutcome {
    Completed,
    Cancelled,
    Failed(FrameSiftError),
}

/// Result of running a blocking step against the source.
pub(crate) enum StepFailure {
    /// The step outlived the timeout; the source stays with the stalled thread.
    TimedOut(Duration),
    /// The blocking task panicked; the source was dropped while unwinding.
    Panicked(String),
}

/// Run `step` against `source` on the blocking pool.
pub(crate) async fn run_blocking<T, F>(
    mut source: Box<dyn VideoSource>,
    timeout: Option<Duration>,
    step: F,
) -> Result<(Box<dyn VideoSource>, T), StepFailure>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn VideoSource) -> T + Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        let output = step(source.as_mut());
        (source, output)
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => return Err(StepFailure::TimedOut(limit)),
        },
        None => task.await,
    };

    joined.map_err(|error| StepFailure::Panicked(error.to_string()))
}

pub(crate) struct SampleScheduler<'a> {
    options: &'a SamplingOptions,
    dispatch: &'a DispatchHandle,
    user: &'a UserIdentity,
}

impl<'a> SampleScheduler<'a> {
    pub(crate) fn new(
        options: &'a SamplingOptions,
        dispatch: &'a DispatchHandle,
        user: &'a UserIdentity,
    ) -> Self {
        Self {
            options,
            dispatch,
            user,
        }
    }

    fn timestamp_of(&self, index: u64) -> f64 {
        sample_timestamp_seconds(
            index,
            self.options.sample_interval_frames,
            self.options.nominal_frames_per_second,
        )
    }

    /// Drive `source` over the whole timeline. The source is dropped before
    /// this returns, whatever the outcome.
    pub(crate) async fn run(
        &self,
        source: Box<dyn VideoSource>,
        context: &mut JobContext,
    ) -> SchedulerOutcome {
        let duration_seconds = context.duration_seconds();
        let upload_every = self.options.upload_every;
        let mut source = Some(source);
        let mut index = 0_u64;

        let outcome = loop {
            let timestamp_seconds = self.timestamp_of(index);
            if timestamp_seconds >= duration_seconds {
                log::debug!("Timeline exhausted after {index} samples");
                break SchedulerOutcome::Completed;
            }

            if context.cancel_requested() {
                log::info!("Cancellation observed before sample {index}");
                break SchedulerOutcome::Cancelled;
            }

            let Some(current) = source.take() else {
                break SchedulerOutcome::Failed(FrameSiftError::WorkerPanicked(
                    "video source lost".to_string(),
                ));
            };

            let timestamp = Duration::from_secs_f64(timestamp_seconds);
            let step = run_blocking(current, self.options.seek_timeout, move |decoder| {
                capture_sample(decoder, index, timestamp, upload_every)
            })
            .await;

            let (processed, copied) = match step {
                Ok((returned, Ok(captured))) => {
                    source = Some(returned);
                    captured
                }
                Ok((returned, Err(error))) => {
                    source = Some(returned);
                    log::error!("Sample {index} at {timestamp_seconds:.3}s failed: {error}");
                    break SchedulerOutcome::Failed(error);
                }
                Err(StepFailure::TimedOut(limit)) => {
                    log::error!("Seek to {timestamp_seconds:.3}s timed out after {limit:?}");
                    break SchedulerOutcome::Failed(FrameSiftError::SeekTimeout {
                        timestamp,
                        timeout: limit,
                    });
                }
                Err(StepFailure::Panicked(reason)) => {
                    break SchedulerOutcome::Failed(FrameSiftError::WorkerPanicked(reason));
                }
            };

            if let Some(pixels) = copied {
                let queued = self.dispatch.dispatch(PendingUpload {
                    frame_number: processed,
                    timestamp,
                    pixels,
                    quality: self.options.quality,
                    user: self.user.clone(),
                });
                if queued {
                    context.record_dispatch();
                }
            }
            context.record_sample(
                timestamp,
                progress_percent(timestamp_seconds, duration_seconds),
            );
            log::trace!("Sample {index} at {timestamp_seconds:.3}s captured");

            index += 1;

            if self.options.yield_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.options.yield_delay).await;
            }
        };

        drop(source);
        outcome
    }
}

/// Seek to `timestamp` and capture. Returns the processed count after this
/// sample, plus a copy of the pixels when the sample is due for upload.
fn capture_sample(
    decoder: &mut dyn VideoSource,
    index: u64,
    timestamp: Duration,
    upload_every: u64,
) -> Result<(u64, Option<PixelBuffer>), FrameSiftError> {
    decoder.seek(timestamp)?;
    let pixels = decoder.capture()?;
    let frame = SampledFrame {
        index,
        timestamp,
        pixels,
    };

    if frame.pixels.is_empty() {
        return Err(FrameSiftError::Capture(format!(
            "sample {} produced an empty buffer",
            frame.index
        )));
    }

    let processed = frame.processed_count();
    let copy = is_upload_eligible(processed, upload_every).then(|| frame.pixels.clone());
    Ok((processed, copy))
}
