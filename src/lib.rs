//! # framesift
//!
//! Sample still frames from video files at a fixed cadence and stream a
//! subset of them to a remote inference endpoint.
//!
//! A job walks the video timeline in steps of `interval / 30` seconds,
//! seeking and capturing one frame per step. Every captured frame counts
//! toward progress; every Nth one is JPEG-encoded and posted as
//! `multipart/form-data` without holding up the sampling loop. Upload
//! failures are logged and dropped, never retried, and never affect the job.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use framesift::{
//!     InferenceClient, JobController, JobState, JpegEncoder, SamplingOptions,
//!     StaticIdentity, UploadDispatcher, UploadOptions, UserIdentity,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), framesift::FrameSiftError> {
//!     let upload = UploadOptions::new("http://localhost:8000/upload")?;
//!     let dispatcher =
//!         UploadDispatcher::spawn(Arc::new(InferenceClient::new(upload)?), Arc::new(JpegEncoder));
//!
//!     let user = UserIdentity::new("0b7c1e9a").with_email("ops@example.com");
//!     let controller = JobController::new(Arc::new(StaticIdentity::new(user)), dispatcher.handle());
//!
//!     let handle = controller.start_file("input.mp4", SamplingOptions::new())?;
//!     let report = handle.wait().await;
//!     assert_eq!(report.state, JobState::Completed);
//!
//!     drop(controller);
//!     dispatcher.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Components
//!
//! - [`MediaDecoder`] / [`FrameCapturer`]: load, seek and capture, with an
//!   FFmpeg implementation in [`FfmpegDecoder`]
//! - [`FrameEncoder`]: lossy encoding, [`JpegEncoder`] by default
//! - [`UploadDispatcher`]: fire-and-forget delivery to a [`FrameSink`] such as
//!   [`InferenceClient`] or [`DirectorySink`]
//! - [`JobController`]: the job state machine, progress stream and
//!   cancellation
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod configuration;
pub mod controller;
pub mod decoder;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod identity;
pub mod inference;
pub mod job;
pub mod progress;
pub mod scheduler;

pub use configuration::{SamplingOptions, UploadOptions};
pub use controller::{JobController, JobHandle, JobReport};
pub use decoder::{FfmpegDecoder, FrameCapturer, MediaDecoder, VideoInfo, VideoSource};
pub use dispatcher::{
    DirectorySink, DispatchHandle, DispatchStats, FrameSink, PendingUpload, SinkFuture,
    UploadDispatcher, UploadRecord,
};
pub use encoder::{FrameEncoder, JpegEncoder};
pub use error::{FrameSiftError, UploadError};
pub use ffmpeg::{FfmpegLogLevel, ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame::{PixelBuffer, SampledFrame};
pub use identity::{IdentityProvider, StaticIdentity, UserIdentity};
pub use inference::{DetectionResponse, InferenceClient};
pub use job::JobState;
pub use progress::{CancellationToken, JobProgress, ProgressCallback};
