//! Error types for the `framesift` crate.
//!
//! [`FrameSiftError`] is returned by every fallible job-level operation:
//! starting a job, loading media metadata, seeking, capturing and encoding.
//! [`UploadError`] describes a single failed frame upload. It is produced and
//! logged inside the dispatcher and is never converted into a job-level error.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

/// The unified error type for job-level `framesift` operations.
///
/// Variants carry enough context (paths, timestamps, upstream messages) that
/// the terminal job notification can be shown to a user as-is.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameSiftError {
    /// No user identity could be resolved, so the job was never started.
    #[error("A signed-in user is required before a video can be analysed")]
    AuthRequired,

    /// A job is already sampling on this controller.
    #[error("A sampling job is already running; cancel it or wait for it to finish")]
    JobAlreadyActive,

    /// The source could not be opened or parsed as a playable video.
    #[error("Failed to load video at {path}: {reason}")]
    Decode {
        /// Path of the video that failed to load.
        path: PathBuf,
        /// Underlying reason the load failed.
        reason: String,
    },

    /// The file opened but carries no video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// Seeking to a sample timestamp failed.
    #[error("Failed to seek to {timestamp:?}: {reason}")]
    Seek {
        /// Requested sample timestamp.
        timestamp: Duration,
        /// Underlying reason.
        reason: String,
    },

    /// A seek did not resolve within the configured timeout.
    #[error("Seek to {timestamp:?} did not complete within {timeout:?}")]
    SeekTimeout {
        /// Requested sample timestamp.
        timestamp: Duration,
        /// Configured seek timeout.
        timeout: Duration,
    },

    /// No decoded frame was available to capture.
    #[error("Failed to capture frame: {0}")]
    Capture(String),

    /// A pixel buffer could not be encoded to an image payload.
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// Sampling or upload options are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The job worker panicked or was aborted before reporting an outcome.
    #[error("Job worker terminated unexpectedly: {0}")]
    WorkerPanicked(String),
}

/// Failure of a single frame delivery.
///
/// Upload failures are data-loss events for one frame. The dispatcher logs
/// them and moves on; job state and sampling progress are unaffected.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UploadError {
    /// The request could not be sent or the response could not be read.
    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the endpoint.
        status: StatusCode,
        /// Response body, possibly empty.
        body: String,
    },

    /// Writing the frame to a local sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}
