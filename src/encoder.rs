//! Lossy still-image encoding for upload-eligible frames.

use image::{ExtendedColorType, codecs::jpeg::JpegEncoder as ImageJpegEncoder};

use crate::{error::FrameSiftError, frame::PixelBuffer};

/// Compresses a pixel buffer into a transmittable image payload.
///
/// Implementations are pure: no shared state, the same input yields the same
/// payload (up to the codec's own nondeterminism).
pub trait FrameEncoder: Send + Sync {
    /// Encode `pixels` at `quality` in `(0.0, 1.0]`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameSiftError::Encode`] for an empty or inconsistent buffer.
    fn encode(&self, pixels: &PixelBuffer, quality: f32) -> Result<Vec<u8>, FrameSiftError>;
}

/// Baseline JPEG encoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegEncoder;

impl JpegEncoder {
    /// Map a `(0.0, 1.0]` quality to the codec's `1..=100` scale.
    pub(crate) fn codec_quality(quality: f32) -> u8 {
        if !quality.is_finite() {
            return 100;
        }
        (quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl FrameEncoder for JpegEncoder {
    fn encode(&self, pixels: &PixelBuffer, quality: f32) -> Result<Vec<u8>, FrameSiftError> {
        if pixels.is_empty() || pixels.width() == 0 || pixels.height() == 0 {
            return Err(FrameSiftError::Encode(format!(
                "cannot encode an empty {}x{} buffer",
                pixels.width(),
                pixels.height()
            )));
        }

        let mut payload = Vec::new();
        ImageJpegEncoder::new_with_quality(&mut payload, Self::codec_quality(quality))
            .encode(
                pixels.as_bytes(),
                pixels.width(),
                pixels.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|error| FrameSiftError::Encode(error.to_string()))?;

        log::trace!(
            "Encoded {}x{} frame to {} bytes of JPEG",
            pixels.width(),
            pixels.height(),
            payload.len()
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_mapping() {
        assert_eq!(JpegEncoder::codec_quality(0.8), 80);
        assert_eq!(JpegEncoder::codec_quality(1.0), 100);
        assert_eq!(JpegEncoder::codec_quality(0.001), 1);
        assert_eq!(JpegEncoder::codec_quality(f32::NAN), 100);
    }

    #[test]
    fn encodes_jpeg_with_soi_marker() {
        let pixels = PixelBuffer::black(64, 36);
        let payload = JpegEncoder.encode(&pixels, 0.8).unwrap();
        assert!(payload.len() > 4);
        assert_eq!(&payload[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&payload).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 36);
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let pixels = PixelBuffer::black(0, 0);
        let error = JpegEncoder.encode(&pixels, 0.8).unwrap_err();
        assert!(matches!(error, FrameSiftError::Encode(_)));
    }
}
