//! Pixel buffers and sampled frames.

use std::time::Duration;

/// A tightly packed 8-bit RGB pixel buffer (3 bytes per pixel, no row
/// padding).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGB bytes.
    ///
    /// Returns `None` when `data` does not hold exactly
    /// `width * height * 3` bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// A black buffer of the given size.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 3],
        }
    }

    /// Buffer width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// `true` when the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Overwrite this buffer from a strided plane, reusing the allocation.
    ///
    /// FFmpeg frames frequently carry per-row padding (stride > width × 3);
    /// the padding is stripped here.
    pub(crate) fn fill_from_plane(&mut self, width: u32, height: u32, plane: &[u8], stride: usize) {
        let row_bytes = (width as usize) * 3;
        self.width = width;
        self.height = height;
        self.data.clear();

        if stride == row_bytes {
            self.data.extend_from_slice(&plane[..row_bytes * (height as usize)]);
        } else {
            self.data.reserve(row_bytes * (height as usize));
            for row in 0..(height as usize) {
                let row_start = row * stride;
                self.data
                    .extend_from_slice(&plane[row_start..row_start + row_bytes]);
            }
        }
    }
}

/// One captured sample.
///
/// The pixels are borrowed from the capturer and stay valid only until the
/// next capture.
#[derive(Debug, Clone, Copy)]
pub struct SampledFrame<'a> {
    /// 0-based sequential sample number.
    pub index: u64,
    /// Position of the sample on the video timeline.
    pub timestamp: Duration,
    /// Captured pixels.
    pub pixels: &'a PixelBuffer,
}

impl SampledFrame<'_> {
    /// 1-based count of samples processed once this frame is counted.
    pub fn processed_count(&self) -> u64 {
        self.index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_checks_length() {
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 12]).is_some());
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 11]).is_none());
    }

    #[test]
    fn processed_count_is_one_based() {
        let pixels = PixelBuffer::black(1, 1);
        let frame = SampledFrame {
            index: 4,
            timestamp: Duration::from_secs(1),
            pixels: &pixels,
        };
        assert_eq!(frame.processed_count(), 5);
    }

    #[test]
    fn fill_strips_row_padding() {
        // 2x2 image, stride of 8 bytes (2 bytes of padding per row).
        let plane = [
            1, 2, 3, 4, 5, 6, 0xEE, 0xEE, //
            7, 8, 9, 10, 11, 12, 0xEE, 0xEE,
        ];
        let mut buffer = PixelBuffer::black(1, 1);
        buffer.fill_from_plane(2, 2, &plane, 8);

        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.height(), 2);
        assert_eq!(buffer.as_bytes(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn fill_fast_path_without_padding() {
        let plane: Vec<u8> = (0..12).collect();
        let mut buffer = PixelBuffer::black(2, 2);
        buffer.fill_from_plane(2, 2, &plane, 6);
        assert_eq!(buffer.as_bytes(), plane.as_slice());
    }
}
