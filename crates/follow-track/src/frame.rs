use crate::{Error, PixelBuffer, Result};
use serde::{Deserialize, Serialize};

/// Pixel layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    #[default]
    Rgb888,
    Bgr888,
    Gray8,
}

impl PixelFormat {
    /// Returns the number of bytes used by a single pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Returns the number of bytes used by a `width` x `height` image
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

/// A captured frame: descriptor plus owned pixel storage.
///
/// The frame owns its buffer, dropping the frame releases it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Capture sequence number assigned by the producer.
    sequence: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    buffer: PixelBuffer,
}

impl Frame {
    /// Returns a new Frame
    ///
    /// The buffer length must match `width * height * bytes_per_pixel`.
    pub fn new(
        sequence: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
        buffer: PixelBuffer,
    ) -> Result<Frame> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }

        let expected = format.frame_size(width, height);
        if buffer.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "{width}x{height} {format:?} frame needs {expected} bytes, buffer holds {}",
                buffer.len()
            )));
        }

        Ok(Frame {
            sequence,
            width,
            height,
            format,
            buffer,
        })
    }

    /// Returns the capture sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixel format
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the size of the pixel payload in bytes
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the pixel payload
    pub fn pixels(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Returns the underlying buffer
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }
}
