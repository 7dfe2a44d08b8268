/// Pixel layouts a decoder may hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        3
    }
}

/// A decoded picture as it leaves the decoder, before conversion.
#[derive(Clone)]
pub struct FrameData {
    pub buffer: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Presentation time in stream time-base units, if the stream has one
    pub pts: Option<i64>,
}

impl FrameData {
    pub fn new(buffer: Vec<u8>, width: u32, height: u32, format: PixelFormat, pts: Option<i64>) -> Self {
        Self { buffer, width, height, format, pts }
    }

    /// Bytes a tightly packed picture of this geometry occupies.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}
