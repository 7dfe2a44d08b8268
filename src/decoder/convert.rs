use fast_image_resize as fr;
use fr::images::Image;
use rayon::prelude::*;

use super::{FrameData, PixelFormat};
use crate::shared::constants::EXCHANGE_PIXEL_SIZE;
use crate::utils::logger;

/// Pixel conversion collaborator: decoder output to the RGB24 exchange format.
pub trait Convert: Send {
    /// Geometry of the converted pictures for a given source geometry.
    fn output_geometry(&self, width: u32, height: u32) -> (u32, u32);

    /// `None` means the picture could not be converted and should be skipped.
    fn convert(&mut self, frame: FrameData) -> Option<Vec<u8>>;
}

/// Converts to tightly packed RGB24, optionally scaled to a fixed size.
pub struct RgbConverter {
    target: Option<(u32, u32)>,
    resizer: fr::Resizer,
}

impl RgbConverter {
    pub fn new(target: Option<(u32, u32)>) -> Self {
        Self {
            target: target.filter(|(w, h)| *w > 0 && *h > 0),
            resizer: fr::Resizer::new(),
        }
    }

    fn scale(&mut self, rgb: Vec<u8>, src: (u32, u32), dst: (u32, u32)) -> Option<Vec<u8>> {
        let src_image = match Image::from_vec_u8(src.0, src.1, rgb, fr::PixelType::U8x3) {
            Ok(image) => image,
            Err(e) => {
                logger::debug(&format!("convert: bad source image {}x{}: {}", src.0, src.1, e));
                return None;
            }
        };
        let mut dst_image = Image::new(dst.0, dst.1, fr::PixelType::U8x3);
        if let Err(e) = self.resizer.resize(&src_image, &mut dst_image, None) {
            logger::debug(&format!("convert: resize failed: {}", e));
            return None;
        }
        Some(dst_image.buffer().to_vec())
    }
}

impl Convert for RgbConverter {
    fn output_geometry(&self, width: u32, height: u32) -> (u32, u32) {
        self.target.unwrap_or((width, height))
    }

    fn convert(&mut self, frame: FrameData) -> Option<Vec<u8>> {
        if frame.width == 0 || frame.height == 0 || frame.buffer.len() != frame.expected_len() {
            return None;
        }
        let src = (frame.width, frame.height);
        let dst = self.output_geometry(frame.width, frame.height);

        let mut rgb = frame.buffer;
        if frame.format == PixelFormat::Bgr24 {
            swap_red_blue(&mut rgb);
        }

        if src == dst {
            Some(rgb)
        } else {
            self.scale(rgb, src, dst)
        }
    }
}

/// In-place BGR24 <-> RGB24.
pub fn swap_red_blue(pixels: &mut [u8]) {
    pixels
        .par_chunks_mut(EXCHANGE_PIXEL_SIZE * 1024)
        .for_each(|chunk| {
            for px in chunk.chunks_exact_mut(EXCHANGE_PIXEL_SIZE) {
                px.swap(0, 2);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 3], format: PixelFormat) -> FrameData {
        let buffer = px.repeat((width * height) as usize);
        FrameData::new(buffer, width, height, format, None)
    }

    #[test]
    fn test_passthrough_keeps_allocation() {
        let frame = solid(4, 2, [1, 2, 3], PixelFormat::Rgb24);
        let ptr = frame.buffer.as_ptr();
        let mut converter = RgbConverter::new(None);
        let out = converter.convert(frame).unwrap();
        assert_eq!(out.as_ptr(), ptr);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_bgr_is_swapped() {
        let mut converter = RgbConverter::new(None);
        let out = converter.convert(solid(3, 3, [10, 20, 30], PixelFormat::Bgr24)).unwrap();
        assert!(out.chunks_exact(3).all(|px| px == [30, 20, 10]));
    }

    #[test]
    fn test_scaling_to_target() {
        let mut converter = RgbConverter::new(Some((4, 2)));
        assert_eq!(converter.output_geometry(8, 4), (4, 2));
        let out = converter.convert(solid(8, 4, [200, 100, 50], PixelFormat::Rgb24)).unwrap();
        assert_eq!(out.len(), 4 * 2 * 3);
        // A solid colour stays (nearly) solid after resampling
        for px in out.chunks_exact(3) {
            assert!((px[0] as i32 - 200).abs() <= 1);
            assert!((px[1] as i32 - 100).abs() <= 1);
            assert!((px[2] as i32 - 50).abs() <= 1);
        }
    }

    #[test]
    fn test_truncated_buffer_is_rejected() {
        let mut frame = solid(4, 4, [0, 0, 0], PixelFormat::Rgb24);
        frame.buffer.truncate(10);
        assert!(RgbConverter::new(None).convert(frame).is_none());
    }

    #[test]
    fn test_swap_across_chunk_boundary() {
        let mut pixels: Vec<u8> = (0..3 * 2000).map(|i| (i % 3) as u8).collect();
        swap_red_blue(&mut pixels);
        assert!(pixels.chunks_exact(3).all(|px| px == [2, 1, 0]));
    }
}
