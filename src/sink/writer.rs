use anyhow::{anyhow, bail, Context, Result};
use opencv::{core, imgproc, prelude::*, videoio};
use std::path::Path;

use super::FrameSink;
use crate::shared::constants::{EXCHANGE_PIXEL_SIZE, FALLBACK_FPS};
use crate::utils::{file_utils, logger};

/// Encodes RGB frames into a container file or stream through OpenCV.
pub struct VideoWriterSink {
    writer: videoio::VideoWriter,
    width: u32,
    height: u32,
    staging: Mat,
    bgr: Mat,
    finished: bool,
}

impl VideoWriterSink {
    pub fn create(path: &str, width: u32, height: u32, fps: f64) -> Result<Self> {
        if !path.contains("://") {
            file_utils::ensure_parent_dir(Path::new(path))?;
        }
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
        let fourcc = videoio::VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let size = core::Size::new(width as i32, height as i32);
        let writer = videoio::VideoWriter::new(path, fourcc, fps, size, true)
            .with_context(|| format!("Failed to create writer for {}", path))?;
        if !writer.is_opened()? {
            bail!("VideoWriter could not open {}", path);
        }

        let staging = Mat::new_rows_cols_with_default(
            height as i32,
            width as i32,
            core::CV_8UC3,
            core::Scalar::all(0.0),
        )?;

        logger::info(&format!("writer opened: {} {}x{} @ {:.2}fps", path, width, height, fps));
        Ok(Self {
            writer,
            width,
            height,
            staging,
            bgr: Mat::default(),
            finished: false,
        })
    }
}

impl FrameSink for VideoWriterSink {
    fn write_frame(&mut self, payload: &[u8], _timestamp_us: i64) -> Result<()> {
        if self.finished {
            bail!("writer is already finished");
        }
        let expected = self.width as usize * self.height as usize * EXCHANGE_PIXEL_SIZE;
        if payload.len() != expected {
            return Err(anyhow!("payload has {} bytes, expected {}", payload.len(), expected));
        }
        self.staging.data_bytes_mut()?.copy_from_slice(payload);

        #[cfg(target_os = "macos")]
        imgproc::cvt_color(
            &self.staging,
            &mut self.bgr,
            imgproc::COLOR_RGB2BGR,
            0,
            core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;

        #[cfg(not(target_os = "macos"))]
        imgproc::cvt_color(&self.staging, &mut self.bgr, imgproc::COLOR_RGB2BGR, 0)?;

        self.writer.write(&self.bgr)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.finished {
            self.finished = true;
            self.writer.release()?;
        }
        Ok(())
    }
}

impl Drop for VideoWriterSink {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
