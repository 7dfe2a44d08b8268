use anyhow::{anyhow, Result};
use opencv::{core, prelude::*, videoio};

use super::{CodedUnit, Decode, DecodeStatus, FrameData, PixelFormat, ReadStatus, StreamInfo};
use crate::core::error::ProviderError;
use crate::shared::constants::MICROS_PER_SECOND;
use crate::utils::{logger, platform};

/// File, network stream or camera decoder backed by OpenCV's VideoCapture.
///
/// `grab()` plays the role of reading a coded unit and `retrieve()` the role
/// of pulling the decoded picture, so the producer loop drives it like any
/// packet/frame decoder.
pub struct VideoDecoder {
    capture: videoio::VideoCapture,
    info: StreamInfo,
    grabbed: bool,
}

impl VideoDecoder {
    /// Open a local file or a network URL (rtsp://, rtmp://, http://).
    pub fn open(uri: &str) -> Result<Self, ProviderError> {
        let capture = videoio::VideoCapture::from_file(uri, videoio::CAP_ANY).map_err(|e| {
            ProviderError::Open { source_id: uri.to_string(), reason: e.to_string() }
        })?;
        Self::from_capture(capture, uri)
    }

    pub fn open_camera(index: i32) -> Result<Self, ProviderError> {
        let source_id = format!("camera:{}", index);
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(|e| {
            ProviderError::Open { source_id: source_id.clone(), reason: e.to_string() }
        })?;
        Self::from_capture(capture, &source_id)
    }

    fn from_capture(mut capture: videoio::VideoCapture, source_id: &str) -> Result<Self, ProviderError> {
        // Hardware decode where the backend offers it
        let _ = capture.set(videoio::CAP_PROP_HW_ACCELERATION, videoio::VIDEO_ACCELERATION_ANY as f64);

        let opened = capture.is_opened().map_err(|e| ProviderError::Decoder(e.to_string()))?;
        if !opened {
            return Err(ProviderError::Open {
                source_id: source_id.to_string(),
                reason: "VideoCapture could not open the source".to_string(),
            });
        }

        let prop = |capture: &videoio::VideoCapture, id: i32| capture.get(id).unwrap_or(0.0);
        let width = prop(&capture, videoio::CAP_PROP_FRAME_WIDTH) as u32;
        let height = prop(&capture, videoio::CAP_PROP_FRAME_HEIGHT) as u32;
        let fps = prop(&capture, videoio::CAP_PROP_FPS);
        if width == 0 || height == 0 {
            return Err(ProviderError::NoVideoStream(source_id.to_string()));
        }

        let _ = core::set_num_threads(platform::core_count() as i32);

        logger::info(&format!(
            "decoder opened: {} {}x{} @ {:.2}fps backend={}",
            source_id,
            width,
            height,
            fps,
            capture.get_backend_name().unwrap_or_default()
        ));

        Ok(Self {
            capture,
            info: StreamInfo {
                width,
                height,
                fps,
                time_base: (1, MICROS_PER_SECOND),
                video_stream: 0,
            },
            grabbed: false,
        })
    }
}

impl Decode for VideoDecoder {
    fn stream_info(&self) -> StreamInfo {
        self.info
    }

    fn read_unit(&mut self) -> ReadStatus {
        match self.capture.grab() {
            Ok(true) => ReadStatus::Unit(CodedUnit { stream_index: 0, data: Vec::new() }),
            Ok(false) => ReadStatus::EndOfStream,
            Err(e) => {
                logger::debug(&format!("grab failed: {}", e));
                ReadStatus::Retry
            }
        }
    }

    fn send_unit(&mut self, _unit: &CodedUnit) -> Result<()> {
        self.grabbed = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<DecodeStatus> {
        if !self.grabbed {
            return Ok(DecodeStatus::Pending);
        }
        self.grabbed = false;

        let mut frame = Mat::default();
        if !self.capture.retrieve(&mut frame, 0)? || frame.empty() {
            return Ok(DecodeStatus::Pending);
        }
        if !frame.is_continuous() {
            return Err(anyhow!("Frame is not continuous"));
        }

        // A position of zero means the backend has no timestamp for us
        let pos_ms = self.capture.get(videoio::CAP_PROP_POS_MSEC).unwrap_or(0.0);
        let pts = (pos_ms > 0.0).then(|| (pos_ms * 1000.0) as i64);

        Ok(DecodeStatus::Frame(FrameData::new(
            frame.data_bytes()?.to_vec(),
            frame.cols() as u32,
            frame.rows() as u32,
            PixelFormat::Bgr24,
            pts,
        )))
    }
}
