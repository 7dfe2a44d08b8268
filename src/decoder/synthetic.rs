use anyhow::Result;

use super::{CodedUnit, Decode, DecodeStatus, FrameData, PixelFormat, ReadStatus, StreamInfo};
use crate::core::error::ConfigError;
use crate::shared::constants::{MICROS_PER_SECOND, SYNTHETIC_SCHEME};

/// Parameters of a generated test-pattern stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// `None` generates frames until stopped
    pub frames: Option<u64>,
    /// Attach a pts to each picture; otherwise the producer synthesizes one
    pub with_pts: bool,
    /// Pictures made available per coded unit, to emulate decoder backlog
    pub frames_per_unit: u32,
    /// Number of leading reads that fail transiently
    pub failing_reads: u32,
    pub format: PixelFormat,
}

impl SyntheticSpec {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            frames: None,
            with_pts: true,
            frames_per_unit: 1,
            failing_reads: 0,
            format: PixelFormat::Rgb24,
        }
    }

    /// Parse `synthetic:WIDTHxHEIGHT@FPS[/FRAMES]`.
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownSource(uri.to_string());
        let body = uri.strip_prefix(SYNTHETIC_SCHEME).ok_or_else(unknown)?;

        let (geometry, rest) = body.split_once('@').ok_or_else(unknown)?;
        let (width, height) = geometry.split_once('x').ok_or_else(unknown)?;
        let (fps, frames) = match rest.split_once('/') {
            Some((fps, frames)) => (fps, Some(frames)),
            None => (rest, None),
        };

        let width: u32 = width.trim().parse().map_err(|_| unknown())?;
        let height: u32 = height.trim().parse().map_err(|_| unknown())?;
        let fps: f64 = fps.trim().parse().map_err(|_| unknown())?;
        if width == 0 || height == 0 || !(fps > 0.0) {
            return Err(ConfigError::Invalid {
                field: "source",
                reason: format!("`{}` needs a non-empty geometry and a positive frame rate", uri),
            });
        }

        let mut spec = Self::new(width, height, fps);
        if let Some(frames) = frames {
            spec.frames = Some(frames.trim().parse().map_err(|_| unknown())?);
        }
        Ok(spec)
    }
}

/// Decoder that fabricates a moving gradient instead of reading a source.
pub struct SyntheticDecoder {
    spec: SyntheticSpec,
    scheduled: u64,
    emitted: u64,
    failures_left: u32,
}

impl SyntheticDecoder {
    pub fn new(spec: SyntheticSpec) -> Self {
        let failures_left = spec.failing_reads;
        Self {
            spec,
            scheduled: 0,
            emitted: 0,
            failures_left,
        }
    }

    fn exhausted(&self) -> bool {
        matches!(self.spec.frames, Some(limit) if self.scheduled >= limit)
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.spec.width as usize, self.spec.height as usize);
        let shift = index as usize;
        let mut buffer = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let r = (x + shift) as u8;
                let g = (y + shift) as u8;
                let b = shift as u8;
                match self.spec.format {
                    PixelFormat::Rgb24 => buffer.extend_from_slice(&[r, g, b]),
                    PixelFormat::Bgr24 => buffer.extend_from_slice(&[b, g, r]),
                }
            }
        }
        buffer
    }
}

impl Decode for SyntheticDecoder {
    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            width: self.spec.width,
            height: self.spec.height,
            fps: self.spec.fps,
            time_base: (1, MICROS_PER_SECOND),
            video_stream: 0,
        }
    }

    fn read_unit(&mut self) -> ReadStatus {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return ReadStatus::Retry;
        }
        if self.exhausted() {
            return ReadStatus::EndOfStream;
        }
        ReadStatus::Unit(CodedUnit {
            stream_index: 0,
            data: self.scheduled.to_le_bytes().to_vec(),
        })
    }

    fn send_unit(&mut self, _unit: &CodedUnit) -> Result<()> {
        let mut burst = u64::from(self.spec.frames_per_unit.max(1));
        if let Some(limit) = self.spec.frames {
            burst = burst.min(limit.saturating_sub(self.scheduled));
        }
        self.scheduled += burst;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<DecodeStatus> {
        if self.emitted >= self.scheduled {
            return Ok(DecodeStatus::Pending);
        }
        let index = self.emitted;
        self.emitted += 1;

        let pts = self
            .spec
            .with_pts
            .then(|| (index as f64 * MICROS_PER_SECOND as f64 / self.spec.fps) as i64);
        Ok(DecodeStatus::Frame(FrameData::new(
            self.render(index),
            self.spec.width,
            self.spec.height,
            self.spec.format,
            pts,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let spec = SyntheticSpec::parse("synthetic:64x32@30/90").unwrap();
        assert_eq!((spec.width, spec.height), (64, 32));
        assert_eq!(spec.fps, 30.0);
        assert_eq!(spec.frames, Some(90));

        let endless = SyntheticSpec::parse("synthetic:8x8@12.5").unwrap();
        assert_eq!(endless.frames, None);
        assert_eq!(endless.fps, 12.5);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SyntheticSpec::parse("movie.mp4").is_err());
        assert!(SyntheticSpec::parse("synthetic:64x@30").is_err());
        assert!(SyntheticSpec::parse("synthetic:0x8@30").is_err());
        assert!(SyntheticSpec::parse("synthetic:8x8@0").is_err());
    }

    #[test]
    fn test_burst_and_end_of_stream() {
        let mut spec = SyntheticSpec::new(2, 2, 10.0);
        spec.frames = Some(5);
        spec.frames_per_unit = 3;
        let mut decoder = SyntheticDecoder::new(spec);

        let mut pts = Vec::new();
        loop {
            let unit = match decoder.read_unit() {
                ReadStatus::Unit(unit) => unit,
                ReadStatus::EndOfStream => break,
                ReadStatus::Retry => panic!("no failures configured"),
            };
            decoder.send_unit(&unit).unwrap();
            while let DecodeStatus::Frame(frame) = decoder.receive_frame().unwrap() {
                assert_eq!(frame.buffer.len(), frame.expected_len());
                pts.push(frame.pts.unwrap());
            }
        }
        assert_eq!(pts, vec![0, 100_000, 200_000, 300_000, 400_000]);
    }

    #[test]
    fn test_leading_failures() {
        let mut spec = SyntheticSpec::new(2, 2, 10.0);
        spec.failing_reads = 2;
        let mut decoder = SyntheticDecoder::new(spec);
        assert!(matches!(decoder.read_unit(), ReadStatus::Retry));
        assert!(matches!(decoder.read_unit(), ReadStatus::Retry));
        assert!(matches!(decoder.read_unit(), ReadStatus::Unit(_)));
    }
}
