use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::FrameSink;
use crate::core::frame_buffer::FrameBuffer;
use crate::shared::constants::DUMP_MAGIC;
use crate::utils::{file_utils, logger};

const HEADER_LEN: usize = 8;
const RECORD_HEADER_LEN: usize = 16;

/// Writes every delivered frame to a file, lz4-compressed.
///
/// Layout: `FPD1`, width (u16 LE), height (u16 LE), then per frame
/// timestamp (i64 LE), compressed length (u32 LE), raw length (u32 LE) and
/// the lz4 block.
pub struct DumpSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    frames: u64,
    raw_bytes: u64,
    stored_bytes: u64,
}

impl DumpSink {
    pub fn create(path: &Path, width: u32, height: u32) -> Result<Self> {
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            bail!("frame size {}x{} does not fit a dump header", width, height);
        };
        file_utils::ensure_parent_dir(path)?;
        let file = File::create(path).with_context(|| format!("Failed to create dump: {:?}", path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(DUMP_MAGIC)?;
        writer.write_all(&w.to_le_bytes())?;
        writer.write_all(&h.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            frames: 0,
            raw_bytes: 0,
            stored_bytes: 0,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for DumpSink {
    fn write_frame(&mut self, payload: &[u8], timestamp_us: i64) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("dump {:?} is already finished", self.path);
        };
        let compressed = lz4::block::compress(payload, None, false)?;
        writer.write_all(&timestamp_us.to_le_bytes())?;
        writer.write_all(&(compressed.len() as u32).to_le_bytes())?;
        writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        writer.write_all(&compressed)?;

        self.frames += 1;
        self.raw_bytes += payload.len() as u64;
        self.stored_bytes += compressed.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().with_context(|| format!("Failed to flush dump: {:?}", self.path))?;
            logger::info(&format!(
                "dump {:?}: {} frames, {} bytes raw, {} bytes stored",
                self.path, self.frames, self.raw_bytes, self.stored_bytes
            ));
        }
        Ok(())
    }
}

impl Drop for DumpSink {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}

/// Contents of a frame dump.
pub struct DumpSummary {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<FrameBuffer>,
}

impl DumpSummary {
    pub fn timestamps(&self) -> Vec<i64> {
        self.frames.iter().map(|f| f.timestamp()).collect()
    }

    /// Span between first and last timestamp, in microseconds.
    pub fn duration_us(&self) -> i64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp() - first.timestamp(),
            _ => 0,
        }
    }
}

fn field<const N: usize>(data: &[u8], at: usize) -> Result<[u8; N]> {
    let Some(bytes) = data.get(at..at + N) else {
        bail!("dump truncated at byte {}", at);
    };
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Read a dump written by `DumpSink` back into frames.
pub fn read_dump(path: &Path) -> Result<DumpSummary> {
    let data = file_utils::read_file(path)?;
    if data.len() < HEADER_LEN || &data[..4] != DUMP_MAGIC {
        bail!("{:?} is not a frame dump", path);
    }
    let width = u16::from_le_bytes(field(&data, 4)?) as u32;
    let height = u16::from_le_bytes(field(&data, 6)?) as u32;

    let mut frames = Vec::new();
    let mut pos = HEADER_LEN;
    while pos < data.len() {
        let timestamp = i64::from_le_bytes(field(&data, pos)?);
        let stored = u32::from_le_bytes(field(&data, pos + 8)?) as usize;
        let raw = u32::from_le_bytes(field(&data, pos + 12)?) as usize;
        pos += RECORD_HEADER_LEN;

        let Some(block) = data.get(pos..pos + stored) else {
            bail!("dump truncated in frame {}", frames.len());
        };
        let payload = if raw == 0 {
            Vec::new()
        } else {
            lz4::block::decompress(block, Some(raw as i32))?
        };
        if payload.len() != raw {
            bail!("frame {} decompressed to {} bytes, expected {}", frames.len(), payload.len(), raw);
        }
        frames.push(FrameBuffer::bind(payload, timestamp));
        pos += stored;
    }

    Ok(DumpSummary { width, height, frames })
}
