use std::path::PathBuf;

use anyhow::Context;

use crate::decode::image_seq::SequencePattern;
use crate::foundation::core::{ByteMode, Fps, FrameIndex, FrameRange};
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::render::surface::TransferBuffer;

/// Configuration handed to a [`FrameSink`] before the first frame of a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal frame rate.
    pub fps: Fps,
    /// Frames that will be pushed.
    pub range: FrameRange,
    /// Pixel depth of the pushed buffers.
    pub byte_mode: ByteMode,
}

/// Consumer of frames rendered by a writer node.
///
/// `push_frame` is called in strictly increasing frame order within the configured range.
/// Buffer row `i` holds the `i`-th row of the data window.
pub trait FrameSink: Send {
    /// Called once before any frame is pushed.
    fn begin(&mut self, cfg: SinkConfig) -> PlayheadResult<()>;
    /// Push one rendered frame.
    fn push_frame(&mut self, frame: FrameIndex, image: &TransferBuffer) -> PlayheadResult<()>;
    /// Called once after the last frame of the range.
    fn end(&mut self) -> PlayheadResult<()>;
}

/// Keeps every pushed frame in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(FrameIndex, TransferBuffer)>,
    ended: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured by `begin`.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    /// Frames in push order.
    pub fn frames(&self) -> &[(FrameIndex, TransferBuffer)] {
        &self.frames
    }

    /// Whether `end` was called after the last `begin`.
    pub fn is_finished(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> PlayheadResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        Ok(())
    }

    fn push_frame(&mut self, frame: FrameIndex, image: &TransferBuffer) -> PlayheadResult<()> {
        self.frames.push((frame, image.clone()));
        Ok(())
    }

    fn end(&mut self) -> PlayheadResult<()> {
        self.ended = true;
        Ok(())
    }
}

/// Writes numbered 8-bit RGBA image files, e.g. `out/comp.####.png`.
///
/// The file format follows the extension. Float buffers are quantised.
#[derive(Debug)]
pub struct ImageSequenceSink {
    pattern: SequencePattern,
    written: Vec<PathBuf>,
}

impl ImageSequenceSink {
    pub fn new(pattern: impl AsRef<str>) -> PlayheadResult<Self> {
        Ok(Self {
            pattern: SequencePattern::parse(pattern.as_ref())?,
            written: Vec::new(),
        })
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn begin(&mut self, _cfg: SinkConfig) -> PlayheadResult<()> {
        self.written.clear();
        if let Some(dir) = self.pattern.path_for(FrameIndex(0)).parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn push_frame(&mut self, frame: FrameIndex, image: &TransferBuffer) -> PlayheadResult<()> {
        let rect = image.rect();
        let bytes = match image.byte_mode() {
            ByteMode::Byte => image.data().to_vec(),
            ByteMode::Float => image
                .data()
                .chunks_exact(4)
                .map(|b| {
                    let v = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    (v.clamp(0.0, 1.0) * 255.0).round() as u8
                })
                .collect(),
        };
        let img = image::RgbaImage::from_raw(rect.w, rect.h, bytes).ok_or_else(|| {
            PlayheadError::validation(format!("frame {frame}: buffer does not match {}x{}", rect.w, rect.h))
        })?;
        let path = self.pattern.path_for(frame);
        img.save(&path)
            .with_context(|| format!("write '{}'", path.display()))?;
        self.written.push(path);
        Ok(())
    }

    fn end(&mut self) -> PlayheadResult<()> {
        tracing::info!(files = self.written.len(), "image sequence written");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/sink.rs"]
mod tests;
