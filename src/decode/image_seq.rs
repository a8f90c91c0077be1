use std::path::PathBuf;

use anyhow::Context;

use crate::decode::reader::{DecodedImage, FrameInfo, FrameReader};
use crate::foundation::core::{ChannelSet, Format, FrameIndex, FrameRange};
use crate::foundation::error::{PlayheadError, PlayheadResult};

/// A file path with one run of `#` standing for the zero-padded frame number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SequencePattern {
    prefix: String,
    suffix: String,
    padding: usize,
}

impl SequencePattern {
    pub(crate) fn parse(pattern: &str) -> PlayheadResult<Self> {
        let start = pattern.find('#').ok_or_else(|| {
            PlayheadError::validation(format!("sequence pattern '{pattern}' has no '#' padding"))
        })?;
        let padding = pattern[start..].chars().take_while(|c| *c == '#').count();
        let suffix = &pattern[start + padding..];
        if suffix.contains('#') {
            return Err(PlayheadError::validation(format!(
                "sequence pattern '{pattern}' has more than one '#' run"
            )));
        }
        Ok(Self {
            prefix: pattern[..start].to_owned(),
            suffix: suffix.to_owned(),
            padding,
        })
    }

    pub(crate) fn path_for(&self, frame: FrameIndex) -> PathBuf {
        let digits = if frame.0 < 0 {
            format!("-{:0width$}", frame.0.unsigned_abs(), width = self.padding)
        } else {
            format!("{:0width$}", frame.0, width = self.padding)
        };
        PathBuf::from(format!("{}{digits}{}", self.prefix, self.suffix))
    }
}

/// Numbered image files such as `plate.####.png`, decoded whole with the `image` crate.
///
/// The run of `#` characters in the pattern is replaced by the zero-padded frame number.
/// Row 0 is the top row of the file.
#[derive(Clone, Debug)]
pub struct ImageSequenceReader {
    name: String,
    pattern: SequencePattern,
    range: FrameRange,
}

impl ImageSequenceReader {
    /// Reader for `pattern` over `range`.
    pub fn new(pattern: impl AsRef<str>, range: FrameRange) -> PlayheadResult<Self> {
        let pattern = pattern.as_ref();
        Ok(Self {
            name: pattern.to_owned(),
            pattern: SequencePattern::parse(pattern)?,
            range,
        })
    }

    /// File path of `frame`.
    pub fn path_for(&self, frame: FrameIndex) -> PathBuf {
        self.pattern.path_for(frame)
    }

    fn check(&self, frame: FrameIndex) -> PlayheadResult<()> {
        if !self.range.contains(frame) {
            return Err(PlayheadError::decode(format!(
                "{}: frame {frame} outside {}..={}",
                self.name, self.range.first, self.range.last
            )));
        }
        Ok(())
    }
}

impl FrameReader for ImageSequenceReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_range(&self) -> FrameRange {
        self.range
    }

    fn info(&self, frame: FrameIndex) -> PlayheadResult<FrameInfo> {
        self.check(frame)?;
        let path = self.path_for(frame);
        let (w, h) = image::image_dimensions(&path)
            .with_context(|| format!("read header of '{}'", path.display()))?;
        let display = Format::new(w, h);
        Ok(FrameInfo {
            display,
            data: display.window,
            channels: ChannelSet::RGBA,
        })
    }

    #[tracing::instrument(level = "debug", skip(self), fields(reader = %self.name))]
    fn decode_frame(&self, frame: FrameIndex) -> PlayheadResult<DecodedImage> {
        self.check(frame)?;
        let path = self.path_for(frame);
        let rgba = image::open(&path)
            .with_context(|| format!("decode '{}'", path.display()))?
            .to_rgba32f();
        let (w, h) = rgba.dimensions();
        let display = Format::new(w, h);
        let mut out = DecodedImage::new(FrameInfo {
            display,
            data: display.window,
            channels: ChannelSet::RGBA,
        });
        let stride = w as usize * 4;
        let mut raw = rgba.into_raw();
        for px in raw.chunks_exact_mut(4) {
            let a = px[3];
            px[0] *= a;
            px[1] *= a;
            px[2] *= a;
        }
        for (y, row) in raw.chunks_exact(stride.max(1)).enumerate() {
            out.insert_row(y as i32, row);
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/image_seq.rs"]
mod tests;
