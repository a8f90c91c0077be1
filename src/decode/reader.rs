use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::core::{ChannelSet, Format, FrameIndex, FrameRange, RectI};
use crate::foundation::error::{PlayheadError, PlayheadResult};

/// Header of one source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    /// Nominal format.
    pub display: Format,
    /// Region holding actual pixels.
    pub data: RectI,
    /// Channels the source provides.
    pub channels: ChannelSet,
}

/// Decoded rows of one frame, as premultiplied RGBA `f32` spanning the data window.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    info: FrameInfo,
    rows: BTreeMap<i32, Arc<[f32]>>,
}

impl DecodedImage {
    /// Image with no rows yet.
    pub fn new(info: FrameInfo) -> Self {
        Self {
            info,
            rows: BTreeMap::new(),
        }
    }

    /// Frame header.
    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// Samples of row `y`, `4 * data.width()` long.
    pub fn row(&self, y: i32) -> Option<&[f32]> {
        self.rows.get(&y).map(|r| &**r)
    }

    /// Store row `y`.
    pub fn insert_row(&mut self, y: i32, samples: impl Into<Arc<[f32]>>) {
        self.rows.insert(y, samples.into());
    }

    /// Decoded row numbers, ascending.
    pub fn row_numbers(&self) -> impl Iterator<Item = i32> + '_ {
        self.rows.keys().copied()
    }

    /// Number of decoded rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Take every row of `other`.
    pub fn merge(&mut self, other: DecodedImage) {
        self.rows.extend(other.rows);
    }

    /// Keep only the listed rows.
    pub fn retain_rows(&mut self, rows: &[i32]) {
        self.rows.retain(|y, _| rows.binary_search(y).is_ok());
    }
}

/// External frame source (image sequence, generator, ...).
///
/// Implementations are called from decode worker threads and must be thread-safe.
pub trait FrameReader: Send + Sync {
    /// Stable name, used in cache keys.
    fn name(&self) -> &str;

    /// Frames the source can produce.
    fn frame_range(&self) -> FrameRange;

    /// Read the header of `frame` without decoding pixels.
    fn info(&self, frame: FrameIndex) -> PlayheadResult<FrameInfo>;

    /// Whether [`FrameReader::decode_rows`] decodes only the requested rows.
    fn supports_scanlines(&self) -> bool {
        false
    }

    /// Decode every row of `frame`.
    fn decode_frame(&self, frame: FrameIndex) -> PlayheadResult<DecodedImage>;

    /// Decode the listed rows (sorted, deduplicated). Defaults to a full decode filtered down.
    fn decode_rows(&self, frame: FrameIndex, rows: &[i32]) -> PlayheadResult<DecodedImage> {
        let mut image = self.decode_frame(frame)?;
        image.retain_rows(rows);
        Ok(image)
    }
}

/// Deterministic gradient generator. Counts the work it is asked to do.
#[derive(Debug)]
pub struct ProceduralReader {
    name: String,
    range: FrameRange,
    format: Format,
    scanlines: bool,
    frames_decoded: AtomicU64,
    rows_decoded: AtomicU64,
}

impl ProceduralReader {
    /// Generator for `range` at `width x height`, with scan-line decoding enabled.
    pub fn new(name: impl Into<String>, range: FrameRange, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            range,
            format: Format::new(width, height),
            scanlines: true,
            frames_decoded: AtomicU64::new(0),
            rows_decoded: AtomicU64::new(0),
        }
    }

    /// Toggle scan-line support.
    pub fn with_scanlines(mut self, enabled: bool) -> Self {
        self.scanlines = enabled;
        self
    }

    /// Pixel value at `(x, y)` of `frame`.
    pub fn pixel(&self, frame: FrameIndex, x: i32, y: i32) -> [f32; 4] {
        let w = self.format.width().max(1) as f32;
        let h = self.format.height().max(1) as f32;
        let span = self.range.len_frames().max(1) as f32;
        let t = (frame.0 - self.range.first.0) as f32 / span;
        [x as f32 / w, y as f32 / h, t, 1.0]
    }

    /// Total rows produced so far.
    pub fn rows_decoded(&self) -> u64 {
        self.rows_decoded.load(Ordering::Relaxed)
    }

    /// Number of decode calls so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded.load(Ordering::Relaxed)
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

    fn decode_into(&self, frame: FrameIndex, rows: impl Iterator<Item = i32>) -> DecodedImage {
        let info = self.header();
        let mut image = DecodedImage::new(info);
        let mut produced = 0u64;
        for y in rows.filter(|y| info.data.contains_row(*y)) {
            let mut samples = Vec::with_capacity(info.data.width() as usize * 4);
            for x in info.data.x..info.data.r {
                samples.extend_from_slice(&self.pixel(frame, x, y));
            }
            image.insert_row(y, samples);
            produced += 1;
        }
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
        self.rows_decoded.fetch_add(produced, Ordering::Relaxed);
        image
    }

    fn header(&self) -> FrameInfo {
        FrameInfo {
            display: self.format,
            data: self.format.window,
            channels: ChannelSet::RGBA,
        }
    }
}

impl FrameReader for ProceduralReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn frame_range(&self) -> FrameRange {
        self.range
    }

    fn info(&self, frame: FrameIndex) -> PlayheadResult<FrameInfo> {
        self.check(frame)?;
        Ok(self.header())
    }

    fn supports_scanlines(&self) -> bool {
        self.scanlines
    }

    fn decode_frame(&self, frame: FrameIndex) -> PlayheadResult<DecodedImage> {
        self.check(frame)?;
        let window = self.format.window;
        Ok(self.decode_into(frame, window.y..window.t))
    }

    fn decode_rows(&self, frame: FrameIndex, rows: &[i32]) -> PlayheadResult<DecodedImage> {
        self.check(frame)?;
        if !self.scanlines {
            let mut image = self.decode_frame(frame)?;
            image.retain_rows(rows);
            return Ok(image);
        }
        Ok(self.decode_into(frame, rows.iter().copied()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/reader.rs"]
mod tests;
