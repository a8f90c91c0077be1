use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::decode::reader::{DecodedImage, FrameInfo, FrameReader};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{PlayheadError, PlayheadResult};

/// How a descriptor's frame was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeMode {
    /// Header only; the pixels came from the frame cache.
    CachedFrame,
    /// Rows decoded incrementally.
    ScanLines,
    /// Decoded in one piece.
    WholeFrame,
}

/// Whether a decode request blocks the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeSync {
    /// Decode on the calling thread.
    Sync,
    /// Decode on a worker thread; joined on first access.
    Async,
}

/// Rows already decoded for a scan-line descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanLineContext {
    rows: BTreeSet<i32>,
}

impl ScanLineContext {
    /// Context holding `rows`.
    pub fn new(rows: impl IntoIterator<Item = i32>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    /// Wanted rows not decoded yet, ascending and unique.
    pub fn missing(&self, wanted: &[i32]) -> Vec<i32> {
        let wanted: BTreeSet<i32> = wanted.iter().copied().collect();
        wanted.difference(&self.rows).copied().collect()
    }

    /// Record `rows` as decoded.
    pub fn merge(&mut self, rows: impl IntoIterator<Item = i32>) {
        self.rows.extend(rows);
    }

    /// Whether row `y` is decoded.
    pub fn contains(&self, y: i32) -> bool {
        self.rows.contains(&y)
    }

    /// Decoded rows, ascending.
    pub fn rows(&self) -> impl Iterator<Item = i32> + '_ {
        self.rows.iter().copied()
    }

    /// Number of decoded rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when no row is decoded.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct PendingDecode {
    handle: JoinHandle<PlayheadResult<DecodedImage>>,
    rows: Option<Vec<i32>>,
}

/// One decoded (or decoding) frame of a [`DecodeBuffer`].
pub struct DecodedFrameDescriptor {
    frame: FrameIndex,
    mode: DecodeMode,
    info: FrameInfo,
    image: Option<Arc<DecodedImage>>,
    pending: Option<PendingDecode>,
    scanlines: Option<ScanLineContext>,
}

impl std::fmt::Debug for DecodedFrameDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedFrameDescriptor")
            .field("frame", &self.frame)
            .field("mode", &self.mode)
            .field("pending", &self.pending.is_some())
            .field("rows", &self.image.as_ref().map(|i| i.row_count()))
            .finish()
    }
}

impl DecodedFrameDescriptor {
    fn new(frame: FrameIndex, mode: DecodeMode, info: FrameInfo) -> Self {
        Self {
            frame,
            mode,
            info,
            image: None,
            pending: None,
            scanlines: (mode == DecodeMode::ScanLines).then(ScanLineContext::default),
        }
    }

    /// Frame number.
    pub fn frame(&self) -> FrameIndex {
        self.frame
    }

    /// Decode mode.
    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Frame header.
    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    /// `true` while an async decode has not been joined.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Decoded rows of a scan-line descriptor.
    pub fn scanlines(&self) -> Option<&ScanLineContext> {
        self.scanlines.as_ref()
    }

    /// Decoded data, if any has been joined.
    pub fn image(&self) -> Option<&Arc<DecodedImage>> {
        self.image.as_ref()
    }

    /// Join an outstanding async decode and fold its rows in.
    fn resolve(&mut self) -> PlayheadResult<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let decoded = pending
            .handle
            .join()
            .map_err(|_| PlayheadError::decode(format!("decode thread for frame {} panicked", self.frame)))??;
        self.absorb(decoded, pending.rows);
        Ok(())
    }

    fn absorb(&mut self, decoded: DecodedImage, rows: Option<Vec<i32>>) {
        if let Some(ctx) = &mut self.scanlines {
            ctx.merge(rows.unwrap_or_else(|| decoded.row_numbers().collect()));
        }
        match &mut self.image {
            Some(image) => Arc::make_mut(image).merge(decoded),
            None => self.image = Some(Arc::new(decoded)),
        }
    }
}

/// Decode counters of one buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Decodes run on the caller's thread.
    pub sync_decodes: u64,
    /// Decodes run on worker threads.
    pub async_decodes: u64,
    /// Rows requested from the reader.
    pub rows_requested: u64,
    /// Wanted rows that were already decoded.
    pub rows_reused: u64,
    /// Descriptors evicted for space.
    pub evictions: u64,
}

/// Bounded queue of recently decoded frames for one reader.
///
/// Scan-line readers decode only rows that are newly visible; other readers decode whole
/// frames. Async requests run on a named thread and are joined on first access.
pub struct DecodeBuffer {
    reader: Arc<dyn FrameReader>,
    capacity: usize,
    entries: VecDeque<DecodedFrameDescriptor>,
    stats: DecodeStats,
}

impl std::fmt::Debug for DecodeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeBuffer")
            .field("reader", &self.reader.name())
            .field("capacity", &self.capacity)
            .field("entries", &self.entries)
            .finish()
    }
}

impl DecodeBuffer {
    /// Buffer holding at most `capacity` descriptors (at least one).
    pub fn new(reader: Arc<dyn FrameReader>, capacity: usize) -> Self {
        Self {
            reader,
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            stats: DecodeStats::default(),
        }
    }

    /// The reader this buffer decodes from.
    pub fn reader(&self) -> &Arc<dyn FrameReader> {
        &self.reader
    }

    /// Descriptors held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum descriptors held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counters.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Descriptor for `frame` created after a frame-cache hit.
    pub fn find_cached(&self, frame: FrameIndex) -> Option<&DecodedFrameDescriptor> {
        self.position(frame, DecodeMode::CachedFrame)
            .map(|i| &self.entries[i])
    }

    /// Scan-line descriptor for `frame`.
    pub fn find_scanlines(&self, frame: FrameIndex) -> Option<&DecodedFrameDescriptor> {
        self.position(frame, DecodeMode::ScanLines)
            .map(|i| &self.entries[i])
    }

    /// Whole-frame descriptor for `frame`.
    pub fn find_whole(&self, frame: FrameIndex) -> Option<&DecodedFrameDescriptor> {
        self.position(frame, DecodeMode::WholeFrame)
            .map(|i| &self.entries[i])
    }

    /// Header of `frame`, from any descriptor before asking the reader.
    pub fn header(&self, frame: FrameIndex) -> PlayheadResult<FrameInfo> {
        if let Some(d) = self.entries.iter().find(|d| d.frame == frame) {
            return Ok(d.info);
        }
        self.reader.info(frame)
    }

    /// Remember that `frame` was served from the frame cache.
    pub fn register_cached(&mut self, frame: FrameIndex, info: FrameInfo) {
        if self.entries.iter().any(|d| d.frame == frame) {
            return;
        }
        if self.make_room().is_err() {
            return;
        }
        self.entries
            .push_back(DecodedFrameDescriptor::new(frame, DecodeMode::CachedFrame, info));
    }

    /// Make the given rows of `frame` available, decoding only what is missing.
    ///
    /// `rows = None` (or a reader without scan-line support) decodes the whole frame.
    pub fn request(
        &mut self,
        frame: FrameIndex,
        rows: Option<&[i32]>,
        sync: DecodeSync,
    ) -> PlayheadResult<()> {
        match rows {
            Some(rows) if self.reader.supports_scanlines() => {
                self.request_scanlines(frame, rows, sync)
            }
            _ => self.request_whole(frame, sync),
        }
    }

    /// Start decoding `frame` in the background unless it is already buffered.
    pub fn prefetch(&mut self, frame: FrameIndex, rows: Option<&[i32]>) -> PlayheadResult<()> {
        let buffered = match rows {
            Some(_) if self.reader.supports_scanlines() => {
                self.position(frame, DecodeMode::ScanLines).is_some()
            }
            _ => self.position(frame, DecodeMode::WholeFrame).is_some(),
        };
        if buffered || !self.reader.frame_range().contains(frame) {
            return Ok(());
        }
        tracing::debug!(reader = self.reader.name(), frame = frame.0, "prefetch");
        self.request(frame, rows, DecodeSync::Async)
    }

    /// Decoded data of `frame`, joining a pending decode first.
    pub fn image(&mut self, frame: FrameIndex) -> PlayheadResult<Option<Arc<DecodedImage>>> {
        let Some(i) = self
            .position(frame, DecodeMode::ScanLines)
            .or_else(|| self.position(frame, DecodeMode::WholeFrame))
        else {
            return Ok(None);
        };
        let entry = &mut self.entries[i];
        entry.resolve()?;
        Ok(entry.image.clone())
    }

    /// Drop every descriptor. Running decodes finish detached.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, frame: FrameIndex, mode: DecodeMode) -> Option<usize> {
        self.entries
            .iter()
            .position(|d| d.frame == frame && d.mode == mode)
    }

    fn request_scanlines(
        &mut self,
        frame: FrameIndex,
        rows: &[i32],
        sync: DecodeSync,
    ) -> PlayheadResult<()> {
        let i = match self.position(frame, DecodeMode::ScanLines) {
            Some(i) => i,
            None => {
                let info = self.header(frame)?;
                self.make_room()?;
                self.entries
                    .push_back(DecodedFrameDescriptor::new(frame, DecodeMode::ScanLines, info));
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[i];
        entry.resolve()?;
        let missing = entry
            .scanlines
            .as_ref()
            .map(|ctx| ctx.missing(rows))
            .unwrap_or_default();
        let wanted = rows.iter().collect::<BTreeSet<_>>().len();
        self.stats.rows_reused += (wanted - missing.len()) as u64;
        if missing.is_empty() {
            return Ok(());
        }
        self.stats.rows_requested += missing.len() as u64;

        match sync {
            DecodeSync::Sync => {
                self.stats.sync_decodes += 1;
                let decoded = self.reader.decode_rows(frame, &missing)?;
                self.entries[i].absorb(decoded, Some(missing));
            }
            DecodeSync::Async => {
                self.stats.async_decodes += 1;
                let handle = spawn_decode(Arc::clone(&self.reader), frame, Some(missing.clone()))?;
                self.entries[i].pending = Some(PendingDecode {
                    handle,
                    rows: Some(missing),
                });
            }
        }
        Ok(())
    }

    fn request_whole(&mut self, frame: FrameIndex, sync: DecodeSync) -> PlayheadResult<()> {
        if self.position(frame, DecodeMode::WholeFrame).is_some() {
            return Ok(());
        }
        let info = self.header(frame)?;
        self.make_room()?;
        let mut entry = DecodedFrameDescriptor::new(frame, DecodeMode::WholeFrame, info);
        match sync {
            DecodeSync::Sync => {
                self.stats.sync_decodes += 1;
                entry.absorb(self.reader.decode_frame(frame)?, None);
            }
            DecodeSync::Async => {
                self.stats.async_decodes += 1;
                let handle = spawn_decode(Arc::clone(&self.reader), frame, None)?;
                entry.pending = Some(PendingDecode { handle, rows: None });
            }
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Evict one descriptor if full: oldest completed fresh decode, then oldest cached-frame
    /// descriptor, otherwise wait for the oldest pending decode and drop it.
    fn make_room(&mut self) -> PlayheadResult<()> {
        if self.entries.len() < self.capacity {
            return Ok(());
        }
        let victim = self
            .entries
            .iter()
            .position(|d| !d.is_pending() && d.mode != DecodeMode::CachedFrame)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|d| !d.is_pending() && d.mode == DecodeMode::CachedFrame)
            });
        let evicted = match victim {
            Some(i) => self.entries.remove(i),
            None => {
                let oldest = self.entries.pop_front();
                if let Some(mut d) = oldest {
                    if let Err(e) = d.resolve() {
                        tracing::warn!(frame = d.frame.0, error = %e, "evicted decode failed");
                    }
                    Some(d)
                } else {
                    None
                }
            }
        };
        if let Some(d) = evicted {
            self.stats.evictions += 1;
            tracing::debug!(
                reader = self.reader.name(),
                frame = d.frame.0,
                mode = ?d.mode,
                "decode descriptor evicted"
            );
        }
        Ok(())
    }
}

fn spawn_decode(
    reader: Arc<dyn FrameReader>,
    frame: FrameIndex,
    rows: Option<Vec<i32>>,
) -> PlayheadResult<JoinHandle<PlayheadResult<DecodedImage>>> {
    std::thread::Builder::new()
        .name(format!("playhead-decode-{}", frame.0))
        .spawn(move || match rows {
            Some(rows) => reader.decode_rows(frame, &rows),
            None => reader.decode_frame(frame),
        })
        .map_err(|e| PlayheadError::decode(format!("spawn decode thread: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/decode/buffer.rs"]
mod tests;
