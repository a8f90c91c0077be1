use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::foundation::core::{ChannelSet, Format, FrameIndex};
use crate::graph::hash::GraphHash;

/// Interleaved RGBA `f32` samples for columns `[x, r)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RowPixels {
    x: i32,
    r: i32,
    data: Vec<f32>,
}

impl RowPixels {
    /// Transparent black span.
    pub fn zeroed(x: i32, r: i32) -> Self {
        let width = r.saturating_sub(x).max(0) as usize;
        Self {
            x,
            r: x + width as i32,
            data: vec![0.0; width * 4],
        }
    }

    /// `(x, r)` column span.
    pub fn span(&self) -> (i32, i32) {
        (self.x, self.r)
    }

    /// Number of pixels.
    pub fn width(&self) -> usize {
        self.data.len() / 4
    }

    /// Raw samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Raw samples, mutable.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// RGBA at column `x`, `None` outside the span.
    pub fn pixel(&self, x: i32) -> Option<[f32; 4]> {
        if x < self.x || x >= self.r {
            return None;
        }
        let i = (x - self.x) as usize * 4;
        let p = self.data.get(i..i + 4)?;
        Some([p[0], p[1], p[2], p[3]])
    }

    /// Write the selected channels of `px` at column `x`.
    pub(crate) fn set_channels(&mut self, x: i32, px: &[f32], channels: ChannelSet) {
        if x < self.x || x >= self.r {
            return;
        }
        let i = (x - self.x) as usize * 4;
        for c in channels.offsets() {
            if let Some(v) = px.get(c) {
                self.data[i + c] = *v;
            }
        }
    }

    /// Copy the overlapping columns of `other`.
    pub(crate) fn copy_from(&mut self, other: &RowPixels) {
        if self.span() == other.span() {
            self.data.copy_from_slice(&other.data);
            return;
        }
        let lo = self.x.max(other.x);
        let hi = self.r.min(other.r);
        if lo >= hi {
            return;
        }
        let n = (hi - lo) as usize * 4;
        let dst = (lo - self.x) as usize * 4;
        let src = (lo - other.x) as usize * 4;
        self.data[dst..dst + n].copy_from_slice(&other.data[src..src + n]);
    }

    pub(crate) fn fill_zero(&mut self) {
        self.data.fill(0.0);
    }
}

/// One output row of the current frame, shared between the coordinator and the workers.
#[derive(Debug)]
pub struct Row {
    y: i32,
    channels: ChannelSet,
    zoomed_y: AtomicUsize,
    pixels: RwLock<RowPixels>,
    cached: AtomicBool,
}

impl Row {
    pub(crate) fn new(y: i32, x: i32, r: i32, zoomed_y: usize, channels: ChannelSet) -> Self {
        Self {
            y,
            channels,
            zoomed_y: AtomicUsize::new(zoomed_y),
            pixels: RwLock::new(RowPixels::zeroed(x, r)),
            cached: AtomicBool::new(false),
        }
    }

    /// Image row number.
    pub fn y(&self) -> i32 {
        self.y
    }

    /// Channels computed for this row.
    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    /// Destination row inside the transfer buffer.
    pub fn zoomed_y(&self) -> usize {
        self.zoomed_y.load(Ordering::Acquire)
    }

    pub(crate) fn set_zoomed_y(&self, v: usize) {
        self.zoomed_y.store(v, Ordering::Release);
    }

    /// `true` once the row holds final pixels for its context.
    pub fn is_cached(&self) -> bool {
        self.cached.load(Ordering::Acquire)
    }

    pub(crate) fn mark_cached(&self) {
        self.cached.store(true, Ordering::Release);
    }

    /// Read access to the pixels.
    pub fn pixels(&self) -> RwLockReadGuard<'_, RowPixels> {
        self.pixels.read()
    }

    pub(crate) fn pixels_mut(&self) -> RwLockWriteGuard<'_, RowPixels> {
        self.pixels.write()
    }
}

/// Everything a cached row depends on besides its row number.
#[derive(Clone, Debug, PartialEq)]
pub struct RowCacheContext {
    /// Frame the rows belong to.
    pub frame: FrameIndex,
    /// Graph identity.
    pub graph_hash: GraphHash,
    /// Viewer zoom.
    pub zoom: f64,
    /// Display window of the output.
    pub display_window: Format,
    /// Computed column span.
    pub span: (i32, i32),
    /// Computed channels.
    pub channels: ChannelSet,
}

/// Hit and miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowCacheStats {
    /// Lookups that returned an existing row.
    pub hits: u64,
    /// Lookups that created a row.
    pub misses: u64,
    /// Number of clears.
    pub clears: u64,
}

#[derive(Default)]
struct RowCacheInner {
    context: Option<RowCacheContext>,
    rows: HashMap<i32, Arc<Row>>,
    stats: RowCacheStats,
}

/// Rows of the frame being displayed, keyed by row number under one [`RowCacheContext`].
///
/// Rebinding to a different context drops every row. Lookups are thread-safe.
#[derive(Default)]
pub struct RowCache {
    inner: Mutex<RowCacheInner>,
}

impl RowCache {
    /// Empty cache with no context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `ctx`. Returns `true` when the previous rows were dropped.
    pub fn prepare(&self, ctx: &RowCacheContext) -> bool {
        let mut inner = self.inner.lock();
        if inner.context.as_ref() == Some(ctx) {
            return false;
        }
        inner.context = Some(ctx.clone());
        inner.rows.clear();
        inner.stats.clears += 1;
        true
    }

    /// Return the row for `y`, creating it under the current context on a miss.
    ///
    /// The boolean is `true` on a hit. A hit row is retargeted to `zoomed_y`.
    pub fn get_or_insert(&self, y: i32, zoomed_y: usize) -> (Arc<Row>, bool) {
        let mut inner = self.inner.lock();
        if let Some(row) = inner.rows.get(&y).cloned() {
            inner.stats.hits += 1;
            row.set_zoomed_y(zoomed_y);
            return (row, true);
        }
        let (x, r, channels) = match &inner.context {
            Some(ctx) => (ctx.span.0, ctx.span.1, ctx.channels),
            None => (0, 0, ChannelSet::empty()),
        };
        let row = Arc::new(Row::new(y, x, r, zoomed_y, channels));
        inner.rows.insert(y, Arc::clone(&row));
        inner.stats.misses += 1;
        (row, false)
    }

    /// Existing row for `y`.
    pub fn get(&self, y: i32) -> Option<Arc<Row>> {
        self.inner.lock().rows.get(&y).cloned()
    }

    /// Drop every row and the context.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.rows.clear();
        inner.context = None;
        inner.stats.clears += 1;
    }

    /// Number of rows held.
    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    /// `true` when no rows are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counters since creation.
    pub fn stats(&self) -> RowCacheStats {
        self.inner.lock().stats
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/row.rs"]
mod tests;
