use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::cache::row::{Row, RowPixels};
use crate::decode::reader::DecodedImage;
use crate::foundation::core::{ByteMode, FrameIndex, RectI};
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::graph::node::{NodeId, RowContext};
use crate::graph::store::NodeGraph;
use crate::render::surface::{DisplayParams, TransferBuffer};

/// Immutable inputs shared by every row of one frame.
pub(crate) struct FrameInputs {
    pub(crate) graph: Arc<NodeGraph>,
    pub(crate) sorted: Arc<[NodeId]>,
    pub(crate) positions: Arc<HashMap<NodeId, usize>>,
    pub(crate) images: HashMap<NodeId, Arc<DecodedImage>>,
    pub(crate) project: RectI,
}

/// One frame's worth of row work, dispatched to the worker pool.
pub(crate) struct FrameJob {
    pub(crate) generation: u64,
    pub(crate) frame: FrameIndex,
    pub(crate) inputs: FrameInputs,
    pub(crate) rows: Vec<Arc<Row>>,
    pub(crate) columns: Vec<i32>,
    pub(crate) display: DisplayParams,
    pub(crate) transfer: TransferBuffer,
    pub(crate) cancel: Arc<AtomicBool>,
}

/// Result of a [`FrameJob`], posted back to the coordinating thread.
pub(crate) struct JobOutcome {
    pub(crate) generation: u64,
    pub(crate) frame: FrameIndex,
    pub(crate) transfer: TransferBuffer,
    pub(crate) rows_computed: usize,
    pub(crate) rows_reused: usize,
    pub(crate) rows_failed: usize,
    pub(crate) cancelled: bool,
}

/// Evaluate every uncached row in parallel, then fill the transfer buffer.
///
/// Must run inside the engine's pool so `par_iter` uses its threads.
pub(crate) fn run_frame_job(job: FrameJob) -> JobOutcome {
    let FrameJob {
        generation,
        frame,
        inputs,
        rows,
        columns,
        display,
        mut transfer,
        cancel,
    } = job;

    let computed = AtomicUsize::new(0);
    let reused = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    rows.par_iter().for_each(|row| {
        if cancel.load(Ordering::Acquire) {
            return;
        }
        if row.is_cached() {
            reused.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match evaluate_row(&inputs, row) {
            Ok(()) => {
                row.mark_cached();
                computed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                row.pixels_mut().fill_zero();
                failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(frame = frame.0, y = row.y(), error = %e, "row evaluation failed");
            }
        }
    });

    let cancelled = cancel.load(Ordering::Acquire);
    if !cancelled {
        fill_transfer(&rows, &columns, &display, &mut transfer);
    }
    JobOutcome {
        generation,
        frame,
        transfer,
        rows_computed: computed.into_inner(),
        rows_reused: reused.into_inner(),
        rows_failed: failed.into_inner(),
        cancelled,
    }
}

/// Run every scheduled node over one row and store the output node's result in `row`.
pub(crate) fn evaluate_row(inputs: &FrameInputs, row: &Row) -> PlayheadResult<()> {
    let (x, r) = row.pixels().span();
    let mut scratch: Vec<Option<RowPixels>> = vec![None; inputs.sorted.len()];

    for (pos, id) in inputs.sorted.iter().enumerate() {
        let node = inputs
            .graph
            .node(*id)
            .ok_or_else(|| PlayheadError::graph(format!("scheduled node {id} missing")))?;
        let channels = node.produced_channels() & node.requested_channels() & row.channels();
        let parents: smallvec::SmallVec<[Option<&RowPixels>; 2]> = node
            .inputs()
            .iter()
            .map(|slot| {
                slot.and_then(|p| inputs.positions.get(&p))
                    .and_then(|pp| scratch[*pp].as_ref())
            })
            .collect();

        let mut out = RowPixels::zeroed(x, r);
        if channels.is_empty() {
            tracing::debug!(node = node.name(), y = row.y(), "no channels to compute, skipped");
            if let Some(first) = parents.iter().flatten().next() {
                out.copy_from(first);
            }
        } else {
            let ctx = RowContext {
                y: row.y(),
                channels,
                project: inputs.project,
                decoded: inputs.images.get(id).map(|i| &**i),
            };
            node.evaluate_row(&ctx, &parents, &mut out)?;
        }
        drop(parents);
        scratch[pos] = Some(out);
    }

    let Some(result) = scratch.pop().flatten() else {
        return Ok(());
    };
    row.pixels_mut().copy_from(&result);
    Ok(())
}

/// Convert the visible columns of every row into display bytes at its zoomed row.
pub(crate) fn fill_transfer(
    rows: &[Arc<Row>],
    columns: &[i32],
    display: &DisplayParams,
    transfer: &mut TransferBuffer,
) {
    let bpp = transfer.byte_mode().bytes_per_pixel();
    let mode = transfer.byte_mode();
    for row in rows {
        let pixels = row.pixels();
        let Some(dst) = transfer.row_mut(row.zoomed_y()) else {
            continue;
        };
        for (c, x) in columns.iter().enumerate() {
            let px = pixels.pixel(*x).unwrap_or([0.0; 4]);
            encode_pixel(px, display, mode, &mut dst[c * bpp..(c + 1) * bpp]);
        }
    }
}

/// Apply exposure, channel selection and the display curve, then pack into `out`.
pub(crate) fn encode_pixel(px: [f32; 4], display: &DisplayParams, mode: ByteMode, out: &mut [u8]) {
    let gain = 2f32.powf(display.exposure);
    let mut v = [0.0, 0.0, 0.0, 1.0];
    for c in display.channels.offsets() {
        v[c] = if c < 3 {
            display.lut.apply(px[c] * gain)
        } else {
            px[c]
        };
    }
    match mode {
        ByteMode::Byte => {
            for (o, s) in out.iter_mut().zip(v) {
                *o = (s.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
        ByteMode::Float => {
            for (o, s) in out.chunks_exact_mut(4).zip(v) {
                o.copy_from_slice(&s.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/rows.rs"]
mod tests;
