use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::cache::row::RowPixels;
use crate::decode::reader::{DecodedImage, FrameReader};
use crate::foundation::core::{ChannelSet, FrameRange, LutId, RectI};
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::render::sink::FrameSink;
use crate::render::surface::DisplayParams;

/// Index of a node inside a [`crate::NodeGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Role of a node in the scheduling graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Source of pixels (reader or generator).
    Input,
    /// Transforms its inputs.
    Filter,
    /// Terminal node: shown by the viewer or written to a sink.
    Output,
}

/// Shared handle to an external frame source.
#[derive(Clone)]
pub struct ReaderRef(pub Arc<dyn FrameReader>);

impl fmt::Debug for ReaderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReaderRef").field(&self.0.name()).finish()
    }
}

/// Terminal writer: where frames go, which frames, and how they are encoded.
#[derive(Clone)]
pub struct WriterRef {
    name: String,
    range: Option<FrameRange>,
    encoding: DisplayParams,
    sink: Arc<Mutex<dyn FrameSink>>,
}

impl WriterRef {
    /// Writer over the inputs' range, encoding linear 8-bit RGBA.
    pub fn new<S: FrameSink + 'static>(name: impl Into<String>, sink: Arc<Mutex<S>>) -> Self {
        Self {
            name: name.into(),
            range: None,
            encoding: DisplayParams {
                lut: LutId::Linear,
                ..DisplayParams::default()
            },
            sink,
        }
    }

    /// Restrict writing to `range`.
    pub fn with_range(mut self, range: FrameRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Override exposure, curve, depth and channels of the written bytes.
    pub fn with_encoding(mut self, encoding: DisplayParams) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Frames to write. `None` follows the inputs.
    pub fn range(&self) -> Option<FrameRange> {
        self.range
    }

    pub fn encoding(&self) -> DisplayParams {
        self.encoding
    }

    pub(crate) fn sink(&self) -> &Arc<Mutex<dyn FrameSink>> {
        &self.sink
    }
}

impl fmt::Debug for WriterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterRef")
            .field("name", &self.name)
            .field("range", &self.range)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

/// Operation a node performs on one row.
#[derive(Clone, Debug)]
pub enum NodeOp {
    /// Pulls rows from an external reader.
    Reader(ReaderRef),
    /// Solid colour over the project format.
    Constant {
        /// Straight RGBA value.
        rgba: [f32; 4],
    },
    /// Per-channel multiply of input 0.
    Gain {
        /// Per-channel factors.
        rgba: [f32; 4],
    },
    /// Premultiplied `A over B` with A on input 0 and B on input 1.
    Over,
    /// Passes input 0 to the display.
    Viewer,
    /// Renders input 0 frame by frame into a [`FrameSink`].
    Writer(WriterRef),
}

impl NodeOp {
    /// Reader op from any [`FrameReader`].
    pub fn reader(reader: Arc<dyn FrameReader>) -> Self {
        Self::Reader(ReaderRef(reader))
    }

    /// Scheduling role of the op.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Reader(_) | Self::Constant { .. } => NodeKind::Input,
            Self::Gain { .. } | Self::Over => NodeKind::Filter,
            Self::Viewer | Self::Writer(_) => NodeKind::Output,
        }
    }

    /// Number of input slots.
    pub fn max_inputs(&self) -> usize {
        match self {
            Self::Reader(_) | Self::Constant { .. } => 0,
            Self::Gain { .. } | Self::Viewer | Self::Writer(_) => 1,
            Self::Over => 2,
        }
    }

    /// The attached writer, if any.
    pub fn writer(&self) -> Option<&WriterRef> {
        match self {
            Self::Writer(w) => Some(w),
            _ => None,
        }
    }

    /// The attached reader, if any.
    pub fn frame_reader(&self) -> Option<&Arc<dyn FrameReader>> {
        match self {
            Self::Reader(r) => Some(&r.0),
            _ => None,
        }
    }
}

/// Per-row evaluation inputs shared by every node of a frame.
pub(crate) struct RowContext<'a> {
    pub(crate) y: i32,
    pub(crate) channels: ChannelSet,
    pub(crate) project: RectI,
    pub(crate) decoded: Option<&'a DecodedImage>,
}

/// A processing node: an op, its channel sets, and its ordered input slots.
#[derive(Clone, Debug)]
pub struct Node {
    name: String,
    op: NodeOp,
    produced: ChannelSet,
    requested: ChannelSet,
    inputs: SmallVec<[Option<NodeId>; 2]>,
    children: SmallVec<[NodeId; 4]>,
}

impl Node {
    /// New node producing and requesting every channel.
    pub fn new(name: impl Into<String>, op: NodeOp) -> Self {
        let slots = op.max_inputs();
        Self {
            name: name.into(),
            op,
            produced: ChannelSet::RGBA,
            requested: ChannelSet::RGBA,
            inputs: SmallVec::from_elem(None, slots),
            children: SmallVec::new(),
        }
    }

    /// Override the produced and requested channel sets.
    pub fn with_channels(mut self, produced: ChannelSet, requested: ChannelSet) -> Self {
        self.produced = produced;
        self.requested = requested;
        self
    }

    /// Display name, unique by convention.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's op.
    pub fn op(&self) -> &NodeOp {
        &self.op
    }

    /// Scheduling role.
    pub fn kind(&self) -> NodeKind {
        self.op.kind()
    }

    /// Channels this node writes.
    pub fn produced_channels(&self) -> ChannelSet {
        self.produced
    }

    /// Channels this node needs from its inputs.
    pub fn requested_channels(&self) -> ChannelSet {
        self.requested
    }

    /// Input slots in order. `None` marks a disconnected slot.
    pub fn inputs(&self) -> &[Option<NodeId>] {
        &self.inputs
    }

    /// Connected parents in slot order.
    pub fn parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().filter_map(|slot| *slot)
    }

    /// Nodes consuming this node.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Stable hash of the node's own parameters, ignoring its connections.
    pub fn content_hash(&self) -> u64 {
        crate::graph::hash::node_content_hash(self)
    }

    pub(crate) fn set_op(&mut self, op: NodeOp) {
        self.op = op;
    }

    pub(crate) fn set_input(&mut self, slot: usize, parent: Option<NodeId>) -> Option<NodeId> {
        std::mem::replace(&mut self.inputs[slot], parent)
    }

    pub(crate) fn add_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: NodeId) {
        self.children.retain(|c| *c != child);
    }

    /// Compute this node's pixels for one row.
    ///
    /// `inputs` holds the parents' rows in slot order; `out` covers the same span and is
    /// zeroed by the caller. Only channels in `ctx.channels` are written.
    pub(crate) fn evaluate_row(
        &self,
        ctx: &RowContext<'_>,
        inputs: &[Option<&RowPixels>],
        out: &mut RowPixels,
    ) -> PlayheadResult<()> {
        let input = |slot: usize| inputs.get(slot).copied().flatten();
        match &self.op {
            NodeOp::Reader(reader) => {
                let Some(image) = ctx.decoded else {
                    return Err(PlayheadError::decode(format!(
                        "reader '{}' has no decoded data for row {}",
                        reader.0.name(),
                        ctx.y
                    )));
                };
                let data = image.info().data;
                let Some(src) = image.row(ctx.y) else {
                    return Ok(());
                };
                let (x0, r0) = out.span();
                for x in x0.max(data.x)..r0.min(data.r) {
                    let base = (x - data.x) as usize * 4;
                    let Some(px) = src.get(base..base + 4) else {
                        break;
                    };
                    out.set_channels(x, px, ctx.channels);
                }
            }
            NodeOp::Constant { rgba } => {
                if ctx.project.contains_row(ctx.y) {
                    let a = rgba[3];
                    let premul = [rgba[0] * a, rgba[1] * a, rgba[2] * a, a];
                    let (x0, r0) = out.span();
                    for x in x0.max(ctx.project.x)..r0.min(ctx.project.r) {
                        out.set_channels(x, &premul, ctx.channels);
                    }
                }
            }
            NodeOp::Gain { rgba } => {
                if let Some(src) = input(0) {
                    out.copy_from(src);
                    for px in out.data_mut().chunks_exact_mut(4) {
                        for c in ctx.channels.offsets() {
                            px[c] *= rgba[c];
                        }
                    }
                }
            }
            NodeOp::Over => {
                let (a, b) = (input(0), input(1));
                match (a, b) {
                    (Some(a), Some(b)) => {
                        let dst = out.data_mut();
                        for ((o, pa), pb) in dst
                            .chunks_exact_mut(4)
                            .zip(a.data().chunks_exact(4))
                            .zip(b.data().chunks_exact(4))
                        {
                            let inv = 1.0 - pa[3];
                            for c in ctx.channels.offsets() {
                                o[c] = pa[c] + pb[c] * inv;
                            }
                        }
                    }
                    (Some(only), None) | (None, Some(only)) => out.copy_from(only),
                    (None, None) => {}
                }
            }
            NodeOp::Viewer | NodeOp::Writer(_) => {
                if let Some(src) = input(0) {
                    out.copy_from(src);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/node.rs"]
mod tests;
