//! Playhead is the playback and compute core of a node-based compositing viewer.
//!
//! Given a graph of processing nodes ending in a viewer, it shows a sequence of frames in real
//! time:
//!
//! - Build a [`NodeGraph`] and hand it to a [`PlaybackEngine`]
//! - Drive the engine with [`PlaybackEngine::poll`] or [`PlaybackEngine::run_until_idle`]
//! - Frames come from the [`FrameCache`], the [`TextureCache`], or fresh row evaluation on a
//!   worker pool, and land on a [`DisplaySurface`]
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod cache;
pub(crate) mod decode;
pub(crate) mod graph;
pub(crate) mod playback;
pub(crate) mod render;

pub use crate::foundation::core::{
    ByteMode, ChannelSet, Format, Fps, FrameIndex, FrameRange, LutId, RectI,
};
pub use crate::foundation::error::{PlayheadError, PlayheadResult};
pub use crate::foundation::settings::EngineSettings;

pub use crate::cache::frame::{
    CachedFrame, FrameCache, FrameCacheOpts, FrameCacheStats, FrameKey, SourceId,
};
pub use crate::cache::row::{Row, RowCache, RowCacheContext, RowCacheStats, RowPixels};
pub use crate::cache::texture::{TextureCache, TextureCacheStats, TextureKey};
pub use crate::decode::buffer::{
    DecodeBuffer, DecodeMode, DecodeStats, DecodeSync, DecodedFrameDescriptor, ScanLineContext,
};
pub use crate::decode::image_seq::ImageSequenceReader;
pub use crate::decode::reader::{DecodedImage, FrameInfo, FrameReader, ProceduralReader};
pub use crate::graph::dag::Dag;
pub use crate::graph::hash::{GraphHash, compute_graph_hash};
pub use crate::graph::node::{Node, NodeId, NodeKind, NodeOp, ReaderRef, WriterRef};
pub use crate::graph::store::NodeGraph;
pub use crate::playback::engine::{EngineCaches, PlaybackEngine, PlaybackStats};
pub use crate::playback::handle::PlaybackHandle;
pub use crate::playback::state::{EngineState, PlaybackState, Request, Timeline};
pub use crate::playback::timer::FpsTimer;
pub use crate::render::headless::{FrameSource, HeadlessSurface};
pub use crate::render::sink::{FrameSink, ImageSequenceSink, InMemorySink, SinkConfig};
pub use crate::render::surface::{
    DisplayParams, DisplaySurface, TextureHandle, TextureRect, TransferBuffer,
};
pub use crate::render::viewport::Viewport;
