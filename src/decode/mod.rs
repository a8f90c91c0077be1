//! Frame sources and per-source decode buffering.

pub(crate) mod buffer;
pub(crate) mod image_seq;
pub(crate) mod reader;
