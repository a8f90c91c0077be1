//! Cache tiers of the playback core.
//!
//! - [`frame::FrameCache`]: finished frames on disk with a RAM-resident overlay, persisted
//!   across sessions through [`index_file`].
//! - [`texture::TextureCache`]: uploaded textures, keyed like frames plus the uploaded region.
//! - [`row::RowCache`]: rows of the frame currently being computed.

pub(crate) mod frame;
pub(crate) mod index_file;
pub(crate) mod lru;
pub(crate) mod row;
pub(crate) mod texture;
