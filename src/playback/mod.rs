//! The playback state machine and its control surface.
//!
//! [`engine::PlaybackEngine`] owns the coordinating loop. Each shown frame goes through the
//! frame cache, the texture cache, or fresh row evaluation on the worker pool, in that order.

pub(crate) mod engine;
pub(crate) mod handle;
pub(crate) mod state;
pub(crate) mod timer;
