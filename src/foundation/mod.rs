//! Shared value types, the crate error, and engine settings.

pub(crate) mod core;
pub(crate) mod error;
pub(crate) mod settings;
