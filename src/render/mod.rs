//! Display side of the engine: viewport mapping, the surface seam, and per-row evaluation.

pub(crate) mod headless;
pub(crate) mod rows;
pub(crate) mod sink;
pub(crate) mod surface;
pub(crate) mod viewport;
