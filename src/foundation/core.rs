use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::foundation::error::{PlayheadError, PlayheadResult};

/// Absolute frame number on a source timeline. Sources may start at any frame, negative included.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct FrameIndex(pub i64);

impl FrameIndex {
    /// The following frame.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The preceding frame.
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive frame range `[first, last]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// First frame of the range.
    pub first: FrameIndex,
    /// Last frame of the range, inclusive.
    pub last: FrameIndex,
}

impl FrameRange {
    /// Build a range, rejecting `first > last`.
    pub fn new(first: FrameIndex, last: FrameIndex) -> PlayheadResult<Self> {
        if first.0 > last.0 {
            return Err(PlayheadError::validation(format!(
                "FrameRange first ({first}) must be <= last ({last})"
            )));
        }
        Ok(Self { first, last })
    }

    /// A range holding exactly one frame.
    pub fn single(frame: FrameIndex) -> Self {
        Self {
            first: frame,
            last: frame,
        }
    }

    /// Number of frames in the range.
    pub fn len_frames(self) -> u64 {
        self.last.0.abs_diff(self.first.0).saturating_add(1)
    }

    /// `true` when `first == last`.
    pub fn is_single(self) -> bool {
        self.first == self.last
    }

    /// Whether `f` lies inside the range.
    pub fn contains(self, f: FrameIndex) -> bool {
        self.first.0 <= f.0 && f.0 <= self.last.0
    }

    /// Clamp `f` into the range.
    pub fn clamp(self, f: FrameIndex) -> FrameIndex {
        FrameIndex(f.0.clamp(self.first.0, self.last.0))
    }

    /// Smallest range covering both inputs.
    pub fn union(self, other: Self) -> Self {
        Self {
            first: FrameIndex(self.first.0.min(other.first.0)),
            last: FrameIndex(self.last.0.max(other.last.0)),
        }
    }
}

/// Rational frame rate, as used for playback timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator.
    pub num: u32,
    /// Denominator, must be > 0.
    pub den: u32,
}

impl Fps {
    /// Build a frame rate, rejecting zero terms.
    pub fn new(num: u32, den: u32) -> PlayheadResult<Self> {
        if den == 0 {
            return Err(PlayheadError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(PlayheadError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Frames per second as a float.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Wall-clock time allotted to one frame.
    pub fn frame_duration(self) -> Duration {
        if self.num == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(f64::from(self.den) / f64::from(self.num))
    }
}

/// Integer pixel rectangle covering columns `[x, r)` and rows `[y, t)`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct RectI {
    /// Left edge, inclusive.
    pub x: i32,
    /// Bottom row, inclusive.
    pub y: i32,
    /// Right edge, exclusive.
    pub r: i32,
    /// Top row, exclusive.
    pub t: i32,
}

impl RectI {
    /// Build a rectangle from its edges.
    pub const fn new(x: i32, y: i32, r: i32, t: i32) -> Self {
        Self { x, y, r, t }
    }

    /// Rectangle anchored at the origin.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            r: width as i32,
            t: height as i32,
        }
    }

    /// Column count, zero when inverted.
    pub fn width(self) -> u32 {
        if self.r > self.x {
            self.r.abs_diff(self.x)
        } else {
            0
        }
    }

    /// Row count, zero when inverted.
    pub fn height(self) -> u32 {
        if self.t > self.y {
            self.t.abs_diff(self.y)
        } else {
            0
        }
    }

    /// No pixels covered.
    pub fn is_empty(self) -> bool {
        self.r <= self.x || self.t <= self.y
    }

    /// Whether row `y` falls inside.
    pub fn contains_row(self, y: i32) -> bool {
        self.y <= y && y < self.t
    }

    /// Whether column `x` falls inside.
    pub fn contains_column(self, x: i32) -> bool {
        self.x <= x && x < self.r
    }

    /// Overlap of two rectangles, possibly empty.
    pub fn intersect(self, other: Self) -> Self {
        let out = Self {
            x: self.x.max(other.x),
            y: self.y.max(other.y),
            r: self.r.min(other.r),
            t: self.t.min(other.t),
        };
        if out.is_empty() { Self::default() } else { out }
    }

    /// Bounding box of two rectangles. Empty inputs are ignored.
    pub fn union(self, other: Self) -> Self {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other,
            (_, true) => self,
            _ => Self {
                x: self.x.min(other.x),
                y: self.y.min(other.y),
                r: self.r.max(other.r),
                t: self.t.max(other.t),
            },
        }
    }
}

/// Nominal frame format (the display window) plus pixel aspect ratio.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct Format {
    /// Display window.
    pub window: RectI,
    /// Pixel aspect ratio.
    pub pixel_aspect: f64,
}

impl Format {
    /// Square-pixel format of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            window: RectI::from_size(width, height),
            pixel_aspect: 1.0,
        }
    }

    /// Display window width.
    pub fn width(&self) -> u32 {
        self.window.width()
    }

    /// Display window height.
    pub fn height(&self) -> u32 {
        self.window.height()
    }
}

impl PartialEq for Format {
    fn eq(&self, other: &Self) -> bool {
        self.window == other.window && self.pixel_aspect.to_bits() == other.pixel_aspect.to_bits()
    }
}

impl Eq for Format {}

impl Hash for Format {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.window.hash(state);
        self.pixel_aspect.to_bits().hash(state);
    }
}

bitflags::bitflags! {
    /// Set of colour channels a node produces or a viewer requests.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ChannelSet: u8 {
        /// Red.
        const RED = 1;
        /// Green.
        const GREEN = 1 << 1;
        /// Blue.
        const BLUE = 1 << 2;
        /// Alpha.
        const ALPHA = 1 << 3;
        /// Colour channels only.
        const RGB = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        /// Every channel.
        const RGBA = Self::RGB.bits() | Self::ALPHA.bits();
    }
}

impl ChannelSet {
    /// Interleaved sample offsets (0..4) of the channels in the set.
    pub fn offsets(self) -> impl Iterator<Item = usize> {
        [Self::RED, Self::GREEN, Self::BLUE, Self::ALPHA]
            .into_iter()
            .enumerate()
            .filter(move |(_, c)| self.contains(*c))
            .map(|(i, _)| i)
    }
}

/// Display transfer function applied after exposure.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LutId {
    /// No transfer.
    #[default]
    Linear,
    /// sRGB piecewise curve.
    Srgb,
    /// Rec.709 OETF.
    Rec709,
}

impl LutId {
    /// Stable numeric id used in cache keys and the index file.
    pub fn id(self) -> u8 {
        match self {
            Self::Linear => 0,
            Self::Srgb => 1,
            Self::Rec709 => 2,
        }
    }

    /// Inverse of [`LutId::id`].
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Linear),
            1 => Some(Self::Srgb),
            2 => Some(Self::Rec709),
            _ => None,
        }
    }

    /// Map a linear value through the curve.
    pub fn apply(self, v: f32) -> f32 {
        match self {
            Self::Linear => v,
            Self::Srgb => {
                if v <= 0.003_130_8 {
                    v * 12.92
                } else {
                    1.055 * v.powf(1.0 / 2.4) - 0.055
                }
            }
            Self::Rec709 => {
                if v < 0.018 {
                    v * 4.5
                } else {
                    1.099 * v.powf(0.45) - 0.099
                }
            }
        }
    }
}

/// Pixel depth of transfer buffers and cached frames.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ByteMode {
    /// 8-bit RGBA.
    #[default]
    Byte,
    /// 32-bit float RGBA, little endian.
    Float,
}

impl ByteMode {
    /// Bytes per RGBA pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Byte => 4,
            Self::Float => 16,
        }
    }

    /// Stable numeric id used in cache keys and the index file.
    pub fn id(self) -> u8 {
        match self {
            Self::Byte => 0,
            Self::Float => 1,
        }
    }

    /// Inverse of [`ByteMode::id`].
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Byte),
            1 => Some(Self::Float),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
