use crate::foundation::core::{ByteMode, ChannelSet, Format, FrameIndex, LutId};
use crate::foundation::error::PlayheadResult;
use crate::render::viewport::Viewport;

/// Opaque id of a texture owned by a [`DisplaySurface`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(pub u64);

/// Image region covered by an uploaded texture and its size in texels.
///
/// `x..r` and `y..t` are the first and one-past-last visible image column and row; `w` and `h`
/// count the visible columns and rows, which differ from the spans when zoomed out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureRect {
    /// First visible column.
    pub x: i32,
    /// First visible row.
    pub y: i32,
    /// One past the last visible column.
    pub r: i32,
    /// One past the last visible row.
    pub t: i32,
    /// Texel columns.
    pub w: u32,
    /// Texel rows.
    pub h: u32,
}

impl TextureRect {
    /// Rect covering the given visible rows and columns. `None` if either is empty.
    pub fn from_visible(rows: &[i32], columns: &[i32]) -> Option<Self> {
        let (y, t) = (*rows.first()?, *rows.last()? + 1);
        let (x, r) = (*columns.first()?, *columns.last()? + 1);
        Some(Self {
            x,
            y,
            r,
            t,
            w: columns.len() as u32,
            h: rows.len() as u32,
        })
    }

    /// Buffer size for `mode`.
    pub fn byte_len(&self, mode: ByteMode) -> usize {
        self.w as usize * self.h as usize * mode.bytes_per_pixel()
    }
}

/// How computed pixels are converted for display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayParams {
    /// Exposure in stops.
    pub exposure: f32,
    /// Display transfer curve.
    pub lut: LutId,
    /// Output pixel depth.
    pub byte_mode: ByteMode,
    /// Channels shown.
    pub channels: ChannelSet,
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            lut: LutId::Srgb,
            byte_mode: ByteMode::Byte,
            channels: ChannelSet::RGBA,
        }
    }
}

/// Row-major staging buffer for one texture upload. Row `i` holds zoomed row `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferBuffer {
    rect: TextureRect,
    byte_mode: ByteMode,
    data: Vec<u8>,
}

impl TransferBuffer {
    /// Zero-filled buffer for `rect`.
    pub fn new(rect: TextureRect, byte_mode: ByteMode) -> Self {
        Self {
            rect,
            byte_mode,
            data: vec![0; rect.byte_len(byte_mode)],
        }
    }

    /// Covered region.
    pub fn rect(&self) -> TextureRect {
        self.rect
    }

    /// Pixel depth.
    pub fn byte_mode(&self) -> ByteMode {
        self.byte_mode
    }

    /// Bytes per buffer row.
    pub fn row_stride(&self) -> usize {
        self.rect.w as usize * self.byte_mode.bytes_per_pixel()
    }

    /// Raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable bytes of buffer row `i`.
    pub fn row_mut(&mut self, i: usize) -> Option<&mut [u8]> {
        let stride = self.row_stride();
        self.data.get_mut(i * stride..(i + 1) * stride)
    }
}

/// The viewer side of the engine: owns textures and shows frames.
///
/// All methods are called from the coordinating thread.
pub trait DisplaySurface {
    /// Current viewport.
    fn viewport(&self) -> Viewport;

    /// Current display conversion.
    fn display_params(&self) -> DisplayParams;

    /// Zoom and centre the viewport on `format`.
    fn fit_to_format(&mut self, format: &Format);

    /// Staging buffer for the next upload.
    fn allocate_transfer(&mut self, rect: TextureRect, byte_mode: ByteMode) -> TransferBuffer {
        TransferBuffer::new(rect, byte_mode)
    }

    /// Upload `buffer` into a new texture and show it as `frame`.
    fn upload(&mut self, frame: FrameIndex, buffer: &TransferBuffer) -> PlayheadResult<TextureHandle>;

    /// Show a texture kept from an earlier upload.
    fn show_texture(&mut self, frame: FrameIndex, texture: TextureHandle);

    /// Show frame-cache bytes laid out like a [`TransferBuffer`] for `rect`.
    fn show_cached_frame(
        &mut self,
        frame: FrameIndex,
        rect: TextureRect,
        byte_mode: ByteMode,
        bytes: &[u8],
    ) -> PlayheadResult<()>;

    /// Free textures evicted from the texture cache.
    fn release_textures(&mut self, textures: &[TextureHandle]);

    /// Timeline notification: `frame` is available from the frame cache.
    fn frame_cached(&mut self, _frame: FrameIndex) {}

    /// Measured playback rate.
    fn fps_changed(&mut self, _fps: f64) {}

    /// Playback started or stopped.
    fn playback_changed(&mut self, _playing: bool, _forward: bool) {}
}
