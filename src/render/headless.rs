use std::collections::BTreeMap;

use crate::foundation::core::{ByteMode, Format, FrameIndex};
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::render::surface::{
    DisplayParams, DisplaySurface, TextureHandle, TextureRect, TransferBuffer,
};
use crate::render::viewport::Viewport;

/// Where a shown frame came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameSource {
    /// Freshly computed and uploaded.
    Rendered,
    /// Read back from the frame cache.
    FrameCache,
    /// Reused texture.
    TextureCache,
}

/// In-memory [`DisplaySurface`] that records what it is asked to do.
#[derive(Debug)]
pub struct HeadlessSurface {
    viewport: Viewport,
    params: DisplayParams,
    textures: BTreeMap<TextureHandle, (TextureRect, ByteMode, Vec<u8>)>,
    next_texture: u64,
    shown: Vec<(FrameIndex, FrameSource)>,
    last_image: Option<(TextureRect, ByteMode, Vec<u8>)>,
    cached: Vec<FrameIndex>,
    fps_readouts: Vec<f64>,
    playback_events: Vec<bool>,
    released: usize,
}

impl HeadlessSurface {
    /// Surface with the given viewport and default display parameters.
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            params: DisplayParams::default(),
            textures: BTreeMap::new(),
            next_texture: 1,
            shown: Vec::new(),
            last_image: None,
            cached: Vec::new(),
            fps_readouts: Vec::new(),
            playback_events: Vec::new(),
            released: 0,
        }
    }

    /// Replace the display parameters.
    pub fn with_params(mut self, params: DisplayParams) -> Self {
        self.params = params;
        self
    }

    /// Mutable viewport, for zoom and pan changes.
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    /// Mutable display parameters.
    pub fn params_mut(&mut self) -> &mut DisplayParams {
        &mut self.params
    }

    /// Every shown frame in order.
    pub fn shown(&self) -> &[(FrameIndex, FrameSource)] {
        &self.shown
    }

    /// Shown frame numbers in order.
    pub fn shown_frames(&self) -> Vec<FrameIndex> {
        self.shown.iter().map(|(f, _)| *f).collect()
    }

    /// Bytes of the last shown image.
    pub fn last_image(&self) -> Option<&(TextureRect, ByteMode, Vec<u8>)> {
        self.last_image.as_ref()
    }

    /// Frames reported as cached.
    pub fn cached_notices(&self) -> &[FrameIndex] {
        &self.cached
    }

    /// Fps readouts received.
    pub fn fps_readouts(&self) -> &[f64] {
        &self.fps_readouts
    }

    /// Playback start (`true`) and stop (`false`) notifications.
    pub fn playback_events(&self) -> &[bool] {
        &self.playback_events
    }

    /// Textures currently alive.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Textures released so far.
    pub fn released_textures(&self) -> usize {
        self.released
    }

    /// Forget recorded history, keeping textures and settings.
    pub fn clear_history(&mut self) {
        self.shown.clear();
        self.cached.clear();
        self.fps_readouts.clear();
        self.playback_events.clear();
    }
}

impl DisplaySurface for HeadlessSurface {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn display_params(&self) -> DisplayParams {
        self.params
    }

    fn fit_to_format(&mut self, format: &Format) {
        self.viewport.fit_to(format);
    }

    fn upload(&mut self, frame: FrameIndex, buffer: &TransferBuffer) -> PlayheadResult<TextureHandle> {
        let handle = TextureHandle(self.next_texture);
        self.next_texture += 1;
        self.textures
            .insert(handle, (buffer.rect(), buffer.byte_mode(), buffer.data().to_vec()));
        self.last_image = Some((buffer.rect(), buffer.byte_mode(), buffer.data().to_vec()));
        self.shown.push((frame, FrameSource::Rendered));
        Ok(handle)
    }

    fn show_texture(&mut self, frame: FrameIndex, texture: TextureHandle) {
        if let Some((rect, mode, bytes)) = self.textures.get(&texture) {
            self.last_image = Some((*rect, *mode, bytes.clone()));
        }
        self.shown.push((frame, FrameSource::TextureCache));
    }

    fn show_cached_frame(
        &mut self,
        frame: FrameIndex,
        rect: TextureRect,
        byte_mode: ByteMode,
        bytes: &[u8],
    ) -> PlayheadResult<()> {
        if bytes.len() != rect.byte_len(byte_mode) {
            return Err(PlayheadError::cache(format!(
                "cached frame {frame}: {} bytes for a {}x{} {byte_mode:?} texture",
                bytes.len(),
                rect.w,
                rect.h
            )));
        }
        self.last_image = Some((rect, byte_mode, bytes.to_vec()));
        self.shown.push((frame, FrameSource::FrameCache));
        Ok(())
    }

    fn release_textures(&mut self, textures: &[TextureHandle]) {
        for t in textures {
            if self.textures.remove(t).is_some() {
                self.released += 1;
            }
        }
    }

    fn frame_cached(&mut self, frame: FrameIndex) {
        self.cached.push(frame);
    }

    fn fps_changed(&mut self, fps: f64) {
        self.fps_readouts.push(fps);
    }

    fn playback_changed(&mut self, playing: bool, _forward: bool) {
        self.playback_events.push(playing);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/headless.rs"]
mod tests;
