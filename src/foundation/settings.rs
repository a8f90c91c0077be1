use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::foundation::core::{Format, Fps};
use crate::foundation::error::{PlayheadError, PlayheadResult};

const MIB: u64 = 1024 * 1024;

/// Tunables for the playback engine and its caches.
///
/// Every field has a default, so a settings file only needs the keys it overrides.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Directory holding frame-cache fragments and the index file.
    pub cache_dir: PathBuf,
    /// Disk budget of the frame cache.
    pub max_disk_cache_bytes: u64,
    /// RAM budget for resident frame-cache buffers.
    pub max_playback_ram_bytes: u64,
    /// Byte budget of the texture cache.
    pub max_texture_bytes: u64,
    /// Decoded frames kept per reader.
    pub decode_buffer_capacity: usize,
    /// Target playback rate.
    pub fps: Fps,
    /// Worker pool size. `None` uses rayon's default.
    pub worker_threads: Option<usize>,
    /// Wrap at the end of the range instead of stopping.
    pub loop_mode: bool,
    /// Ask readers to start decoding the next frame while the current one is displayed.
    pub prefetch_next_frame: bool,
    /// Sleep until the next frame deadline between frames.
    pub throttle_playback: bool,
    /// Frames between two fps readouts.
    pub fps_refresh_interval: u32,
    /// Format used by generators that have no source format.
    pub project_format: Format,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("playhead-cache"),
            max_disk_cache_bytes: 2048 * MIB,
            max_playback_ram_bytes: 512 * MIB,
            max_texture_bytes: 256 * MIB,
            decode_buffer_capacity: 4,
            fps: Fps { num: 24, den: 1 },
            worker_threads: None,
            loop_mode: true,
            prefetch_next_frame: true,
            throttle_playback: true,
            fps_refresh_interval: 24,
            project_format: Format::new(1920, 1080),
        }
    }
}

impl EngineSettings {
    /// Parse settings from a JSON reader and validate them.
    pub fn from_reader<R: std::io::Read>(r: R) -> PlayheadResult<Self> {
        let settings: Self = serde_json::from_reader(r)
            .map_err(|e| PlayheadError::serde(format!("parse settings JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> PlayheadResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            PlayheadError::validation(format!("open settings JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> PlayheadResult<()> {
        if self.decode_buffer_capacity == 0 {
            return Err(PlayheadError::validation(
                "decode_buffer_capacity must be >= 1",
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(PlayheadError::validation("worker_threads must be >= 1"));
        }
        if self.fps_refresh_interval == 0 {
            return Err(PlayheadError::validation("fps_refresh_interval must be >= 1"));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if self.project_format.window.is_empty() {
            return Err(PlayheadError::validation("project_format must not be empty"));
        }
        if !(self.project_format.pixel_aspect.is_finite() && self.project_format.pixel_aspect > 0.0)
        {
            return Err(PlayheadError::validation(
                "project_format pixel_aspect must be finite and > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/settings.rs"]
mod tests;
