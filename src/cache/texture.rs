use std::collections::VecDeque;

use crate::cache::frame::FrameKey;
use crate::render::surface::{TextureHandle, TextureRect};

/// Frame key plus the image region the texture covers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureKey {
    /// Frame identity.
    pub frame: FrameKey,
    /// Uploaded region.
    pub rect: TextureRect,
}

#[derive(Debug)]
struct TextureEntry {
    key: TextureKey,
    handle: TextureHandle,
    bytes: u64,
}

/// Counters for the texture tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureCacheStats {
    /// Live textures.
    pub entries: usize,
    /// Bytes held.
    pub bytes: u64,
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
    /// Textures evicted for space.
    pub evictions: u64,
}

/// Uploaded textures in insertion order, bounded by a byte budget.
///
/// The cache never frees textures itself: evictions hand the handles back to the caller.
#[derive(Debug)]
pub struct TextureCache {
    max_bytes: u64,
    entries: VecDeque<TextureEntry>,
    bytes: u64,
    stats: TextureCacheStats,
}

impl TextureCache {
    /// Fraction of the budget kept after an overflow.
    const LOW_WATER: f64 = 0.9;

    /// Empty cache with a byte budget.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            entries: VecDeque::new(),
            bytes: 0,
            stats: TextureCacheStats::default(),
        }
    }

    /// Handle for `key`, if uploaded.
    pub fn lookup(&mut self, key: &TextureKey) -> Option<TextureHandle> {
        let found = self.entries.iter().find(|e| e.key == *key).map(|e| e.handle);
        match found {
            Some(_) => self.stats.hits += 1,
            None => self.stats.misses += 1,
        }
        found
    }

    /// Record an uploaded texture and return every handle the caller must now release.
    ///
    /// A previous texture under the same key is replaced and returned as well.
    pub fn insert(&mut self, key: TextureKey, handle: TextureHandle, bytes: u64) -> Vec<TextureHandle> {
        let mut released = Vec::new();
        if let Some(pos) = self.entries.iter().position(|e| e.key == key)
            && let Some(old) = self.entries.remove(pos)
        {
            self.bytes -= old.bytes;
            if old.handle != handle {
                released.push(old.handle);
            }
        }
        self.entries.push_back(TextureEntry { key, handle, bytes });
        self.bytes += bytes;

        if self.bytes > self.max_bytes {
            let target = (self.max_bytes as f64 * Self::LOW_WATER) as u64;
            while self.bytes > target && self.entries.len() > 1 {
                let Some(old) = self.entries.pop_front() else {
                    break;
                };
                self.bytes -= old.bytes;
                self.stats.evictions += 1;
                tracing::debug!(texture = old.handle.0, bytes = old.bytes, "texture evicted");
                released.push(old.handle);
            }
        }
        released
    }

    /// Drop everything, returning all handles.
    pub fn clear(&mut self) -> Vec<TextureHandle> {
        self.bytes = 0;
        self.entries.drain(..).map(|e| e.handle).collect()
    }

    /// Live textures.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes held.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Counters.
    pub fn stats(&self) -> TextureCacheStats {
        TextureCacheStats {
            entries: self.entries.len(),
            bytes: self.bytes,
            ..self.stats
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/texture.rs"]
mod tests;
