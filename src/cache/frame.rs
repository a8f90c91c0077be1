use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::cache::index_file::{self, INDEX_FILE_NAME, IndexRecord};
use crate::cache::lru::LruList;
use crate::foundation::core::{ByteMode, ChannelSet, Format, FrameIndex, LutId, RectI};
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::foundation::settings::EngineSettings;
use crate::graph::hash::GraphHash;
use crate::render::surface::TextureRect;

const FRAGMENT_EXT: &str = "frag";

/// Source half of a frame key: which input and which frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceId {
    /// Name of the input(s) feeding the output.
    pub name: String,
    /// Frame number.
    pub frame: FrameIndex,
}

impl SourceId {
    /// Build a source id.
    pub fn new(name: impl Into<String>, frame: FrameIndex) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }
}

/// Everything that determines the bytes of a displayed frame.
///
/// Floats compare by bit pattern, so a key is only ever equal to an exact copy of itself.
#[derive(Clone, Debug)]
pub struct FrameKey {
    /// Source and frame.
    pub source: SourceId,
    /// Graph identity.
    pub graph_hash: GraphHash,
    /// Viewer zoom.
    pub zoom: f64,
    /// Exposure in stops.
    pub exposure: f32,
    /// Display curve.
    pub lut: LutId,
    /// Pixel depth.
    pub byte_mode: ByteMode,
    /// Displayed channels.
    pub channels: ChannelSet,
    /// Data window of the output.
    pub data_window: RectI,
    /// Display window of the output.
    pub display_window: Format,
}

impl PartialEq for FrameKey {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.graph_hash == other.graph_hash
            && self.zoom.to_bits() == other.zoom.to_bits()
            && self.exposure.to_bits() == other.exposure.to_bits()
            && self.lut == other.lut
            && self.byte_mode == other.byte_mode
            && self.channels == other.channels
            && self.data_window == other.data_window
            && self.display_window == other.display_window
    }
}

impl Eq for FrameKey {}

impl Hash for FrameKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.graph_hash.hash(state);
        self.zoom.to_bits().hash(state);
        self.exposure.to_bits().hash(state);
        self.lut.hash(state);
        self.byte_mode.hash(state);
        self.channels.hash(state);
        self.data_window.hash(state);
        self.display_window.hash(state);
    }
}

/// Budgets and location of a [`FrameCache`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameCacheOpts {
    /// Directory holding fragments and the index.
    pub dir: PathBuf,
    /// Disk budget in bytes.
    pub max_disk_bytes: u64,
    /// Budget for resident buffers in bytes.
    pub max_ram_bytes: u64,
}

impl FrameCacheOpts {
    /// Options taken from engine settings.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            dir: settings.cache_dir.clone(),
            max_disk_bytes: settings.max_disk_cache_bytes,
            max_ram_bytes: settings.max_playback_ram_bytes,
        }
    }
}

/// Bytes and layout of a frame read back from the cache.
#[derive(Clone, Debug)]
pub struct CachedFrame {
    /// Region the bytes cover.
    pub rect: TextureRect,
    /// Pixel depth of `data`.
    pub byte_mode: ByteMode,
    /// Transfer-buffer layout bytes.
    pub data: Arc<[u8]>,
}

/// Counters and sizes of the frame cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCacheStats {
    /// Stored frames.
    pub entries: usize,
    /// Bytes on disk.
    pub disk_bytes: u64,
    /// Bytes held in resident buffers.
    pub resident_bytes: u64,
    /// Resident buffers.
    pub resident_entries: usize,
    /// Successful retrievals.
    pub hits: u64,
    /// Failed retrievals.
    pub misses: u64,
    /// Entries evicted for disk space.
    pub evictions: u64,
}

type EntryId = u64;

#[derive(Debug)]
struct FrameEntry {
    key: FrameKey,
    fragment: String,
    rect: TextureRect,
    byte_len: u64,
    resident: Option<Arc<[u8]>>,
}

/// Disk-backed store of displayed frames with a RAM-resident overlay.
///
/// Every frame lives in its own fragment file. Recently used fragments also stay resident in
/// memory, bounded by the playback RAM budget; the disk budget is enforced by evicting the
/// least recently used entries. The index persists across sessions via [`FrameCache::save`].
#[derive(Debug)]
pub struct FrameCache {
    opts: FrameCacheOpts,
    entries: HashMap<EntryId, FrameEntry>,
    by_source: HashMap<SourceId, SmallVec<[EntryId; 4]>>,
    lru: LruList<EntryId>,
    resident: VecDeque<EntryId>,
    disk_bytes: u64,
    resident_bytes: u64,
    next_id: EntryId,
    stats: FrameCacheStats,
}

impl FrameCache {
    /// Open (creating if needed) the cache directory and restore the persisted index.
    ///
    /// A corrupt or inconsistent index wipes the directory and starts empty.
    #[tracing::instrument(skip_all, fields(dir = %opts.dir.display()))]
    pub fn open(opts: FrameCacheOpts) -> PlayheadResult<Self> {
        std::fs::create_dir_all(&opts.dir)?;
        let mut cache = Self {
            opts,
            entries: HashMap::new(),
            by_source: HashMap::new(),
            lru: LruList::new(),
            resident: VecDeque::new(),
            disk_bytes: 0,
            resident_bytes: 0,
            next_id: 0,
            stats: FrameCacheStats::default(),
        };
        cache.restore()?;
        Ok(cache)
    }

    /// Cache configured by engine settings.
    pub fn from_settings(settings: &EngineSettings) -> PlayheadResult<Self> {
        Self::open(FrameCacheOpts::from_settings(settings))
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.opts.dir
    }

    /// Whether a frame with exactly this key is stored.
    pub fn is_cached(&self, key: &FrameKey) -> bool {
        self.find(key).is_some()
    }

    /// Recency rank of `key`, 0 being the most recent.
    pub fn rank(&self, key: &FrameKey) -> Option<usize> {
        self.find(key).and_then(|id| self.lru.rank(&id))
    }

    /// Number of stored frames.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sizes and counters.
    pub fn stats(&self) -> FrameCacheStats {
        FrameCacheStats {
            entries: self.entries.len(),
            disk_bytes: self.disk_bytes,
            resident_bytes: self.resident_bytes,
            resident_entries: self.resident.len(),
            ..self.stats
        }
    }

    /// Store a displayed frame. `bytes` is laid out like a transfer buffer for `rect`.
    ///
    /// An existing entry with the same key is replaced. Least recently used entries are
    /// evicted until the new fragment fits the disk budget.
    pub fn append_frame(
        &mut self,
        key: FrameKey,
        rect: TextureRect,
        bytes: &[u8],
    ) -> PlayheadResult<()> {
        let expected = rect.byte_len(key.byte_mode);
        if bytes.len() != expected {
            return Err(PlayheadError::validation(format!(
                "frame {} is {} bytes, expected {expected}",
                key.source.frame,
                bytes.len()
            )));
        }
        if let Some(old) = self.find(&key) {
            self.remove_entry(old);
        }

        let len = bytes.len() as u64;
        self.evict_to_fit(len);

        let id = self.next_id;
        self.next_id += 1;
        let fragment = fragment_name(id);
        std::fs::write(self.opts.dir.join(&fragment), bytes).map_err(|e| {
            PlayheadError::cache(format!("write fragment '{fragment}': {e}"))
        })?;

        self.by_source.entry(key.source.clone()).or_default().push(id);
        self.entries.insert(
            id,
            FrameEntry {
                key,
                fragment,
                rect,
                byte_len: len,
                resident: None,
            },
        );
        self.lru.push_front(id);
        self.disk_bytes += len;
        self.make_resident(id, Arc::from(bytes));
        tracing::debug!(entry = id, bytes = len, disk = self.disk_bytes, "frame cached");
        Ok(())
    }

    /// Fetch the bytes for `key`, reading the fragment back if it is not resident.
    ///
    /// A hit becomes the most recent entry. A missing or truncated fragment drops the entry
    /// and counts as a miss.
    pub fn retrieve_frame(&mut self, key: &FrameKey) -> Option<CachedFrame> {
        let Some(id) = self.find(key) else {
            self.stats.misses += 1;
            return None;
        };
        let (resident, fragment, expected) = {
            let entry = self.entries.get(&id)?;
            (entry.resident.clone(), entry.fragment.clone(), entry.byte_len)
        };
        let data = match resident {
            Some(data) => data,
            None => match std::fs::read(self.opts.dir.join(&fragment)) {
                Ok(bytes) if bytes.len() as u64 == expected => {
                    let data: Arc<[u8]> = Arc::from(bytes);
                    self.make_resident(id, Arc::clone(&data));
                    data
                }
                Ok(bytes) => {
                    tracing::warn!(
                        fragment = %fragment,
                        found = bytes.len(),
                        expected,
                        "truncated fragment dropped"
                    );
                    self.remove_entry(id);
                    self.stats.misses += 1;
                    return None;
                }
                Err(e) => {
                    tracing::warn!(fragment = %fragment, error = %e, "unreadable fragment dropped");
                    self.remove_entry(id);
                    self.stats.misses += 1;
                    return None;
                }
            },
        };
        self.lru.touch(&id);
        self.stats.hits += 1;
        let entry = self.entries.get(&id)?;
        Some(CachedFrame {
            rect: entry.rect,
            byte_mode: entry.key.byte_mode,
            data,
        })
    }

    /// Release every resident buffer. Fragments stay on disk.
    pub fn clear_playback(&mut self) {
        while let Some(id) = self.resident.pop_front() {
            self.close_resident(id);
        }
        self.resident_bytes = 0;
    }

    /// Delete every fragment and the index.
    pub fn clear_disk(&mut self) -> PlayheadResult<()> {
        self.reset_memory();
        wipe_dir(&self.opts.dir)?;
        tracing::info!(dir = %self.opts.dir.display(), "frame cache cleared");
        Ok(())
    }

    /// Persist the index so the next [`FrameCache::open`] can restore it.
    pub fn save(&self) -> PlayheadResult<()> {
        let records: Vec<IndexRecord> = self
            .lru
            .iter()
            .enumerate()
            .filter_map(|(rank, id)| {
                let e = self.entries.get(&id)?;
                Some(IndexRecord {
                    key: e.key.clone(),
                    rank,
                    fragment: e.fragment.clone(),
                    rect: e.rect,
                })
            })
            .collect();
        index_file::write_index(&self.opts.dir.join(INDEX_FILE_NAME), &records)?;
        tracing::info!(entries = records.len(), "frame cache index saved");
        Ok(())
    }

    fn find(&self, key: &FrameKey) -> Option<EntryId> {
        self.by_source
            .get(&key.source)?
            .iter()
            .copied()
            .find(|id| self.entries.get(id).is_some_and(|e| e.key == *key))
    }

    fn evict_to_fit(&mut self, incoming: u64) {
        while self.disk_bytes + incoming > self.opts.max_disk_bytes {
            let Some(oldest) = self.lru.pop_back() else {
                break;
            };
            tracing::debug!(entry = oldest, "frame evicted for disk budget");
            self.remove_entry(oldest);
            self.stats.evictions += 1;
        }
    }

    /// Keep `data` resident for `id`, closing the oldest resident buffer first when the RAM
    /// budget would be exceeded.
    fn make_resident(&mut self, id: EntryId, data: Arc<[u8]>) {
        let len = data.len() as u64;
        if len > self.opts.max_ram_bytes {
            return;
        }
        if self.resident_bytes + len > self.opts.max_ram_bytes
            && let Some(oldest) = self.resident.pop_front()
        {
            self.close_resident(oldest);
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.resident = Some(data);
            self.resident.push_back(id);
            self.resident_bytes += len;
        }
    }

    fn close_resident(&mut self, id: EntryId) {
        if let Some(buf) = self.entries.get_mut(&id).and_then(|e| e.resident.take()) {
            self.resident_bytes = self.resident_bytes.saturating_sub(buf.len() as u64);
        }
    }

    fn remove_entry(&mut self, id: EntryId) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        self.lru.remove(&id);
        if let Some(pos) = self.resident.iter().position(|r| *r == id) {
            self.resident.remove(pos);
        }
        if let Some(buf) = &entry.resident {
            self.resident_bytes = self.resident_bytes.saturating_sub(buf.len() as u64);
        }
        if let Some(list) = self.by_source.get_mut(&entry.key.source) {
            list.retain(|e| *e != id);
            if list.is_empty() {
                self.by_source.remove(&entry.key.source);
            }
        }
        self.disk_bytes = self.disk_bytes.saturating_sub(entry.byte_len);
        let path = self.opts.dir.join(&entry.fragment);
        if let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "fragment removal failed");
        }
    }

    fn reset_memory(&mut self) {
        self.entries.clear();
        self.by_source.clear();
        self.lru.clear();
        self.resident.clear();
        self.disk_bytes = 0;
        self.resident_bytes = 0;
    }

    fn restore(&mut self) -> PlayheadResult<()> {
        let index_path = self.opts.dir.join(INDEX_FILE_NAME);
        let records = match index_file::read_index(&index_path) {
            Ok(Some(records)) => records,
            Ok(None) => {
                // Fragments without an index cannot be trusted.
                if count_fragments(&self.opts.dir)? > 0 {
                    tracing::warn!("fragments without an index, wiping cache directory");
                    wipe_dir(&self.opts.dir)?;
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame cache index unreadable, wiping");
                return wipe_dir(&self.opts.dir);
            }
        };

        let on_disk = count_fragments(&self.opts.dir)?;
        if on_disk != records.len() {
            tracing::warn!(
                recorded = records.len(),
                on_disk,
                "frame cache fragment count mismatch, wiping"
            );
            return wipe_dir(&self.opts.dir);
        }

        let mut ids = Vec::with_capacity(records.len());
        for rec in &records {
            match parse_fragment_id(&rec.fragment) {
                Some(id) if !ids.contains(&id) => ids.push(id),
                _ => {
                    tracing::warn!(fragment = %rec.fragment, "bad fragment name in index, wiping");
                    return wipe_dir(&self.opts.dir);
                }
            }
        }

        let mut records: Vec<(EntryId, IndexRecord)> = ids.into_iter().zip(records).collect();
        records.sort_by_key(|(_, r)| r.rank);
        for (id, rec) in records {
            let byte_len = rec.rect.byte_len(rec.key.byte_mode) as u64;
            self.next_id = self.next_id.max(id + 1);
            self.by_source
                .entry(rec.key.source.clone())
                .or_default()
                .push(id);
            self.entries.insert(
                id,
                FrameEntry {
                    key: rec.key,
                    fragment: rec.fragment,
                    rect: rec.rect,
                    byte_len,
                    resident: None,
                },
            );
            self.lru.push_back(id);
            self.disk_bytes += byte_len;
        }
        tracing::info!(entries = self.entries.len(), disk = self.disk_bytes, "frame cache restored");
        Ok(())
    }
}

fn fragment_name(id: EntryId) -> String {
    format!("{id:016x}.{FRAGMENT_EXT}")
}

/// Id of a fragment named exactly like [`fragment_name`] produces.
fn parse_fragment_id(name: &str) -> Option<EntryId> {
    let stem = name.strip_suffix(FRAGMENT_EXT)?.strip_suffix('.')?;
    if stem.len() != 16 || !stem.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(stem, 16).ok()
}

fn count_fragments(dir: &Path) -> PlayheadResult<usize> {
    let mut n = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == FRAGMENT_EXT) {
            n += 1;
        }
    }
    Ok(n)
}

fn wipe_dir(dir: &Path) -> PlayheadResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ours = path.extension().is_some_and(|e| e == FRAGMENT_EXT)
            || path.file_name().is_some_and(|n| n == INDEX_FILE_NAME);
        if is_ours {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/cache/frame.rs"]
mod tests;
