use super::*;
use crate::cache::index_file::INDEX_VERSION_TAG;
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard(PathBuf);

impl TempDirGuard {
    fn new(tag: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "playhead_frame_cache_{tag}_{}_{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn opts(dir: &Path, disk: u64, ram: u64) -> FrameCacheOpts {
    FrameCacheOpts {
        dir: dir.to_path_buf(),
        max_disk_bytes: disk,
        max_ram_bytes: ram,
    }
}

fn rect() -> TextureRect {
    TextureRect {
        x: 0,
        y: 0,
        r: 4,
        t: 4,
        w: 4,
        h: 4,
    }
}

const FRAME_BYTES: u64 = 4 * 4 * 4;

fn key(frame: i64) -> FrameKey {
    FrameKey {
        source: SourceId::new("plate", FrameIndex(frame)),
        graph_hash: GraphHash(0xabc),
        zoom: 1.0,
        exposure: 0.0,
        lut: LutId::Srgb,
        byte_mode: ByteMode::Byte,
        channels: ChannelSet::RGBA,
        data_window: RectI::new(0, 0, 4, 4),
        display_window: Format::new(4, 4),
    }
}

fn bytes(v: u8) -> Vec<u8> {
    vec![v; FRAME_BYTES as usize]
}

#[test]
fn any_differing_key_field_misses() {
    let tmp = TempDirGuard::new("key");
    let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    cache.append_frame(key(1), rect(), &bytes(1)).unwrap();
    assert!(cache.is_cached(&key(1)));

    let variants: Vec<FrameKey> = vec![
        key(2),
        FrameKey { graph_hash: GraphHash(1), ..key(1) },
        FrameKey { zoom: 0.5, ..key(1) },
        FrameKey { exposure: 1.0, ..key(1) },
        FrameKey { lut: LutId::Linear, ..key(1) },
        FrameKey { byte_mode: ByteMode::Float, ..key(1) },
        FrameKey { channels: ChannelSet::GREEN, ..key(1) },
        FrameKey { data_window: RectI::new(0, 0, 4, 3), ..key(1) },
        FrameKey { display_window: Format::new(8, 4), ..key(1) },
        FrameKey { source: SourceId::new("other", FrameIndex(1)), ..key(1) },
    ];
    for k in variants {
        assert!(!cache.is_cached(&k), "{k:?}");
    }
}

#[test]
fn ranks_follow_recency_and_hits_promote() {
    let tmp = TempDirGuard::new("rank");
    let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    for f in 0..5 {
        cache.append_frame(key(f), rect(), &bytes(f as u8)).unwrap();
    }
    for f in 0..5 {
        assert_eq!(cache.rank(&key(f)), Some(4 - f as usize));
    }
    let hit = cache.retrieve_frame(&key(1)).unwrap();
    assert_eq!(hit.data[0], 1);
    assert_eq!(hit.rect, rect());
    assert_eq!(cache.rank(&key(1)), Some(0));
    assert_eq!(cache.rank(&key(4)), Some(1));
    assert!(cache.retrieve_frame(&key(9)).is_none());
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[test]
fn disk_budget_evicts_least_recent() {
    let tmp = TempDirGuard::new("disk");
    let mut cache = FrameCache::open(opts(&tmp.0, FRAME_BYTES * 3, 1 << 20)).unwrap();
    for f in 0..3 {
        cache.append_frame(key(f), rect(), &bytes(0)).unwrap();
    }
    cache.retrieve_frame(&key(0)).unwrap();
    cache.append_frame(key(3), rect(), &bytes(0)).unwrap();

    assert!(cache.is_cached(&key(0)));
    assert!(!cache.is_cached(&key(1)));
    assert_eq!(cache.stats().disk_bytes, FRAME_BYTES * 3);
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(count_fragments(&tmp.0).unwrap(), 3);
}

#[test]
fn ram_budget_closes_exactly_one_resident_buffer() {
    let tmp = TempDirGuard::new("ram");
    let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, FRAME_BYTES * 2)).unwrap();
    cache.append_frame(key(0), rect(), &bytes(0)).unwrap();
    cache.append_frame(key(1), rect(), &bytes(1)).unwrap();
    assert_eq!(cache.stats().resident_entries, 2);

    cache.append_frame(key(2), rect(), &bytes(2)).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.resident_entries, 2);
    assert_eq!(stats.resident_bytes, FRAME_BYTES * 2);

    // Frame 0 was closed; reading it back maps it again from disk.
    let again = cache.retrieve_frame(&key(0)).unwrap();
    assert_eq!(&again.data[..], &bytes(0)[..]);
    assert_eq!(cache.stats().resident_entries, 2);
}

#[test]
fn clear_playback_keeps_disk_entries() {
    let tmp = TempDirGuard::new("playback");
    let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    cache.append_frame(key(0), rect(), &bytes(7)).unwrap();
    cache.clear_playback();
    assert_eq!(cache.stats().resident_bytes, 0);
    assert_eq!(cache.retrieve_frame(&key(0)).unwrap().data[3], 7);

    cache.clear_disk().unwrap();
    assert!(cache.is_empty());
    assert_eq!(count_fragments(&tmp.0).unwrap(), 0);
}

#[test]
fn missing_fragment_is_dropped_as_miss() {
    let tmp = TempDirGuard::new("missing");
    let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    cache.append_frame(key(0), rect(), &bytes(7)).unwrap();
    cache.clear_playback();
    std::fs::remove_file(tmp.0.join(fragment_name(0))).unwrap();
    assert!(cache.retrieve_frame(&key(0)).is_none());
    assert!(!cache.is_cached(&key(0)));
    assert_eq!(cache.stats().disk_bytes, 0);
}

#[test]
fn wrong_sized_payload_is_rejected() {
    let tmp = TempDirGuard::new("size");
    let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    let err = cache.append_frame(key(0), rect(), &[0u8; 3]).unwrap_err();
    assert!(matches!(err, PlayheadError::Validation(_)));
    assert!(cache.is_empty());
}

#[test]
fn save_then_open_restores_entries_and_ranks() {
    let tmp = TempDirGuard::new("persist");
    {
        let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
        for f in 0..4 {
            cache.append_frame(key(f), rect(), &bytes(f as u8)).unwrap();
        }
        cache.retrieve_frame(&key(0)).unwrap();
        cache.save().unwrap();
    }
    let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    assert_eq!(cache.len(), 4);
    assert_eq!(cache.rank(&key(0)), Some(0));
    assert_eq!(cache.rank(&key(3)), Some(1));
    assert_eq!(cache.rank(&key(1)), Some(3));
    assert_eq!(cache.stats().disk_bytes, FRAME_BYTES * 4);
    assert_eq!(cache.retrieve_frame(&key(2)).unwrap().data[0], 2);

    // New fragments do not collide with restored ones.
    cache.append_frame(key(10), rect(), &bytes(10)).unwrap();
    assert_eq!(cache.len(), 5);
    assert_eq!(cache.retrieve_frame(&key(1)).unwrap().data[0], 1);
}

#[test]
fn version_mismatch_wipes_directory() {
    let tmp = TempDirGuard::new("version");
    {
        let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
        cache.append_frame(key(0), rect(), &bytes(0)).unwrap();
        cache.save().unwrap();
    }
    let idx = tmp.0.join(INDEX_FILE_NAME);
    let text = std::fs::read_to_string(&idx).unwrap();
    std::fs::write(&idx, text.replacen(INDEX_VERSION_TAG, "playhead-frame-cache v0", 1)).unwrap();

    let cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    assert!(cache.is_empty());
    assert_eq!(count_fragments(&tmp.0).unwrap(), 0);
    assert!(!idx.exists());
}

#[test]
fn fragment_count_mismatch_wipes_directory() {
    let tmp = TempDirGuard::new("count");
    {
        let mut cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
        cache.append_frame(key(0), rect(), &bytes(0)).unwrap();
        cache.append_frame(key(1), rect(), &bytes(1)).unwrap();
        cache.save().unwrap();
    }
    std::fs::remove_file(tmp.0.join(fragment_name(1))).unwrap();
    let cache = FrameCache::open(opts(&tmp.0, 1 << 20, 1 << 20)).unwrap();
    assert!(cache.is_empty());
    assert_eq!(count_fragments(&tmp.0).unwrap(), 0);
}

#[test]
fn index_naming_a_foreign_file_wipes_instead_of_following_it() {
    let tmp = TempDirGuard::new("foreign");
    let dir = tmp.0.join("cache");
    {
        let mut cache = FrameCache::open(opts(&dir, 1 << 20, 1 << 20)).unwrap();
        cache.append_frame(key(0), rect(), &bytes(0)).unwrap();
        cache.save().unwrap();
    }
    let outside = tmp.0.join("outside.frag");
    std::fs::write(&outside, b"keep").unwrap();
    let idx = dir.join(INDEX_FILE_NAME);
    let text = std::fs::read_to_string(&idx).unwrap();
    std::fs::write(&idx, text.replace(&fragment_name(0), "../outside.frag")).unwrap();

    let cache = FrameCache::open(opts(&dir, 1 << 20, 1 << 20)).unwrap();
    assert!(cache.is_empty());
    assert_eq!(count_fragments(&dir).unwrap(), 0);
    assert!(outside.exists());
}

#[test]
fn fragment_ids_parse_only_canonical_names() {
    assert_eq!(parse_fragment_id(&fragment_name(42)), Some(42));
    assert_eq!(parse_fragment_id("../x.frag"), None);
    assert_eq!(parse_fragment_id("+000000000000001.frag"), None);
    assert_eq!(parse_fragment_id("2a.frag"), None);
}
