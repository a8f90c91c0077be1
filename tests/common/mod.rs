#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use playhead::{
    EngineSettings, FrameIndex, FrameRange, HeadlessSurface, NodeGraph, NodeId, NodeOp,
    PlaybackEngine, ProceduralReader, Viewport,
};

/// Directory under the system temp dir, removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(tag: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "playhead_it_{tag}_{}_{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn settings(dir: &TempDir) -> EngineSettings {
    EngineSettings {
        cache_dir: dir.path().join("cache"),
        throttle_playback: false,
        worker_threads: Some(2),
        ..EngineSettings::default()
    }
}

pub fn range(first: i64, last: i64) -> FrameRange {
    FrameRange::new(FrameIndex(first), FrameIndex(last)).unwrap()
}

/// `reader -> gain -> viewer` over a procedural source.
pub fn gain_graph(range: FrameRange, gain: f32) -> (NodeGraph, NodeId) {
    let reader = Arc::new(ProceduralReader::new("plate", range, 16, 8));
    let mut g = NodeGraph::new();
    let r = g.add_node("plate", NodeOp::reader(reader));
    let k = g.add_node(
        "gain",
        NodeOp::Gain {
            rgba: [gain, gain, gain, 1.0],
        },
    );
    let v = g.add_node("viewer", NodeOp::Viewer);
    g.connect(k, 0, r).unwrap();
    g.connect(v, 0, k).unwrap();
    (g, v)
}

pub fn engine(settings: EngineSettings) -> PlaybackEngine<HeadlessSurface> {
    PlaybackEngine::new(settings, HeadlessSurface::new(Viewport::new(16, 8))).unwrap()
}

pub fn frames(list: &[i64]) -> Vec<FrameIndex> {
    list.iter().copied().map(FrameIndex).collect()
}
