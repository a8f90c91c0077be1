use super::*;
use crate::decode::reader::ProceduralReader;
use crate::graph::node::NodeOp;
use crate::render::headless::{FrameSource, HeadlessSurface};
use crate::render::viewport::Viewport;

struct CacheDir(std::path::PathBuf);

impl CacheDir {
    fn new(tag: &str) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        Self(std::env::temp_dir().join(format!(
            "playhead_engine_{tag}_{}_{nanos}",
            std::process::id()
        )))
    }
}

impl Drop for CacheDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn engine(dir: &CacheDir) -> PlaybackEngine<HeadlessSurface> {
    let settings = EngineSettings {
        cache_dir: dir.0.clone(),
        throttle_playback: false,
        worker_threads: Some(2),
        ..EngineSettings::default()
    };
    PlaybackEngine::new(settings, HeadlessSurface::new(Viewport::new(8, 4))).unwrap()
}

fn gradient_graph() -> (Arc<NodeGraph>, NodeId) {
    let reader = Arc::new(ProceduralReader::new(
        "grad",
        FrameRange::new(FrameIndex(1), FrameIndex(5)).unwrap(),
        8,
        4,
    ));
    let mut g = NodeGraph::new();
    let r = g.add_node("grad", NodeOp::reader(reader));
    let v = g.add_node("viewer", NodeOp::Viewer);
    g.connect(v, 0, r).unwrap();
    (Arc::new(g), v)
}

#[test]
fn zero_worker_threads_is_rejected() {
    assert!(build_thread_pool(Some(0)).is_err());
    assert!(build_thread_pool(Some(1)).is_ok());
}

#[test]
fn nothing_happens_without_a_graph() {
    let dir = CacheDir::new("empty");
    let mut e = engine(&dir);
    e.play(true);
    assert!(!e.playback_state().working);
    e.seek(FrameIndex(1));
    e.run_until_idle();
    assert!(e.surface().shown().is_empty());
}

#[test]
fn load_graph_sets_range_and_source_name() {
    let dir = CacheDir::new("load");
    let mut e = engine(&dir);
    let (g, v) = gradient_graph();
    e.load_graph(g, v);
    assert_eq!(
        e.timeline().range(),
        Some(FrameRange::new(FrameIndex(1), FrameIndex(5)).unwrap())
    );
    assert_eq!(e.source_name, "grad");
    assert_eq!(e.readers.len(), 1);
    assert_ne!(e.graph_hash(), GraphHash(0));
}

#[test]
fn reloading_the_same_reader_keeps_its_decode_buffer() {
    let dir = CacheDir::new("reload");
    let mut e = engine(&dir);
    let (g, v) = gradient_graph();
    e.load_graph(Arc::clone(&g), v);
    e.seek(FrameIndex(2));
    e.run_until_idle();
    assert_eq!(e.readers[0].buffer.len(), 1);
    e.load_graph(g, v);
    assert_eq!(e.readers[0].buffer.len(), 1);
}

#[test]
fn stale_job_outcomes_are_ignored() {
    let dir = CacheDir::new("stale");
    let mut e = engine(&dir);
    let (g, v) = gradient_graph();
    e.load_graph(g, v);
    let rect = TextureRect {
        x: 0,
        y: 0,
        r: 1,
        t: 1,
        w: 1,
        h: 1,
    };
    e.on_frame_computed(JobOutcome {
        generation: 42,
        frame: FrameIndex(1),
        transfer: crate::render::surface::TransferBuffer::new(
            rect,
            crate::foundation::core::ByteMode::Byte,
        ),
        rows_computed: 1,
        rows_reused: 0,
        rows_failed: 0,
        cancelled: false,
    });
    assert_eq!(e.stats().frames_displayed, 0);
    assert!(e.is_idle());
}

#[test]
fn single_seek_renders_then_frame_cache_serves_repeat() {
    let dir = CacheDir::new("seek");
    let mut e = engine(&dir);
    let (g, v) = gradient_graph();
    e.load_graph(g, v);

    e.seek(FrameIndex(3));
    e.run_until_idle();
    assert_eq!(e.state(), EngineState::Idle);
    assert_eq!(e.surface().shown(), &[(FrameIndex(3), FrameSource::Rendered)]);
    assert_eq!(e.stats().rows_computed, 4);

    e.seek(FrameIndex(3));
    e.run_until_idle();
    assert_eq!(e.surface().shown()[1], (FrameIndex(3), FrameSource::FrameCache));
    assert_eq!(e.stats().frame_cache_hits, 1);
    assert_eq!(e.readers[0].buffer.len(), 1);
}
