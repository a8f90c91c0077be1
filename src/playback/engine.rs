use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::Mutex;

use crate::cache::frame::{FrameCache, FrameKey, SourceId};
use crate::cache::row::{RowCache, RowCacheContext};
use crate::cache::texture::{TextureCache, TextureKey};
use crate::decode::buffer::{DecodeBuffer, DecodeSync};
use crate::decode::reader::{DecodedImage, FrameInfo};
use crate::foundation::core::{ChannelSet, Format, Fps, FrameIndex, FrameRange, RectI};
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::foundation::settings::EngineSettings;
use crate::graph::dag::Dag;
use crate::graph::hash::{GraphHash, compute_graph_hash};
use crate::graph::node::{NodeId, NodeKind, WriterRef};
use crate::graph::store::NodeGraph;
use crate::playback::handle::{Inbox, PlaybackHandle};
use crate::playback::state::{EngineState, PlaybackState, Request, Timeline};
use crate::playback::timer::FpsTimer;
use crate::render::rows::{FrameInputs, FrameJob, JobOutcome, run_frame_job};
use crate::render::sink::SinkConfig;
use crate::render::surface::{DisplayParams, DisplaySurface, TextureHandle, TextureRect};

/// Frame and texture tiers, shareable between engines.
#[derive(Clone)]
pub struct EngineCaches {
    /// Disk-backed frame cache.
    pub frames: Arc<Mutex<FrameCache>>,
    /// Uploaded textures.
    pub textures: Arc<Mutex<TextureCache>>,
}

impl EngineCaches {
    /// Open the frame cache directory and create an empty texture cache.
    pub fn open(settings: &EngineSettings) -> PlayheadResult<Self> {
        Ok(Self {
            frames: Arc::new(Mutex::new(FrameCache::from_settings(settings)?)),
            textures: Arc::new(Mutex::new(TextureCache::new(settings.max_texture_bytes))),
        })
    }
}

/// Counters since the engine was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Frames handed to the surface, from any tier.
    pub frames_displayed: u64,
    /// Frames computed from rows.
    pub frames_rendered: u64,
    /// Frames served by the frame cache.
    pub frame_cache_hits: u64,
    /// Frames served by the texture cache.
    pub texture_cache_hits: u64,
    /// Rows evaluated.
    pub rows_computed: u64,
    /// Rows taken from the row cache.
    pub rows_reused: u64,
    /// Rows that failed and were shown black.
    pub rows_failed: u64,
    /// Jobs discarded by an abort.
    pub cancelled_frames: u64,
    /// Frames pushed to a writer's sink.
    pub frames_written: u64,
}

/// Work scheduled on the coordinating thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EngineEvent {
    /// Resolve and show the next frame. `recursive` marks an auto-advance.
    Step { recursive: bool },
    /// Run one deferred request.
    Flush,
}

struct ReaderSlot {
    node: NodeId,
    buffer: DecodeBuffer,
}

struct InFlight {
    generation: u64,
    cancel: Arc<AtomicBool>,
}

/// What the frame in flight will be stored and uploaded as.
struct FramePlan {
    frame: FrameIndex,
    key: FrameKey,
    rect: TextureRect,
    rows: Vec<i32>,
}

/// A writer output rendering its range into its sink.
struct WriteRun {
    writer: WriterRef,
    range: FrameRange,
    next: FrameIndex,
}

/// Region and identity of one frame, resolved before any cache is consulted.
struct FrameRegion {
    headers: Vec<(usize, FrameInfo)>,
    display: Format,
    bounds: RectI,
    channels: ChannelSet,
}

/// Drives playback: resolves frames, consults the cache tiers, schedules row evaluation and
/// hands finished frames to the [`DisplaySurface`].
///
/// The engine is owned by one coordinating thread, which calls [`PlaybackEngine::poll`] or
/// [`PlaybackEngine::run_until_idle`]. Other threads control it through a
/// [`PlaybackHandle`].
pub struct PlaybackEngine<S: DisplaySurface> {
    settings: EngineSettings,
    surface: S,
    graph: Arc<NodeGraph>,
    dag: Dag,
    sorted: Arc<[NodeId]>,
    positions: Arc<HashMap<NodeId, usize>>,
    graph_hash: GraphHash,
    source_name: String,
    readers: Vec<ReaderSlot>,
    caches: EngineCaches,
    row_cache: RowCache,
    pool: rayon::ThreadPool,
    timer: FpsTimer,
    state: EngineState,
    playback: PlaybackState,
    timeline: Timeline,
    events: VecDeque<EngineEvent>,
    deferred: VecDeque<Request>,
    inbox_tx: Sender<Inbox>,
    inbox_rx: Receiver<Inbox>,
    in_flight: Option<InFlight>,
    current: Option<FramePlan>,
    /// Shown texture of an incomplete frame, released at the next upload.
    uncached_texture: Option<TextureHandle>,
    writing: Option<WriteRun>,
    generation: u64,
    stats: PlaybackStats,
}

impl<S: DisplaySurface> PlaybackEngine<S> {
    /// Engine with its own caches opened from `settings`.
    pub fn new(settings: EngineSettings, surface: S) -> PlayheadResult<Self> {
        settings.validate()?;
        let caches = EngineCaches::open(&settings)?;
        Self::with_caches(settings, surface, caches)
    }

    /// Engine using caches owned elsewhere.
    pub fn with_caches(
        settings: EngineSettings,
        surface: S,
        caches: EngineCaches,
    ) -> PlayheadResult<Self> {
        settings.validate()?;
        let pool = build_thread_pool(settings.worker_threads)?;
        let (inbox_tx, inbox_rx) = mpsc::channel();
        Ok(Self {
            timer: FpsTimer::new(settings.fps),
            playback: PlaybackState::new(settings.loop_mode),
            settings,
            surface,
            graph: Arc::new(NodeGraph::new()),
            dag: Dag::new(),
            sorted: Arc::from(Vec::new()),
            positions: Arc::new(HashMap::new()),
            graph_hash: GraphHash(0),
            source_name: String::new(),
            readers: Vec::new(),
            caches,
            row_cache: RowCache::new(),
            pool,
            state: EngineState::Idle,
            timeline: Timeline::new(),
            events: VecDeque::new(),
            deferred: VecDeque::new(),
            inbox_tx,
            inbox_rx,
            in_flight: None,
            current: None,
            uncached_texture: None,
            writing: None,
            generation: 0,
            stats: PlaybackStats::default(),
        })
    }

    /// Sender for cross-thread control.
    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle::new(self.inbox_tx.clone())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable surface, e.g. to change zoom before a [`PlaybackEngine::refresh`].
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn caches(&self) -> &EngineCaches {
        &self.caches
    }

    pub fn row_cache(&self) -> &RowCache {
        &self.row_cache
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn playback_state(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn graph_hash(&self) -> GraphHash {
        self.graph_hash
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    /// `true` when nothing is running, queued or deferred.
    pub fn is_idle(&self) -> bool {
        !self.playback.working
            && self.in_flight.is_none()
            && self.events.is_empty()
            && self.deferred.is_empty()
    }

    /// Install `graph` with `output` as the viewed node, without showing anything.
    ///
    /// Decode buffers of readers that survive the change are kept.
    #[tracing::instrument(level = "debug", skip(self, graph))]
    pub fn load_graph(&mut self, graph: Arc<NodeGraph>, output: NodeId) {
        self.dag.reset_and_sort(&graph, output);
        self.sorted = Arc::from(self.dag.sorted());
        self.positions = Arc::new(
            self.sorted
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, i))
                .collect(),
        );
        self.graph_hash = compute_graph_hash(&graph, &self.dag);

        let capacity = self.settings.decode_buffer_capacity;
        let mut old = std::mem::take(&mut self.readers);
        for (node, reader) in self.dag.readers(&graph) {
            let buffer = match old
                .iter()
                .position(|s| s.node == node && Arc::ptr_eq(s.buffer.reader(), reader))
            {
                Some(i) => old.swap_remove(i).buffer,
                None => DecodeBuffer::new(Arc::clone(reader), capacity),
            };
            self.readers.push(ReaderSlot { node, buffer });
        }

        let names: Vec<&str> = self
            .dag
            .inputs()
            .iter()
            .filter_map(|id| graph.node(*id).map(|n| n.name()))
            .collect();
        self.source_name = if names.is_empty() {
            "graph".to_owned()
        } else {
            names.join("+")
        };

        let range = self
            .dag
            .frame_range(&graph)
            .or_else(|| self.dag.output().map(|_| FrameRange::single(self.timeline.current())));
        self.timeline.set_range(range);
        self.graph = graph;
        self.row_cache.clear();
        tracing::info!(
            nodes = self.dag.len(),
            readers = self.readers.len(),
            hash = %self.graph_hash,
            "graph loaded"
        );
    }

    /// Replace the graph and re-show the current frame. Deferred while a run is active.
    pub fn graph_changed(&mut self, graph: Arc<NodeGraph>, output: NodeId) {
        if self.playback.working {
            self.playback.paused = true;
            self.deferred
                .push_back(Request::GraphChanged { graph, output });
            return;
        }
        self.load_graph(graph, output);
        self.show_once(true);
    }

    /// Start a run of `frame_count` frames (`-1` = unbounded).
    ///
    /// Ignored while another run is active or an upload is pending.
    pub fn start_playback(
        &mut self,
        frame_count: i64,
        fit_to_viewer: bool,
        forward: bool,
        same_frame: bool,
    ) {
        if self.playback.working || self.state == EngineState::Uploading {
            tracing::debug!("playback already running, start ignored");
            return;
        }
        if self.dag.output().is_none() || frame_count == 0 {
            return;
        }
        self.playback = PlaybackState {
            working: true,
            paused: false,
            aborted: false,
            forward,
            loop_mode: self.playback.loop_mode,
            frame_requests: frame_count,
            frame_request_index: 0,
            same_frame,
            fit_to_viewer,
        };
        self.timer.reset();
        self.surface.playback_changed(true, forward);
        self.events
            .push_back(EngineEvent::Step { recursive: false });
    }

    /// Unbounded playback in one direction.
    pub fn play(&mut self, forward: bool) {
        self.start_playback(-1, false, forward, false);
    }

    /// Stop after the frame in flight is shown.
    pub fn pause(&mut self) {
        if self.playback.working {
            self.playback.paused = true;
        }
    }

    /// Cancel the frame in flight, discard its rows and stop.
    ///
    /// Blocks until the worker job reports. Requests arriving meanwhile are deferred.
    pub fn abort(&mut self) {
        if !self.playback.working {
            return;
        }
        self.playback.aborted = true;
        if let Some(f) = &self.in_flight {
            f.cancel.store(true, Ordering::Release);
        }
        self.wait_for_in_flight();
        self.row_cache.clear();
        self.stop_engine();
    }

    /// Show `frame`. Frames outside the range are ignored.
    pub fn seek(&mut self, frame: FrameIndex) {
        if self.defer_while_working(Request::Seek(frame)) {
            return;
        }
        if !self.timeline.seek(frame) {
            tracing::debug!(frame = frame.0, "seek outside range ignored");
            return;
        }
        self.show_once(false);
    }

    /// Show the frame `frames` away from the current one. Targets outside the range are
    /// ignored.
    pub fn step_by(&mut self, frames: i64, forward: bool) {
        if self.defer_while_working(Request::StepBy { frames, forward }) {
            return;
        }
        let cur = self.timeline.current().0;
        let target = FrameIndex(if forward {
            cur.saturating_add(frames)
        } else {
            cur.saturating_sub(frames)
        });
        if frames < 1 || !self.timeline.seek(target) {
            tracing::debug!(frame = target.0, "step outside range ignored");
            return;
        }
        self.playback.forward = forward;
        self.show_once(false);
    }

    /// Render every frame of the output writer's range into its sink, in order.
    ///
    /// Ignored when the output is not a writer.
    pub fn start_writing(&mut self) {
        if self.defer_while_working(Request::Write) {
            return;
        }
        if self.output_writer().is_none() {
            tracing::warn!("output is not a writer, nothing to write");
            return;
        }
        self.start_playback(-1, false, true, false);
    }

    /// Show the neighbouring frame, wrapping in loop mode.
    pub fn step(&mut self, forward: bool) {
        if self.defer_while_working(Request::Step { forward }) {
            return;
        }
        if self
            .timeline
            .advance(forward, self.playback.loop_mode)
            .is_some()
        {
            self.playback.forward = forward;
            self.show_once(false);
        }
    }

    pub fn first(&mut self) {
        if self.defer_while_working(Request::First) {
            return;
        }
        if let Some(r) = self.timeline.range() {
            self.seek(r.first);
        }
    }

    pub fn last(&mut self) {
        if self.defer_while_working(Request::Last) {
            return;
        }
        if let Some(r) = self.timeline.range() {
            self.seek(r.last);
        }
    }

    /// Re-show the current frame, picking up viewport or display changes.
    pub fn refresh(&mut self) {
        if self.defer_while_working(Request::Refresh) {
            return;
        }
        self.show_once(true);
    }

    pub fn set_loop_mode(&mut self, enabled: bool) {
        self.playback.loop_mode = enabled;
    }

    pub fn set_fps(&mut self, fps: Fps) {
        self.settings.fps = fps;
        self.timer.set_desired(fps);
    }

    /// Move the cursor without showing anything.
    pub fn set_current_frame(&mut self, frame: FrameIndex) -> bool {
        self.timeline.seek(frame)
    }

    /// Delete every frame-cache fragment and the index.
    pub fn clear_disk_cache(&mut self) -> PlayheadResult<()> {
        self.caches.frames.lock().clear_disk()
    }

    /// Release RAM-resident frame-cache buffers.
    pub fn clear_playback_cache(&mut self) {
        self.caches.frames.lock().clear_playback();
    }

    /// Drop every computed row.
    pub fn clear_row_cache(&mut self) {
        self.row_cache.clear();
    }

    /// Drop every texture and release it on the surface.
    pub fn clear_texture_cache(&mut self) {
        let handles = self.caches.textures.lock().clear();
        if !handles.is_empty() {
            self.surface.release_textures(&handles);
        }
    }

    /// Apply a request as if the matching method had been called.
    pub fn submit(&mut self, request: Request) {
        match request {
            Request::Start {
                frame_count,
                fit_to_viewer,
                forward,
                same_frame,
            } => self.start_playback(frame_count, fit_to_viewer, forward, same_frame),
            Request::Seek(frame) => self.seek(frame),
            Request::Step { forward } => self.step(forward),
            Request::StepBy { frames, forward } => self.step_by(frames, forward),
            Request::Write => self.start_writing(),
            Request::First => self.first(),
            Request::Last => self.last(),
            Request::Refresh => self.refresh(),
            Request::Pause => self.pause(),
            Request::Abort => self.abort(),
            Request::GraphChanged { graph, output } => self.graph_changed(graph, output),
            Request::SetLoopMode(enabled) => self.set_loop_mode(enabled),
            Request::SetFps(fps) => self.set_fps(fps),
        }
    }

    /// Process pending messages and at most one scheduled event.
    ///
    /// With `block`, waits for the frame in flight when nothing else is ready. Returns
    /// whether any work was done.
    pub fn poll(&mut self, block: bool) -> bool {
        let mut worked = false;
        while let Ok(msg) = self.inbox_rx.try_recv() {
            self.dispatch(msg);
            worked = true;
        }

        if self.events.is_empty()
            && self.in_flight.is_none()
            && !self.playback.working
            && !self.deferred.is_empty()
        {
            self.events.push_back(EngineEvent::Flush);
        }

        if let Some(event) = self.events.pop_front() {
            match event {
                EngineEvent::Step { recursive } => self.step_frame(recursive),
                EngineEvent::Flush => self.flush_deferred(),
            }
            return true;
        }

        if block
            && self.in_flight.is_some()
            && let Ok(msg) = self.inbox_rx.recv()
        {
            self.dispatch(msg);
            return true;
        }
        worked
    }

    /// Drive the engine until nothing is running, queued or deferred.
    pub fn run_until_idle(&mut self) {
        while self.poll(true) || !self.is_idle() {}
    }

    /// Abort any run and persist the frame-cache index.
    pub fn shutdown(&mut self) -> PlayheadResult<()> {
        self.abort();
        self.deferred.clear();
        self.caches.frames.lock().save()?;
        tracing::info!(
            frames = self.stats.frames_displayed,
            rendered = self.stats.frames_rendered,
            "playback engine shut down"
        );
        Ok(())
    }

    /// Consume the engine, returning its surface.
    pub fn into_surface(self) -> S {
        self.surface
    }

    fn dispatch(&mut self, msg: Inbox) {
        match msg {
            Inbox::Request(r) => self.submit(r),
            Inbox::Frame(outcome) => self.on_frame_computed(outcome),
        }
    }

    fn defer_while_working(&mut self, request: Request) -> bool {
        if !self.playback.working {
            return false;
        }
        self.playback.paused = true;
        self.deferred.push_back(request);
        true
    }

    fn show_once(&mut self, same_frame: bool) {
        if self.output_writer().is_some() {
            tracing::debug!("output is a writer, nothing to show");
            return;
        }
        let forward = self.playback.forward;
        self.start_playback(1, false, forward, same_frame);
    }

    fn flush_deferred(&mut self) {
        if self.playback.working {
            return;
        }
        if let Some(request) = self.deferred.pop_front() {
            tracing::debug!(?request, "running deferred request");
            self.submit(request);
        }
        if !self.playback.working && !self.deferred.is_empty() {
            self.events.push_back(EngineEvent::Flush);
        }
    }

    fn stop_engine(&mut self) {
        self.state = EngineState::Idle;
        self.current = None;
        if let Some(run) = self.writing.take() {
            tracing::warn!(
                writer = run.writer.name(),
                next = run.next.0,
                "write interrupted before the last frame"
            );
        }
        self.events
            .retain(|e| !matches!(e, EngineEvent::Step { .. }));
        if self.playback.working {
            self.playback.working = false;
            self.surface
                .playback_changed(false, self.playback.forward);
        }
        if !self.deferred.is_empty() {
            self.events.push_back(EngineEvent::Flush);
        }
    }

    fn wait_for_in_flight(&mut self) {
        while self.in_flight.is_some() {
            match self.inbox_rx.recv() {
                Ok(Inbox::Frame(outcome)) => self.on_frame_computed(outcome),
                Ok(Inbox::Request(r)) => self.deferred.push_back(r),
                Err(_) => break,
            }
        }
    }

    /// Resolve the next frame and show it from the cheapest tier.
    #[tracing::instrument(level = "debug", skip(self), fields(frame = tracing::field::Empty))]
    fn step_frame(&mut self, recursive: bool) {
        self.state = EngineState::Requesting;
        let PlaybackState {
            aborted,
            paused,
            forward,
            loop_mode,
            frame_requests,
            same_frame,
            ..
        } = self.playback;
        if aborted || (paused && recursive) || frame_requests == 0 {
            self.stop_engine();
            return;
        }
        let Some(range) = self.timeline.range() else {
            self.stop_engine();
            return;
        };
        if let Some(writer) = self.output_writer() {
            self.write_step(recursive, writer);
            return;
        }
        if recursive && range.is_single() && frame_requests == -1 {
            self.stop_engine();
            return;
        }

        let frame = if recursive {
            match self.timeline.advance(forward, loop_mode) {
                Some(f) => f,
                None => {
                    self.stop_engine();
                    return;
                }
            }
        } else if same_frame {
            self.timeline.current()
        } else {
            let f = range.clamp(self.timeline.current());
            self.timeline.seek(f);
            f
        };
        tracing::Span::current().record("frame", frame.0);

        let region = self.resolve_region(frame, self.surface.display_params().channels);
        if self.playback.fit_to_viewer {
            self.surface.fit_to_format(&region.display);
        }
        let viewport = self.surface.viewport();
        let rows = viewport.visible_rows(&region.display, region.bounds);
        let columns = viewport.visible_columns(&region.display, region.bounds);
        let Some(rect) = TextureRect::from_visible(&rows, &columns) else {
            tracing::debug!(frame = frame.0, "nothing visible, stopping");
            self.stop_engine();
            return;
        };
        let params = self.surface.display_params();
        let key = FrameKey {
            source: SourceId::new(self.source_name.clone(), frame),
            graph_hash: self.graph_hash,
            zoom: viewport.zoom,
            exposure: params.exposure,
            lut: params.lut,
            byte_mode: params.byte_mode,
            channels: region.channels,
            data_window: region.bounds,
            display_window: region.display,
        };

        if self.show_from_frame_cache(frame, &key, rect, &region) {
            self.advance_loop(frame, &rows);
            return;
        }
        if !recursive && self.show_from_texture_cache(frame, &key, rect) {
            self.advance_loop(frame, &rows);
            return;
        }

        self.compute_fresh(
            FramePlan {
                frame,
                key,
                rect,
                rows,
            },
            columns,
            &region,
            viewport.zoom,
            params,
        );
    }

    /// Schedule row evaluation of `plan` on the worker pool.
    fn compute_fresh(
        &mut self,
        plan: FramePlan,
        columns: Vec<i32>,
        region: &FrameRegion,
        zoom: f64,
        params: DisplayParams,
    ) {
        self.state = EngineState::ComputingFresh;
        let frame = plan.frame;
        let images = self.decode_inputs(frame, &plan.rows);
        let ctx = RowCacheContext {
            frame,
            graph_hash: self.graph_hash,
            zoom,
            display_window: region.display,
            span: (region.bounds.x, region.bounds.r),
            channels: region.channels,
        };
        if self.row_cache.prepare(&ctx) {
            tracing::debug!(frame = frame.0, "row cache rebound");
        }
        let row_list = plan
            .rows
            .iter()
            .enumerate()
            .map(|(zy, y)| self.row_cache.get_or_insert(*y, zy).0)
            .collect();

        self.generation += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        let job = FrameJob {
            generation: self.generation,
            frame,
            inputs: FrameInputs {
                graph: Arc::clone(&self.graph),
                sorted: Arc::clone(&self.sorted),
                positions: Arc::clone(&self.positions),
                images,
                project: region.display.window,
            },
            rows: row_list,
            columns,
            display: params,
            transfer: self.surface.allocate_transfer(plan.rect, params.byte_mode),
            cancel: Arc::clone(&cancel),
        };
        let tx = self.inbox_tx.clone();
        self.pool.spawn(move || {
            let outcome = run_frame_job(job);
            let _ = tx.send(Inbox::Frame(outcome));
        });
        self.in_flight = Some(InFlight {
            generation: self.generation,
            cancel,
        });
        self.current = Some(plan);
    }

    fn output_writer(&self) -> Option<WriterRef> {
        self.dag
            .output()
            .and_then(|id| self.graph.node(id))
            .and_then(|n| n.op().writer().cloned())
    }

    /// Render the writer's next frame over the whole data window, bypassing every cache.
    fn write_step(&mut self, recursive: bool, writer: WriterRef) {
        if !recursive {
            let Some(range) = writer.range().or_else(|| self.timeline.range()) else {
                self.stop_engine();
                return;
            };
            self.writing = Some(WriteRun {
                writer,
                range,
                next: range.first,
            });
        }
        let Some((writer, range, frame)) = self
            .writing
            .as_ref()
            .map(|run| (run.writer.clone(), run.range, run.next))
        else {
            self.stop_engine();
            return;
        };
        tracing::Span::current().record("frame", frame.0);

        if frame > range.last {
            self.writing = None;
            match writer.sink().lock().end() {
                Ok(()) => tracing::info!(
                    writer = writer.name(),
                    frames = range.len_frames(),
                    "write finished"
                ),
                Err(e) => tracing::warn!(writer = writer.name(), error = %e, "sink failed to finish"),
            }
            self.stop_engine();
            return;
        }

        let params = writer.encoding();
        let region = self.resolve_region(frame, params.channels);
        let rows: Vec<i32> = (region.bounds.y..region.bounds.t).collect();
        let columns: Vec<i32> = (region.bounds.x..region.bounds.r).collect();
        let Some(rect) = TextureRect::from_visible(&rows, &columns) else {
            tracing::warn!(frame = frame.0, "empty data window, nothing to write");
            self.stop_engine();
            return;
        };

        if !recursive {
            let cfg = SinkConfig {
                width: rect.w,
                height: rect.h,
                fps: self.settings.fps,
                range,
                byte_mode: params.byte_mode,
            };
            if let Err(e) = writer.sink().lock().begin(cfg) {
                tracing::warn!(writer = writer.name(), error = %e, "sink refused to start");
                self.stop_engine();
                return;
            }
            tracing::info!(
                writer = writer.name(),
                first = range.first.0,
                last = range.last.0,
                "write started"
            );
        }

        let key = FrameKey {
            source: SourceId::new(self.source_name.clone(), frame),
            graph_hash: self.graph_hash,
            zoom: 1.0,
            exposure: params.exposure,
            lut: params.lut,
            byte_mode: params.byte_mode,
            channels: region.channels,
            data_window: region.bounds,
            display_window: region.display,
        };
        self.compute_fresh(
            FramePlan {
                frame,
                key,
                rect,
                rows,
            },
            columns,
            &region,
            1.0,
            params,
        );
    }

    /// Hand a computed frame to the writer's sink and schedule the next one.
    fn on_frame_written(&mut self, plan: FramePlan, outcome: JobOutcome) {
        self.stats.frames_rendered += 1;
        let Some(run) = self.writing.as_mut() else {
            self.stop_engine();
            return;
        };
        if outcome.rows_failed > 0 {
            tracing::warn!(
                frame = plan.frame.0,
                rows_failed = outcome.rows_failed,
                "incomplete frame, write stopped"
            );
            self.stop_engine();
            return;
        }
        let pushed = run.writer.sink().lock().push_frame(plan.frame, &outcome.transfer);
        if let Err(e) = pushed {
            tracing::warn!(frame = plan.frame.0, error = %e, "sink rejected frame, write stopped");
            self.stop_engine();
            return;
        }
        run.next = plan.frame.next();
        self.stats.frames_written += 1;
        self.timeline.seek(plan.frame);
        self.playback.frame_shown();
        self.state = EngineState::Requesting;
        self.events
            .push_back(EngineEvent::Step { recursive: true });
    }

    /// Display and data windows of `frame`, from the reader headers or the project format.
    ///
    /// `shown` limits the output's requested channels.
    fn resolve_region(&self, frame: FrameIndex, shown: ChannelSet) -> FrameRegion {
        let mut headers = Vec::with_capacity(self.readers.len());
        for (i, slot) in self.readers.iter().enumerate() {
            match slot.buffer.header(frame) {
                Ok(info) => headers.push((i, info)),
                Err(e) => tracing::warn!(
                    reader = slot.buffer.reader().name(),
                    frame = frame.0,
                    error = %e,
                    "frame header unavailable"
                ),
            }
        }

        let display = headers
            .first()
            .map(|(_, h)| h.display)
            .unwrap_or(self.settings.project_format);
        let has_generators = self.dag.inputs().iter().any(|id| {
            self.graph
                .node(*id)
                .is_some_and(|n| n.kind() == NodeKind::Input && n.op().frame_reader().is_none())
        });
        let data = headers
            .iter()
            .map(|(_, h)| h.data)
            .reduce(RectI::union)
            .map(|d| if has_generators { d.union(display.window) } else { d })
            .unwrap_or(display.window);

        let channels = self
            .dag
            .output()
            .and_then(|id| self.graph.node(id))
            .map(|n| n.requested_channels())
            .unwrap_or(ChannelSet::RGBA)
            & shown;

        FrameRegion {
            headers,
            display,
            bounds: data.intersect(display.window),
            channels,
        }
    }

    fn show_from_frame_cache(
        &mut self,
        frame: FrameIndex,
        key: &FrameKey,
        rect: TextureRect,
        region: &FrameRegion,
    ) -> bool {
        let hit = self.caches.frames.lock().retrieve_frame(key);
        let Some(cached) = hit else {
            return false;
        };
        if cached.rect != rect {
            tracing::debug!(frame = frame.0, "cached frame covers another region");
            return false;
        }
        self.state = EngineState::ComputingCached;
        if let Err(e) =
            self.surface
                .show_cached_frame(frame, cached.rect, cached.byte_mode, &cached.data)
        {
            tracing::warn!(frame = frame.0, error = %e, "cached frame rejected by surface");
            return false;
        }
        for (i, info) in &region.headers {
            if let Some(slot) = self.readers.get_mut(*i) {
                slot.buffer.register_cached(frame, *info);
            }
        }
        self.surface.frame_cached(frame);
        self.stats.frame_cache_hits += 1;
        self.stats.frames_displayed += 1;
        true
    }

    fn show_from_texture_cache(&mut self, frame: FrameIndex, key: &FrameKey, rect: TextureRect) -> bool {
        let texture_key = TextureKey {
            frame: key.clone(),
            rect,
        };
        let hit = self.caches.textures.lock().lookup(&texture_key);
        let Some(handle) = hit else {
            return false;
        };
        self.surface.show_texture(frame, handle);
        self.stats.texture_cache_hits += 1;
        self.stats.frames_displayed += 1;
        true
    }

    /// Request `rows` of `frame` from every reader and collect what was decoded.
    ///
    /// The first reader decodes on this thread; the rest alternate between background and
    /// foreground decodes so several readers overlap.
    fn decode_inputs(
        &mut self,
        frame: FrameIndex,
        rows: &[i32],
    ) -> HashMap<NodeId, Arc<DecodedImage>> {
        for (i, slot) in self.readers.iter_mut().enumerate() {
            let sync = if i % 2 == 0 {
                DecodeSync::Sync
            } else {
                DecodeSync::Async
            };
            if let Err(e) = slot.buffer.request(frame, Some(rows), sync) {
                tracing::warn!(
                    reader = slot.buffer.reader().name(),
                    frame = frame.0,
                    error = %e,
                    "decode request failed"
                );
            }
        }
        let mut images = HashMap::with_capacity(self.readers.len());
        for slot in &mut self.readers {
            match slot.buffer.image(frame) {
                Ok(Some(image)) => {
                    images.insert(slot.node, image);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    reader = slot.buffer.reader().name(),
                    frame = frame.0,
                    error = %e,
                    "decode failed"
                ),
            }
        }
        images
    }

    fn on_frame_computed(&mut self, outcome: JobOutcome) {
        if self
            .in_flight
            .take_if(|f| f.generation == outcome.generation)
            .is_none()
        {
            tracing::debug!(generation = outcome.generation, "stale frame job dropped");
            return;
        }
        self.stats.rows_computed += outcome.rows_computed as u64;
        self.stats.rows_reused += outcome.rows_reused as u64;
        self.stats.rows_failed += outcome.rows_failed as u64;

        if outcome.cancelled || self.playback.aborted {
            self.stats.cancelled_frames += 1;
            self.row_cache.clear();
            self.stop_engine();
            return;
        }
        let Some(plan) = self.current.take() else {
            self.stop_engine();
            return;
        };
        debug_assert_eq!(plan.frame, outcome.frame);
        if self.writing.is_some() {
            self.on_frame_written(plan, outcome);
            return;
        }

        self.state = EngineState::Uploading;
        let complete = outcome.rows_failed == 0;
        if complete {
            let stored = self
                .caches
                .frames
                .lock()
                .append_frame(plan.key.clone(), plan.rect, outcome.transfer.data());
            match stored {
                Ok(()) => self.surface.frame_cached(plan.frame),
                Err(e) => tracing::warn!(frame = plan.frame.0, error = %e, "frame not cached"),
            }
        } else {
            tracing::debug!(
                frame = plan.frame.0,
                rows_failed = outcome.rows_failed,
                "incomplete frame left uncached"
            );
        }

        match self.surface.upload(plan.frame, &outcome.transfer) {
            Ok(handle) => {
                if let Some(stale) = self.uncached_texture.take() {
                    self.surface.release_textures(&[stale]);
                }
                if complete {
                    let bytes = outcome.transfer.data().len() as u64;
                    let evicted = self.caches.textures.lock().insert(
                        TextureKey {
                            frame: plan.key,
                            rect: plan.rect,
                        },
                        handle,
                        bytes,
                    );
                    if !evicted.is_empty() {
                        self.surface.release_textures(&evicted);
                    }
                } else {
                    self.uncached_texture = Some(handle);
                }
            }
            Err(e) => tracing::warn!(frame = plan.frame.0, error = %e, "texture upload failed"),
        }
        self.stats.frames_rendered += 1;
        self.stats.frames_displayed += 1;
        self.advance_loop(plan.frame, &plan.rows);
    }

    /// Count the shown frame, prefetch and pace the next one, then schedule it.
    fn advance_loop(&mut self, frame: FrameIndex, rows: &[i32]) {
        self.timeline.seek(frame);
        self.playback.frame_shown();
        let more = self.playback.continues();

        if more && self.settings.prefetch_next_frame && !self.playback.same_frame {
            if let Some(next) = self
                .timeline
                .peek(self.playback.forward, self.playback.loop_mode)
            {
                for slot in &mut self.readers {
                    if let Err(e) = slot.buffer.prefetch(next, Some(rows)) {
                        tracing::debug!(frame = next.0, error = %e, "prefetch failed");
                    }
                }
            }
        }

        if more && !self.playback.same_frame {
            self.timer
                .wait_until_next_frame_due(self.settings.throttle_playback);
        }
        let interval = u64::from(self.settings.fps_refresh_interval.max(1));
        if self.playback.frame_request_index % interval == 0
            && let Some(fps) = self.timer.actual_frame_rate()
        {
            self.surface.fps_changed(fps);
        }

        self.state = EngineState::Requesting;
        self.events
            .push_back(EngineEvent::Step { recursive: true });
    }
}

fn build_thread_pool(threads: Option<usize>) -> PlayheadResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(PlayheadError::validation(
            "worker_threads must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("playhead-row-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| PlayheadError::validation(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/playback/engine.rs"]
mod tests;
