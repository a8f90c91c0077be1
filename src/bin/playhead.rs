use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

use parking_lot::Mutex;
use playhead::{
    EngineSettings, FrameCache, FrameCacheOpts, FrameIndex, FrameRange, FrameReader,
    HeadlessSurface, ImageSequenceReader, ImageSequenceSink, NodeGraph, NodeId, NodeOp,
    PlaybackEngine, ProceduralReader, Viewport, WriterRef,
};

#[derive(Parser, Debug)]
#[command(name = "playhead", version)]
struct Cli {
    /// Engine settings JSON. Missing keys take their defaults.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Frame cache directory, overriding the settings file.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a source through an optional gain node into a headless viewer and print stats.
    Play(PlayArgs),
    /// Render a source through an optional gain node into numbered image files.
    Write(WriteArgs),
    /// Inspect or wipe the frame cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Parser, Debug)]
struct SourceArgs {
    /// Numbered image sequence, e.g. `shots/plate.####.png`. A synthetic gradient is used
    /// when omitted.
    #[arg(long)]
    sequence: Option<String>,

    /// First frame of the source.
    #[arg(long, default_value_t = 1)]
    first: i64,

    /// Last frame of the source.
    #[arg(long, default_value_t = 24)]
    last: i64,

    /// Size of the synthetic source.
    #[arg(long, default_value = "320x180", value_parser = parse_size)]
    size: (u32, u32),

    /// Per-channel gain (one value, or four comma-separated RGBA values).
    #[arg(long, value_delimiter = ',')]
    gain: Vec<f32>,

    /// Override rayon worker threads.
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Viewer size in screen pixels.
    #[arg(long, default_value = "320x180", value_parser = parse_size)]
    viewport: (u32, u32),

    /// Frames to show. Defaults to the whole range once.
    #[arg(long)]
    frames: Option<i64>,

    /// Play backwards.
    #[arg(long, default_value_t = false)]
    reverse: bool,

    /// Wrap at the range ends.
    #[arg(long = "loop", default_value_t = false)]
    loop_mode: bool,

    /// Sleep between frames to hold the configured fps.
    #[arg(long, default_value_t = false)]
    throttle: bool,
}

#[derive(Parser, Debug)]
struct WriteArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output pattern, e.g. `out/comp.####.png`. The extension picks the file format.
    #[arg(long)]
    output: String,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Print entry count and sizes.
    Stats,
    /// Delete every fragment and the index.
    Clear,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.settings {
        Some(path) => EngineSettings::from_path(path)
            .with_context(|| format!("load settings '{}'", path.display()))?,
        None => EngineSettings::default(),
    };
    if let Some(dir) = cli.cache_dir {
        settings.cache_dir = dir;
    }

    match cli.cmd {
        Command::Play(args) => cmd_play(settings, args),
        Command::Write(args) => cmd_write(settings, args),
        Command::Cache(CacheCommand::Stats) => cmd_cache_stats(&settings),
        Command::Cache(CacheCommand::Clear) => cmd_cache_clear(&settings),
    }
}

fn source_range(args: &SourceArgs) -> anyhow::Result<FrameRange> {
    Ok(FrameRange::new(FrameIndex(args.first), FrameIndex(args.last))?)
}

/// `source -> [gain] -> terminal`, returning the terminal node.
fn build_graph(
    args: &SourceArgs,
    range: FrameRange,
    terminal: NodeOp,
) -> anyhow::Result<(NodeGraph, NodeId)> {
    let reader: Arc<dyn FrameReader> = match &args.sequence {
        Some(pattern) => Arc::new(
            ImageSequenceReader::new(pattern, range)
                .with_context(|| format!("open sequence '{pattern}'"))?,
        ),
        None => Arc::new(ProceduralReader::new(
            "gradient",
            range,
            args.size.0,
            args.size.1,
        )),
    };

    let mut graph = NodeGraph::new();
    let source = graph.add_node("source", NodeOp::reader(reader));
    let mut last = source;
    if !args.gain.is_empty() {
        let rgba = match args.gain.as_slice() {
            [g] => [*g, *g, *g, 1.0],
            [r, g, b, a] => [*r, *g, *b, *a],
            other => anyhow::bail!("--gain takes 1 or 4 values, got {}", other.len()),
        };
        let gain = graph.add_node("gain", NodeOp::Gain { rgba });
        graph.connect(gain, 0, last)?;
        last = gain;
    }
    let out = graph.add_node("output", terminal);
    graph.connect(out, 0, last)?;
    Ok((graph, out))
}

fn cmd_play(mut settings: EngineSettings, args: PlayArgs) -> anyhow::Result<()> {
    let range = source_range(&args.source)?;
    settings.loop_mode = args.loop_mode;
    settings.throttle_playback = args.throttle;
    if args.source.threads.is_some() {
        settings.worker_threads = args.source.threads;
    }
    let (graph, viewer) = build_graph(&args.source, range, NodeOp::Viewer)?;

    let surface = HeadlessSurface::new(Viewport::new(args.viewport.0, args.viewport.1));
    let mut engine = PlaybackEngine::new(settings, surface).context("start playback engine")?;
    engine.load_graph(Arc::new(graph), viewer);
    let start = if args.reverse { range.last } else { range.first };
    engine.set_current_frame(start);

    let frames = args
        .frames
        .unwrap_or_else(|| i64::try_from(range.len_frames()).unwrap_or(i64::MAX));
    engine.start_playback(frames, true, !args.reverse, false);
    engine.run_until_idle();
    engine.shutdown().context("save frame cache")?;

    let stats = engine.stats();
    let surface = engine.surface();
    println!("frames_displayed={}", stats.frames_displayed);
    println!("frames_rendered={}", stats.frames_rendered);
    println!("frame_cache_hits={}", stats.frame_cache_hits);
    println!("texture_cache_hits={}", stats.texture_cache_hits);
    println!("rows_computed={}", stats.rows_computed);
    println!("rows_reused={}", stats.rows_reused);
    println!("rows_failed={}", stats.rows_failed);
    if let Some(fps) = surface.fps_readouts().last() {
        println!("fps={fps:.1}");
    }
    Ok(())
}

fn cmd_write(mut settings: EngineSettings, args: WriteArgs) -> anyhow::Result<()> {
    let range = source_range(&args.source)?;
    settings.throttle_playback = false;
    if args.source.threads.is_some() {
        settings.worker_threads = args.source.threads;
    }
    let sink = Arc::new(Mutex::new(
        ImageSequenceSink::new(&args.output)
            .with_context(|| format!("output pattern '{}'", args.output))?,
    ));
    let writer = WriterRef::new("write", Arc::clone(&sink)).with_range(range);
    let (graph, out) = build_graph(&args.source, range, NodeOp::Writer(writer))?;

    let surface = HeadlessSurface::new(Viewport::new(args.source.size.0, args.source.size.1));
    let mut engine = PlaybackEngine::new(settings, surface).context("start playback engine")?;
    engine.load_graph(Arc::new(graph), out);
    engine.start_writing();
    engine.run_until_idle();
    engine.shutdown().context("save frame cache")?;

    let stats = engine.stats();
    println!("frames_written={}", stats.frames_written);
    println!("files={}", sink.lock().written().len());
    println!("rows_failed={}", stats.rows_failed);
    if stats.frames_written < range.len_frames() {
        anyhow::bail!(
            "wrote {} of {} frames",
            stats.frames_written,
            range.len_frames()
        );
    }
    Ok(())
}

fn cmd_cache_stats(settings: &EngineSettings) -> anyhow::Result<()> {
    let cache = FrameCache::open(FrameCacheOpts::from_settings(settings))
        .with_context(|| format!("open cache '{}'", settings.cache_dir.display()))?;
    let stats = cache.stats();
    println!("dir={}", cache.dir().display());
    println!("entries={}", stats.entries);
    println!("disk_bytes={}", stats.disk_bytes);
    Ok(())
}

fn cmd_cache_clear(settings: &EngineSettings) -> anyhow::Result<()> {
    let mut cache = FrameCache::open(FrameCacheOpts::from_settings(settings))
        .with_context(|| format!("open cache '{}'", settings.cache_dir.display()))?;
    let entries = cache.len();
    cache.clear_disk().context("clear cache")?;
    println!("cleared={entries}");
    Ok(())
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let h: u32 = h.parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    if w == 0 || h == 0 {
        return Err(format!("size must be non-zero, got '{s}'"));
    }
    Ok((w, h))
}
