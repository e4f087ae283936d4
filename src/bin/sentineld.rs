//! sentineld - live PPE and restricted-zone monitor
//!
//! Pulls frames from the configured source, runs detection, records
//! violations, and fans alerts out until the stream ends, Ctrl-C is pressed,
//! or `q` + Enter is typed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use ppe_sentinel::detect::backend_from_settings;
use ppe_sentinel::{
    run, FrameSource, MonitorSession, PreviewSink, SentinelConfig, SinkSet, StopSignal,
    StreamServer,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML when the name ends in .toml).
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source; overrides the config file.
    #[arg(long)]
    source: Option<String>,
    /// Annotated preview image rewritten every frame.
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Serve the annotated feed as MJPEG on this address (e.g. 127.0.0.1:8090).
    #[arg(long)]
    stream: Option<String>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Do not read stop keys from stdin (for service managers).
    #[arg(long)]
    no_keys: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = SentinelConfig::load(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(preview) = args.preview {
        cfg.display.preview_path = Some(preview);
    }
    if args.stream.is_some() {
        cfg.display.stream_addr = args.stream;
    }
    if args.max_frames.is_some() {
        cfg.source.max_frames = args.max_frames;
    }
    log::info!(
        "sentineld {} monitoring {} at {} (checks: {:?}, cooldown {}s)",
        env!("CARGO_PKG_VERSION"),
        cfg.source.url,
        cfg.location,
        cfg.checks,
        cfg.cooldown.as_secs()
    );

    let mut detector = backend_from_settings(&cfg.model)?;
    detector
        .warm_up()
        .with_context(|| format!("warm up {} detector", detector.name()))?;

    let mut session = MonitorSession::from_config(&cfg)?;
    let mut sinks = SinkSet::new();
    if let Some(path) = &cfg.display.preview_path {
        log::info!("preview: {}", path.display());
        sinks.push(PreviewSink::new(path)?);
    }
    let stream = match &cfg.display.stream_addr {
        Some(addr) => {
            let (handle, sink) = StreamServer::new(addr.clone()).spawn()?;
            sinks.push(sink);
            Some(handle)
        }
        None => None,
    };

    let stop = StopSignal::new();
    stop.install_ctrlc()?;
    if !args.no_keys {
        stop.watch_stdin()?;
    }

    let mut source = FrameSource::open(&cfg.source)?;
    source.connect()?;

    let outcome = run(
        &mut source,
        detector.as_mut(),
        &mut session,
        &mut sinks,
        &stop,
        cfg.source.max_frames,
    );
    if let Some(handle) = stream {
        handle.stop()?;
    }
    let stats = session.finish()?;
    let summary = outcome?;
    log::info!(
        "stopped: {} frame(s), {} detection(s), {} violation(s), {} record(s), {} alert(s), {} storage failure(s)",
        summary.frames,
        summary.detections,
        summary.violations,
        summary.records,
        summary.alerts,
        stats.storage_failures
    );
    Ok(())
}
