//! snapshot_check - evaluate a single still image
//!
//! Runs the same rules, evidence writers and alert channels as the live
//! monitor against one image, then prints a JSON report on stdout. Records
//! default to JSON sidecars next to each snapshot.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use ppe_sentinel::config::RecordFormat;
use ppe_sentinel::ui::{Ui, UiMode};
use ppe_sentinel::{check_image, SentinelConfig, StillOptions};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to check (jpg or png).
    image: PathBuf,
    /// JSON detections for the image; selects the scripted backend.
    #[arg(long)]
    detections: Option<PathBuf>,
    /// Config file (JSON, or TOML when the name ends in .toml).
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
    /// Snapshot directory; overrides the config file.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Where violation records go.
    #[arg(long, value_enum, default_value_t = RecordFormat::Json)]
    record_format: RecordFormat,
    /// Skip every alert channel.
    #[arg(long)]
    no_alerts: bool,
    /// Progress output.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::detect(args.ui);

    let stage = ui.stage("load configuration");
    let mut cfg = SentinelConfig::load(args.config.as_deref())?;
    let options = StillOptions {
        detections: args.detections,
        out_dir: args.out_dir,
        record_format: args.record_format,
        alerts: !args.no_alerts,
    };
    options.apply(&mut cfg);
    stage.note(&format!("location {}, checks {:?}", cfg.location, cfg.checks));
    drop(stage);

    let stage = ui.stage("read image");
    let image = image::open(&args.image)
        .with_context(|| format!("open {}", args.image.display()))?
        .into_rgb8();
    drop(stage);

    let check = check_image(&cfg, image, Local::now(), &ui)?;
    let report = &check.report;

    let output = json!({
        "image": args.image.display().to_string(),
        "detections": check.detections,
        "total_people": report.total_people,
        "violations": report
            .violations
            .iter()
            .map(|v| json!({
                "check": v.check,
                "type": v.violation_type,
                "label": v.label,
                "confidence": v.confidence,
                "box": v.bbox,
            }))
            .collect::<Vec<_>>(),
        "snapshots": report
            .records
            .iter()
            .map(|r| r.snapshot.display().to_string())
            .collect::<Vec<_>>(),
        "alert": report.alert.as_ref().map(|a| a.summary.clone()),
        "failed_channels": report
            .dispatch
            .as_ref()
            .map(|d| d.failed.iter().map(|f| f.channel).collect::<Vec<_>>())
            .unwrap_or_default(),
    });
    let rendered =
        serde_json::to_string_pretty(&output).map_err(|e| anyhow!("render report: {}", e))?;
    println!("{}", rendered);
    Ok(())
}
