//! One-shot checks of a single still image.
//!
//! Unlike the live loop, the image is evaluated at its own resolution so
//! detection boxes and zone points given in image pixels line up with it, and
//! records default to per-event JSON sidecars next to each snapshot.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;

use crate::config::{BackendKind, RecordFormat, SentinelConfig};
use crate::detect::{backend_from_settings, Detection};
use crate::frame::Frame;
use crate::session::{FrameReport, MonitorSession};
use crate::ui::Ui;

/// Overrides applied on top of the loaded configuration.
#[derive(Clone, Debug)]
pub struct StillOptions {
    /// JSON detections for the image; selects the scripted backend.
    pub detections: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub record_format: RecordFormat,
    pub alerts: bool,
}

impl Default for StillOptions {
    fn default() -> Self {
        Self {
            detections: None,
            out_dir: None,
            record_format: RecordFormat::Json,
            alerts: true,
        }
    }
}

impl StillOptions {
    pub fn apply(&self, cfg: &mut SentinelConfig) {
        if let Some(path) = &self.detections {
            cfg.model.backend = BackendKind::Scripted;
            cfg.model.detections_path = Some(path.clone());
        }
        if let Some(dir) = &self.out_dir {
            cfg.storage.snapshot_dir = dir.clone();
        }
        cfg.storage.record_format = self.record_format;
        if !self.alerts {
            cfg.alerts.sound = None;
            cfg.alerts.speech = None;
            cfg.alerts.whatsapp = None;
            cfg.alerts.email = None;
        }
        cfg.alerts.background = false;
    }
}

#[derive(Debug)]
pub struct StillCheck {
    pub detections: Vec<Detection>,
    pub report: FrameReport,
}

/// Detect, evaluate, record and alert for one image.
pub fn check_image(
    cfg: &SentinelConfig,
    image: RgbImage,
    now: DateTime<Local>,
    ui: &Ui,
) -> Result<StillCheck> {
    let mut frame = Frame::new(image, 1).with_captured_at(now);

    let stage = ui.stage("detect objects");
    let mut detector = backend_from_settings(&cfg.model)?;
    let detections = match detector.detect(&frame.image) {
        Ok(detections) => detections,
        Err(e) => {
            stage.fail(&e);
            return Err(e);
        }
    };
    stage.note(&format!(
        "{} detection(s) on {}x{}",
        detections.len(),
        frame.width(),
        frame.height()
    ));
    drop(stage);

    let stage = ui.stage("evaluate and record");
    let mut session = MonitorSession::from_config(cfg)?;
    let report = match session.process_frame(&mut frame.image, &detections, frame.captured_at) {
        Ok(report) => report,
        Err(e) => {
            stage.fail(&e);
            return Err(e);
        }
    };
    stage.note(&format!("{} record(s)", report.records.len()));
    drop(stage);
    session.finish().context("drain alerts")?;

    Ok(StillCheck { detections, report })
}
