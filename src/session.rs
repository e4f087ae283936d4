//! The monitoring loop.
//!
//! `MonitorSession` owns everything with state: the rule set, the cooldown
//! map, the snapshot writer and record log, the annotator, and the alert
//! dispatcher. `run` drives it from a `FrameSource` until the stream ends or a
//! stop is requested.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;

use crate::alert::summary::{readable_names, summary_sentence, ZONE_SENTENCE};
use crate::alert::{Alert, AlertDispatcher, DispatchReport, DispatchWorker};
use crate::annotate::Annotator;
use crate::config::{RecordFormat, SentinelConfig};
use crate::cooldown::CooldownTracker;
use crate::detect::{Detection, DetectorBackend};
use crate::display::{FrameSink, StopSignal};
use crate::evaluate::{Check, LabelRule, Violation, ViolationRules, ZoneRule};
use crate::ingest::FrameSource;
use crate::storage::{
    CsvViolationLog, JsonSidecarLog, SnapshotWriter, ViolationLog, ViolationRecord,
};
use crate::zone::Zone;

const DEFAULT_SUBJECT: &str = "PPE Violation Alert";

/// What one frame produced.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub detections: usize,
    pub total_people: usize,
    pub violations: Vec<Violation>,
    /// Records persisted for this frame, one per violation type that was out
    /// of cooldown.
    pub records: Vec<ViolationRecord>,
    /// Violation types seen but still cooling down.
    pub suppressed: Vec<String>,
    pub alert: Option<Alert>,
    /// Present when alerts were delivered inline.
    pub dispatch: Option<DispatchReport>,
}

/// Counters over the life of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Violations evaluated, whether or not they were persisted.
    pub violations_seen: u64,
    pub records_written: u64,
    pub alerts_sent: u64,
    pub storage_failures: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub detections: u64,
    pub violations: u64,
    pub records: u64,
    pub alerts: u64,
    pub storage_failures: u64,
}

enum AlertRoute {
    Inline(AlertDispatcher),
    Background(DispatchWorker),
}

pub struct MonitorSession {
    location: String,
    rules: ViolationRules,
    cooldown: CooldownTracker,
    snapshots: SnapshotWriter,
    log: Box<dyn ViolationLog>,
    annotator: Annotator,
    alerts: AlertRoute,
    subject: String,
    message_prefix: String,
    stats: SessionStats,
}

impl MonitorSession {
    pub fn new(
        location: impl Into<String>,
        rules: ViolationRules,
        snapshots: SnapshotWriter,
        log: Box<dyn ViolationLog>,
    ) -> Self {
        Self {
            location: location.into(),
            rules,
            cooldown: CooldownTracker::default(),
            snapshots,
            log,
            annotator: Annotator::new(),
            alerts: AlertRoute::Inline(AlertDispatcher::new()),
            subject: DEFAULT_SUBJECT.to_string(),
            message_prefix: String::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn from_config(cfg: &SentinelConfig) -> Result<Self> {
        let label = LabelRule::new(
            cfg.rules.violation_labels.iter().cloned(),
            cfg.rules.confidence_threshold,
        )?;
        let zone = match &cfg.zone {
            Some(points) => Some(
                ZoneRule::new(Zone::new(points.clone()).context("invalid zone polygon")?)
                    .with_subjects(cfg.rules.zone_subjects.clone())
                    .with_violation_type(cfg.rules.zone_violation_type.clone()),
            ),
            None => None,
        };
        let rules = ViolationRules::new(cfg.checks.clone(), label, zone)?
            .with_negation_prefix(cfg.rules.negation_prefix.clone());

        let snapshots = SnapshotWriter::new(&cfg.storage.snapshot_dir)
            .with_prefix(cfg.storage.snapshot_prefix.clone())
            .with_extension(cfg.storage.image_extension.clone());
        let log: Box<dyn ViolationLog> = match cfg.storage.record_format {
            RecordFormat::Csv => Box::new(CsvViolationLog::new(&cfg.storage.csv_path)),
            RecordFormat::Json => Box::new(JsonSidecarLog::new()),
        };

        let dispatcher = AlertDispatcher::from_settings(&cfg.alerts)?;
        log::info!(
            "alert channels: {}",
            if dispatcher.is_empty() {
                "none".to_string()
            } else {
                dispatcher.channel_names().join(", ")
            }
        );
        let mut session = Self::new(cfg.location.clone(), rules, snapshots, log)
            .with_cooldown(cfg.cooldown)
            .with_annotator(Annotator::from_settings(&cfg.display)?)
            .with_subject(cfg.alerts.subject.clone())
            .with_message_prefix(cfg.alerts.message_prefix.clone());
        session = if cfg.alerts.background {
            session.with_background_dispatch(dispatcher)?
        } else {
            session.with_dispatcher(dispatcher)
        };
        Ok(session)
    }

    pub fn with_cooldown(mut self, window: Duration) -> Self {
        self.cooldown = CooldownTracker::new(window);
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.alerts = AlertRoute::Inline(dispatcher);
        self
    }

    /// Deliver alerts from a worker thread.
    pub fn with_background_dispatch(mut self, dispatcher: AlertDispatcher) -> Result<Self> {
        self.alerts = AlertRoute::Background(DispatchWorker::spawn(dispatcher)?);
        Ok(self)
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_message_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.message_prefix = prefix.into();
        self
    }

    pub fn rules(&self) -> &ViolationRules {
        &self.rules
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Evaluate one frame's detections, draw overlays onto `image`, persist
    /// a record for every violation type that is out of cooldown, and send
    /// one alert covering them.
    ///
    /// A storage failure skips that type (its cooldown is left untouched so
    /// the next frame retries) and is returned as `Err` once the remaining
    /// types and the alert have been handled.
    pub fn process_frame(
        &mut self,
        image: &mut RgbImage,
        detections: &[Detection],
        now: DateTime<Local>,
    ) -> Result<FrameReport> {
        let mut report = FrameReport {
            detections: detections.len(),
            total_people: detections.iter().filter(|d| d.is_person()).count(),
            ..FrameReport::default()
        };
        report.violations = detections
            .iter()
            .flat_map(|det| self.rules.evaluate(det))
            .collect();
        self.stats.violations_seen += report.violations.len() as u64;

        self.annotate(image, detections, &report);

        let mut candidates: Vec<(Check, String)> = Vec::new();
        for violation in &report.violations {
            if !candidates
                .iter()
                .any(|(_, kind)| kind.as_str() == violation.violation_type)
            {
                candidates.push((violation.check, violation.violation_type.clone()));
            }
        }

        let mut fired: Vec<(Check, String)> = Vec::new();
        let mut storage_error = None;
        for (check, kind) in candidates {
            if !self.cooldown.should_fire(&kind, now) {
                log::debug!("{} still cooling down", kind);
                report.suppressed.push(kind);
                continue;
            }
            match self.persist(image, &kind, report.total_people, now) {
                Ok(record) => {
                    self.cooldown.record_fired(&kind, now);
                    self.stats.records_written += 1;
                    log::info!(
                        "violation recorded: {} at {} ({})",
                        kind,
                        self.location,
                        record.snapshot.display()
                    );
                    report.records.push(record);
                    fired.push((check, kind));
                }
                Err(e) => {
                    self.stats.storage_failures += 1;
                    log::error!("failed to persist {} violation: {:#}", kind, e);
                    if storage_error.is_none() {
                        storage_error = Some(e);
                    }
                }
            }
        }

        if !report.records.is_empty() {
            let alert = self.build_alert(&fired, &report.records);
            report.dispatch = self.send(&alert);
            report.alert = Some(alert);
        }

        match storage_error {
            Some(e) => Err(e.context(format!("frame storage failed at {}", self.location))),
            None => Ok(report),
        }
    }

    /// Stop the alert worker, if any, after it drains.
    pub fn finish(self) -> Result<SessionStats> {
        if let AlertRoute::Background(worker) = self.alerts {
            let delivered = worker.stop()?;
            log::debug!("alert worker drained after {} alert(s)", delivered);
        }
        Ok(self.stats)
    }

    fn annotate(&self, image: &mut RgbImage, detections: &[Detection], report: &FrameReport) {
        let zone_rule = self
            .rules
            .zone_rule()
            .filter(|_| self.rules.is_enabled(Check::Zone));
        if let Some(rule) = zone_rule {
            self.annotator.zone(image, rule.zone());
        }
        for det in detections {
            self.annotator
                .detection(image, det, self.rules.is_negative_label(&det.label));
            if let Some(rule) = zone_rule {
                if rule.applies_to(det) {
                    self.annotator.center(image, det.bbox.center());
                }
            }
        }
        let mut zone_hit = false;
        for violation in report.violations.iter().filter(|v| v.check == Check::Zone) {
            self.annotator.zone_violation(image, &violation.bbox);
            zone_hit = true;
        }
        if zone_hit {
            self.annotator.zone_banner(image);
        }
        self.annotator.people_count(image, report.total_people);
    }

    fn persist(
        &mut self,
        image: &RgbImage,
        violation_type: &str,
        total_people: usize,
        now: DateTime<Local>,
    ) -> Result<ViolationRecord> {
        let snapshot = self.snapshots.write(image, violation_type, now)?;
        let record = ViolationRecord {
            timestamp: now,
            violation_type: violation_type.to_string(),
            location: self.location.clone(),
            snapshot,
            total_people,
        };
        if let Err(e) = self.log.append(&record) {
            if let Err(cleanup) = self.snapshots.discard(&record.snapshot) {
                log::warn!("{:#}", cleanup);
            }
            return Err(e);
        }
        Ok(record)
    }

    fn build_alert(&self, fired: &[(Check, String)], records: &[ViolationRecord]) -> Alert {
        let ppe: Vec<&str> = fired
            .iter()
            .filter(|(check, _)| *check == Check::Ppe)
            .map(|(_, kind)| kind.as_str())
            .collect();
        let names = readable_names(&ppe, self.rules.negation_prefix());
        let mut sentences: Vec<String> = summary_sentence(&names).into_iter().collect();
        if fired.iter().any(|(check, _)| *check == Check::Zone) {
            sentences.push(ZONE_SENTENCE.to_string());
        }
        let summary = sentences.join(" ");
        let location = format!("Location: {}.", self.location);
        let message = [self.message_prefix.trim(), summary.as_str(), location.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Alert {
            subject: self.subject.clone(),
            summary,
            message,
            location: self.location.clone(),
            violation_types: fired.iter().map(|(_, kind)| kind.clone()).collect(),
            snapshots: records.iter().map(|r| r.snapshot.clone()).collect(),
        }
    }

    fn send(&mut self, alert: &Alert) -> Option<DispatchReport> {
        match &self.alerts {
            AlertRoute::Inline(dispatcher) => {
                if dispatcher.is_empty() {
                    return None;
                }
                self.stats.alerts_sent += 1;
                Some(dispatcher.dispatch(alert))
            }
            AlertRoute::Background(worker) => {
                match worker.submit(alert.clone()) {
                    Ok(()) => self.stats.alerts_sent += 1,
                    Err(e) => log::warn!("alert not queued: {:#}", e),
                }
                None
            }
        }
    }
}

/// Pull frames until the source ends, `stop` is set, or `max_frames` frames
/// have been processed.
///
/// Source and detector errors end the run and are returned. Storage errors
/// are logged and counted; the loop keeps going.
pub fn run(
    source: &mut FrameSource,
    detector: &mut dyn DetectorBackend,
    session: &mut MonitorSession,
    sink: &mut dyn FrameSink,
    stop: &StopSignal,
    max_frames: Option<u64>,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();
    let start = session.stats();
    loop {
        if stop.is_stopped() {
            log::info!("stop requested after {} frame(s)", summary.frames);
            break;
        }
        if max_frames.is_some_and(|max| summary.frames >= max) {
            break;
        }
        let Some(mut frame) = source.next_frame().context("frame acquisition failed")? else {
            if source.is_healthy() {
                log::info!("source {} ended", source.stats().source);
            } else {
                log::warn!("source {} ended unhealthy", source.stats().source);
            }
            break;
        };
        let detections = match detector.detect(&frame.image) {
            Ok(detections) => detections,
            Err(e) => {
                log::error!(
                    "{} detection failed on frame {}: {:#}",
                    detector.name(),
                    frame.index,
                    e
                );
                return Err(e.context(format!("detection failed on frame {}", frame.index)));
            }
        };
        summary.frames += 1;
        summary.detections += detections.len() as u64;

        match session.process_frame(&mut frame.image, &detections, frame.captured_at) {
            Ok(report) => {
                log::debug!(
                    "frame {}: {} detection(s), {} violation(s), {} record(s)",
                    frame.index,
                    report.detections,
                    report.violations.len(),
                    report.records.len()
                );
            }
            Err(e) => log::error!("frame {}: {:#}", frame.index, e),
        }

        if let Err(e) = sink.render(&frame.image) {
            log::warn!("preview update failed: {:#}", e);
        }
    }

    let end = session.stats();
    summary.violations = end.violations_seen - start.violations_seen;
    summary.records = end.records_written - start.records_written;
    summary.alerts = end.alerts_sent - start.alerts_sent;
    summary.storage_failures = end.storage_failures - start.storage_failures;
    Ok(summary)
}
