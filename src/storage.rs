use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Timestamp format used in snapshot names and JSON sidecars.
pub const COMPACT_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
/// Timestamp format used in CSV rows.
pub const CSV_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const CSV_HEADER: &str = "timestamp,violation_type,total_people";

/// A persisted violation. Written once, never updated.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    pub timestamp: DateTime<Local>,
    pub violation_type: String,
    pub location: String,
    pub snapshot: PathBuf,
    pub total_people: usize,
}

/// Append-only sink for violation records.
pub trait ViolationLog: Send {
    fn append(&mut self, record: &ViolationRecord) -> Result<()>;
}

// -------------------- Snapshots --------------------

/// Writes annotated frames under a directory with unique, time-derived names.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "violation".to_string(),
            extension: "jpg".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// File extension, which also selects the encoder (`jpg` or `png`).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_lowercase();
        self
    }

    /// Remove a snapshot whose record could not be written.
    pub fn discard(&self, snapshot: &Path) -> Result<()> {
        fs::remove_file(snapshot)
            .with_context(|| format!("remove orphaned snapshot {}", snapshot.display()))
    }

    /// Save `image` and return the path written.
    pub fn write(
        &self,
        image: &RgbImage,
        violation_type: &str,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create snapshot dir {}", self.dir.display()))?;
        let path = self.unique_path(violation_type, now)?;
        image
            .save(&path)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }

    fn unique_path(&self, violation_type: &str, now: DateTime<Local>) -> Result<PathBuf> {
        let stem = format!(
            "{}_{}_{}",
            self.prefix,
            now.format(COMPACT_TIME_FORMAT),
            slug(violation_type)
        );
        let first = self.dir.join(format!("{}.{}", stem, self.extension));
        if !first.exists() {
            return Ok(first);
        }
        for n in 1..10_000u32 {
            let candidate = self.dir.join(format!("{}_{}.{}", stem, n, self.extension));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(anyhow!("no free snapshot name for {}", stem))
    }
}

fn slug(value: &str) -> String {
    let slug: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        "event".to_string()
    } else {
        trimmed.to_string()
    }
}

// -------------------- JSON sidecars --------------------

#[derive(Serialize)]
struct SidecarJson<'a> {
    timestamp: String,
    location: &'a str,
    file: String,
}

/// Writes `<snapshot>.json` next to each snapshot.
#[derive(Clone, Debug, Default)]
pub struct JsonSidecarLog;

impl JsonSidecarLog {
    pub fn new() -> Self {
        Self
    }

    pub fn sidecar_path(snapshot: &Path) -> PathBuf {
        let mut name = snapshot.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}

impl ViolationLog for JsonSidecarLog {
    fn append(&mut self, record: &ViolationRecord) -> Result<()> {
        let path = Self::sidecar_path(&record.snapshot);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create sidecar dir {}", parent.display()))?;
        }
        let body = SidecarJson {
            timestamp: record.timestamp.format(COMPACT_TIME_FORMAT).to_string(),
            location: &record.location,
            file: record.snapshot.display().to_string(),
        };
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("create sidecar {}", path.display()))?;
        serde_json::to_writer_pretty(file, &body)
            .with_context(|| format!("write sidecar {}", path.display()))?;
        Ok(())
    }
}

// -------------------- CSV log --------------------

/// Appends one row per record to a CSV file with a fixed header.
#[derive(Clone, Debug)]
pub struct CsvViolationLog {
    path: PathBuf,
}

impl CsvViolationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ViolationLog for CsvViolationLog {
    fn append(&mut self, record: &ViolationRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open csv log {}", self.path.display()))?;
        let is_empty = file
            .metadata()
            .with_context(|| format!("stat csv log {}", self.path.display()))?
            .len()
            == 0;

        let mut out = String::new();
        if is_empty {
            out.push_str(CSV_HEADER);
            out.push('\n');
        }
        let timestamp = record.timestamp.format(CSV_TIME_FORMAT).to_string();
        let total_people = record.total_people.to_string();
        out.push_str(&csv_row(&[
            timestamp.as_str(),
            record.violation_type.as_str(),
            total_people.as_str(),
        ]));
        file.write_all(out.as_bytes())
            .with_context(|| format!("append csv log {}", self.path.display()))?;
        Ok(())
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
    row.push('\n');
    row
}

fn csv_field(field: &str) -> String {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// -------------------- In-memory --------------------

/// Keeps records in memory; for dry runs and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryViolationLog {
    records: Vec<ViolationRecord>,
}

impl MemoryViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ViolationRecord] {
        &self.records
    }
}

impl ViolationLog for MemoryViolationLog {
    fn append(&mut self, record: &ViolationRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 5, 14, 7, 9)
            .single()
            .expect("valid local time")
    }

    fn record(snapshot: PathBuf, violation_type: &str) -> ViolationRecord {
        ViolationRecord {
            timestamp: now(),
            violation_type: violation_type.to_string(),
            location: "Zone 1".to_string(),
            snapshot,
            total_people: 2,
        }
    }

    #[test]
    fn snapshot_names_never_collide_within_a_second() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = SnapshotWriter::new(dir.path().join("violations"));
        let image = RgbImage::new(8, 8);

        let first = writer.write(&image, "no_mask", now())?;
        let second = writer.write(&image, "no_mask", now())?;
        let third = writer.write(&image, "no_mask", now())?;

        assert_ne!(first, second);
        assert_ne!(second, third);
        assert!(first.exists() && second.exists() && third.exists());
        assert_eq!(
            first.file_name().and_then(|n| n.to_str()),
            Some("violation_20240305_140709_no_mask.jpg")
        );
        assert_eq!(
            second.file_name().and_then(|n| n.to_str()),
            Some("violation_20240305_140709_no_mask_1.jpg")
        );
        Ok(())
    }

    #[test]
    fn snapshot_slug_handles_free_text_types() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = SnapshotWriter::new(dir.path())
            .with_prefix("zone_violation")
            .with_extension(".PNG");
        let path = writer.write(&RgbImage::new(4, 4), "Person in Restricted Zone", now())?;
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("zone_violation_20240305_140709_person_in_restricted_zone.png")
        );
        Ok(())
    }

    #[test]
    fn sidecar_contains_timestamp_location_and_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let snapshot = dir.path().join("violation_20240305_140709_no_mask.jpg");
        let mut log = JsonSidecarLog::new();
        log.append(&record(snapshot.clone(), "no_mask"))?;

        let raw = fs::read_to_string(JsonSidecarLog::sidecar_path(&snapshot))?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        assert_eq!(value["timestamp"], "20240305_140709");
        assert_eq!(value["location"], "Zone 1");
        assert_eq!(value["file"], snapshot.display().to_string());
        assert_eq!(value.as_object().map(|o| o.len()), Some(3));
        Ok(())
    }

    #[test]
    fn sidecar_refuses_to_overwrite() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let snapshot = dir.path().join("shot.jpg");
        let mut log = JsonSidecarLog::new();
        log.append(&record(snapshot.clone(), "no_mask"))?;
        assert!(log.append(&record(snapshot, "no_mask")).is_err());
        Ok(())
    }

    #[test]
    fn csv_log_writes_header_once_and_creates_dirs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("logs").join("violation_logs.csv");
        let mut log = CsvViolationLog::new(&path);
        log.append(&record(PathBuf::from("a.jpg"), "no_helmet"))?;
        log.append(&record(PathBuf::from("b.jpg"), "Zone, east \"B\""))?;

        let raw = fs::read_to_string(&path)?;
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(
            lines,
            vec![
                CSV_HEADER,
                "2024-03-05 14:07:09,no_helmet,2",
                "2024-03-05 14:07:09,\"Zone, east \"\"B\"\"\",2",
            ]
        );
        Ok(())
    }

    #[test]
    fn csv_log_surfaces_write_failures() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // The log path is an existing directory, so opening it for append fails.
        let mut log = CsvViolationLog::new(dir.path());
        assert!(log.append(&record(PathBuf::from("a.jpg"), "no_mask")).is_err());
        Ok(())
    }

    #[test]
    fn memory_log_keeps_order() -> Result<()> {
        let mut log = MemoryViolationLog::new();
        log.append(&record(PathBuf::from("a.jpg"), "no_mask"))?;
        log.append(&record(PathBuf::from("b.jpg"), "no_helmet"))?;
        let types: Vec<&str> = log
            .records()
            .iter()
            .map(|r| r.violation_type.as_str())
            .collect();
        assert_eq!(types, vec!["no_mask", "no_helmet"]);
        Ok(())
    }
}
