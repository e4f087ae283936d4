use anyhow::Result;
use image::{Rgb, RgbImage};

use ppe_sentinel::config::RecordFormat;
use ppe_sentinel::storage::JsonSidecarLog;
use ppe_sentinel::ui::{Ui, UiMode};
use ppe_sentinel::{check_image, SentinelConfig, StillOptions};

fn plain_ui() -> Ui {
    Ui::new(UiMode::Plain, false, false)
}

#[test]
fn still_image_writes_sidecars_at_native_resolution() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("detections.json");
    std::fs::write(
        &script,
        r#"[
            {"label": "no_mask", "confidence": 0.91, "box": [800, 600, 1000, 900]},
            {"label": "no_helmet", "confidence": 0.85, "box": [100, 100, 300, 300]}
        ]"#,
    )?;

    let mut cfg = SentinelConfig::load(None)?;
    cfg.storage.csv_path = dir.path().join("logs/violation_logs.csv");
    cfg.storage.image_extension = "png".to_string();
    let options = StillOptions {
        detections: Some(script),
        out_dir: Some(dir.path().join("out")),
        alerts: false,
        ..StillOptions::default()
    };
    options.apply(&mut cfg);
    assert_eq!(cfg.storage.record_format, RecordFormat::Json);

    let image = RgbImage::from_pixel(1280, 960, Rgb([30, 30, 30]));
    let check = check_image(&cfg, image, chrono::Local::now(), &plain_ui())?;

    assert_eq!(check.detections.len(), 2);
    assert_eq!(check.report.records.len(), 2);
    for record in &check.report.records {
        assert!(record.snapshot.starts_with(dir.path().join("out")));
        let sidecar: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
            JsonSidecarLog::sidecar_path(&record.snapshot),
        )?)?;
        assert_eq!(sidecar["location"], "Zone 1");
        assert_eq!(sidecar["file"], record.snapshot.display().to_string());
    }
    assert!(!cfg.storage.csv_path.exists());

    let mask = check
        .report
        .records
        .iter()
        .find(|r| r.violation_type == "no_mask")
        .map(|r| r.snapshot.clone())
        .ok_or_else(|| anyhow::anyhow!("no_mask record missing"))?;
    let snapshot = image::open(mask)?.into_rgb8();
    assert_eq!((snapshot.width(), snapshot.height()), (1280, 960));
    assert_eq!(snapshot.get_pixel(800, 600).0, [255, 0, 0]);
    Ok(())
}

#[test]
fn csv_records_remain_available_for_still_images() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let script = dir.path().join("detections.json");
    std::fs::write(
        &script,
        r#"[{"label": "no_vest", "confidence": 0.8, "box": [10, 10, 50, 50]}]"#,
    )?;

    let mut cfg = SentinelConfig::load(None)?;
    cfg.storage.csv_path = dir.path().join("violation_logs.csv");
    StillOptions {
        detections: Some(script),
        out_dir: Some(dir.path().join("out")),
        record_format: RecordFormat::Csv,
        alerts: false,
    }
    .apply(&mut cfg);

    let check = check_image(&cfg, RgbImage::new(200, 100), chrono::Local::now(), &plain_ui())?;

    assert_eq!(check.report.records.len(), 1);
    let snapshot = &check.report.records[0].snapshot;
    assert!(!JsonSidecarLog::sidecar_path(snapshot).exists());
    let csv = std::fs::read_to_string(&cfg.storage.csv_path)?;
    assert_eq!(csv.lines().count(), 2);
    Ok(())
}
