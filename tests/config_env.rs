use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use ppe_sentinel::config::{RecordFormat, SentinelConfig, SmtpSecurity};
use ppe_sentinel::Check;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTINEL_SOURCE_URL",
        "SENTINEL_MODEL_PATH",
        "SENTINEL_LOCATION",
        "SENTINEL_COOLDOWN_SECS",
        "SENTINEL_CONFIDENCE",
        "SENTINEL_SNAPSHOT_DIR",
        "SENTINEL_CSV_PATH",
        "SENTINEL_CHECKS",
        "SENTINEL_WHATSAPP_TOKEN",
        "SENTINEL_SMTP_USERNAME",
        "SENTINEL_SMTP_PASSWORD",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn file_values_then_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "location": "Loading Bay",
            "checks": ["ppe"],
            "source": {"url": "stub://dock", "width": 800, "height": 600},
            "cooldown": {"seconds": 60},
            "storage": {"record_format": "json", "snapshot_dir": "evidence"},
            "zone": {"points": [[0, 0], [100, 0], [100, 100], [0, 100]]},
            "alerts": {
                "email": {
                    "smtp_host": "mail.example.com",
                    "smtp_port": 587,
                    "security": "starttls",
                    "from": "sentinel@example.com",
                    "to": "safety@example.com"
                },
                "whatsapp": {"phone_number_id": "1234", "to": "15550001111"}
            }
        }"#,
    );

    std::env::set_var("SENTINEL_CHECKS", "ppe, zone");
    std::env::set_var("SENTINEL_COOLDOWN_SECS", "90");
    std::env::set_var("SENTINEL_CONFIDENCE", "0.75");
    std::env::set_var("SENTINEL_SMTP_USERNAME", "sentinel");
    std::env::set_var("SENTINEL_SMTP_PASSWORD", "from-the-environment");
    std::env::set_var("SENTINEL_WHATSAPP_TOKEN", "token-from-env");

    let cfg = SentinelConfig::load(Some(file.path())).expect("load config");
    clear_env();

    assert_eq!(cfg.location, "Loading Bay");
    assert_eq!(cfg.checks, vec![Check::Ppe, Check::Zone]);
    assert_eq!(cfg.source.url, "stub://dock");
    assert_eq!((cfg.source.width, cfg.source.height), (800, 600));
    assert_eq!(cfg.cooldown, Duration::from_secs(90));
    assert_eq!(cfg.rules.confidence_threshold, 0.75);
    assert_eq!(cfg.storage.record_format, RecordFormat::Json);

    let email = cfg.alerts.email.expect("email settings");
    assert_eq!(email.security, SmtpSecurity::StartTls);
    assert_eq!(email.smtp_port, 587);
    assert_eq!(email.username, "sentinel");
    assert_eq!(email.password, "from-the-environment");
    let whatsapp = cfg.alerts.whatsapp.expect("whatsapp settings");
    assert_eq!(whatsapp.access_token, "token-from-env");
    assert_eq!(whatsapp.api_base, "https://graph.facebook.com/v18.0");
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentinelConfig::load(None).expect("defaults");
    assert_eq!(cfg.location, "Zone 1");
    assert_eq!(cfg.cooldown, Duration::from_secs(180));
    assert_eq!(cfg.checks, vec![Check::Ppe]);
    assert!(cfg.zone.is_none());
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_CONFIDENCE", "1.5");
    assert!(SentinelConfig::load(None).is_err());
    clear_env();

    std::env::set_var("SENTINEL_COOLDOWN_SECS", "three minutes");
    assert!(SentinelConfig::load(None).is_err());
    clear_env();

    std::env::set_var("SENTINEL_COOLDOWN_SECS", "0");
    assert!(SentinelConfig::load(None).is_err());
    clear_env();

    std::env::set_var("SENTINEL_CHECKS", "zone");
    let err = SentinelConfig::load(None).expect_err("zone without polygon");
    assert!(err.to_string().contains("zone"));
    clear_env();
}

#[test]
fn whatsapp_without_token_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{"alerts": {"whatsapp": {"phone_number_id": "1", "to": "2"}}}"#);
    let err = SentinelConfig::load(Some(file.path())).expect_err("missing token");
    assert!(err.to_string().contains("access_token"));

    let disabled = write_config(
        r#"{"alerts": {"whatsapp": {"enabled": false, "phone_number_id": "1", "to": "2"}}}"#,
    );
    assert!(SentinelConfig::load(Some(disabled.path())).is_ok());
}
