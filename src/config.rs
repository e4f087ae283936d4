use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::evaluate::{
    Check, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NEGATION_PREFIX, DEFAULT_VIOLATION_LABELS,
    DEFAULT_ZONE_SUBJECT, DEFAULT_ZONE_VIOLATION_TYPE,
};
use crate::zone::{Point, MIN_ZONE_POINTS};

const DEFAULT_LOCATION: &str = "Zone 1";
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.5;
const DEFAULT_MODEL_IOU: f32 = 0.45;
const DEFAULT_COOLDOWN_SECS: u64 = 180;
const DEFAULT_SNAPSHOT_DIR: &str = "violations";
const DEFAULT_SNAPSHOT_PREFIX: &str = "violation";
const DEFAULT_IMAGE_EXTENSION: &str = "jpg";
const DEFAULT_CSV_PATH: &str = "logs/violation_logs.csv";
const DEFAULT_SUBJECT: &str = "PPE Violation Alert";
const DEFAULT_SOUND_PLAYER: &str = "ffplay";
const DEFAULT_SOUND_PLAYER_ARGS: &[&str] = &["-nodisp", "-autoexit", "-loglevel", "quiet"];
const DEFAULT_SPEECH_PROGRAM: &str = "espeak";
const DEFAULT_SPEECH_RATE_FLAG: &str = "-s";
const DEFAULT_SPEECH_RATE: u32 = 200;
const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v18.0";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 465;
const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 15;
const DEFAULT_FONT_SCALE: f32 = 18.0;

// -------------------- File layout --------------------

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    location: Option<String>,
    checks: Option<Vec<String>>,
    source: Option<SourceConfigFile>,
    model: Option<ModelConfigFile>,
    rules: Option<RulesConfigFile>,
    zone: Option<ZoneConfigFile>,
    cooldown: Option<CooldownConfigFile>,
    storage: Option<StorageConfigFile>,
    alerts: Option<AlertsConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    detections_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct RulesConfigFile {
    violation_labels: Option<Vec<String>>,
    confidence_threshold: Option<f32>,
    negation_prefix: Option<String>,
    zone_subjects: Option<Vec<String>>,
    zone_violation_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ZoneConfigFile {
    points: Option<Vec<[f32; 2]>>,
}

#[derive(Debug, Deserialize, Default)]
struct CooldownConfigFile {
    seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    snapshot_dir: Option<PathBuf>,
    snapshot_prefix: Option<String>,
    image_extension: Option<String>,
    record_format: Option<String>,
    csv_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertsConfigFile {
    background: Option<bool>,
    subject: Option<String>,
    message_prefix: Option<String>,
    sound: Option<SoundConfigFile>,
    speech: Option<SpeechConfigFile>,
    whatsapp: Option<WhatsAppConfigFile>,
    email: Option<EmailConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SoundConfigFile {
    enabled: Option<bool>,
    path: Option<PathBuf>,
    player: Option<String>,
    player_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    enabled: Option<bool>,
    program: Option<String>,
    rate_flag: Option<String>,
    rate: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct WhatsAppConfigFile {
    enabled: Option<bool>,
    api_base: Option<String>,
    phone_number_id: Option<String>,
    to: Option<String>,
    access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct EmailConfigFile {
    enabled: Option<bool>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    security: Option<String>,
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
    to: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    preview_path: Option<PathBuf>,
    stream_addr: Option<String>,
    font_path: Option<PathBuf>,
    font_scale: Option<f32>,
}

// -------------------- Resolved settings --------------------

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub location: String,
    pub checks: Vec<Check>,
    pub source: SourceSettings,
    pub model: ModelSettings,
    pub rules: RuleSettings,
    pub zone: Option<Vec<Point>>,
    pub cooldown: Duration,
    pub storage: StorageSettings,
    pub alerts: AlertSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// `stub://name`, a local image/directory path, `http(s)://` camera URL,
    /// or a `/dev/video*` device.
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub max_frames: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Scripted,
    Tract,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: BackendKind,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub detections_path: Option<PathBuf>,
    pub input_size: u32,
    /// Score cut-off applied by the detection source itself.
    pub confidence: f32,
    pub iou: f32,
}

#[derive(Debug, Clone)]
pub struct RuleSettings {
    pub violation_labels: Vec<String>,
    pub confidence_threshold: f32,
    pub negation_prefix: String,
    pub zone_subjects: Vec<String>,
    pub zone_violation_type: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub snapshot_dir: PathBuf,
    pub snapshot_prefix: String,
    pub image_extension: String,
    pub record_format: RecordFormat,
    pub csv_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct AlertSettings {
    /// Deliver alerts from a worker thread instead of the frame loop.
    pub background: bool,
    pub subject: String,
    pub message_prefix: String,
    pub sound: Option<SoundSettings>,
    pub speech: Option<SpeechSettings>,
    pub whatsapp: Option<WhatsAppSettings>,
    pub email: Option<EmailSettings>,
}

#[derive(Debug, Clone)]
pub struct SoundSettings {
    pub enabled: bool,
    pub path: PathBuf,
    pub player: String,
    pub player_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub enabled: bool,
    pub program: String,
    pub rate_flag: String,
    pub rate: u32,
}

#[derive(Debug, Clone)]
pub struct WhatsAppSettings {
    pub enabled: bool,
    pub api_base: String,
    pub phone_number_id: String,
    pub to: String,
    pub access_token: String,
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Implicit TLS (SMTPS, usually port 465).
    Tls,
    /// Plain connection upgraded with STARTTLS (usually port 587).
    StartTls,
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub security: SmtpSecurity,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub preview_path: Option<PathBuf>,
    /// Serve the annotated feed as MJPEG over HTTP on this address.
    pub stream_addr: Option<String>,
    pub font_path: Option<PathBuf>,
    pub font_scale: f32,
}

impl SentinelConfig {
    /// Load configuration: optional file, then environment overrides, then
    /// validation. Files ending in `.toml` are parsed as TOML, anything else as
    /// JSON.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => SentinelConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let location = file
            .location
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let checks = match file.checks {
            Some(names) => parse_checks(names.iter().map(String::as_str))?,
            None => vec![Check::Ppe],
        };

        let source = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            max_frames: source.max_frames,
        };

        let model = file.model.unwrap_or_default();
        let model = ModelSettings {
            backend: match model.backend.as_deref() {
                Some(name) => parse_backend(name)?,
                None => BackendKind::Scripted,
            },
            model_path: model.path,
            labels_path: model.labels_path,
            detections_path: model.detections_path,
            input_size: model.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
            confidence: model.confidence.unwrap_or(DEFAULT_MODEL_CONFIDENCE),
            iou: model.iou.unwrap_or(DEFAULT_MODEL_IOU),
        };

        let rules = file.rules.unwrap_or_default();
        let rules = RuleSettings {
            violation_labels: rules.violation_labels.unwrap_or_else(|| {
                DEFAULT_VIOLATION_LABELS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            }),
            confidence_threshold: rules
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            negation_prefix: rules
                .negation_prefix
                .unwrap_or_else(|| DEFAULT_NEGATION_PREFIX.to_string()),
            zone_subjects: rules
                .zone_subjects
                .unwrap_or_else(|| vec![DEFAULT_ZONE_SUBJECT.to_string()]),
            zone_violation_type: rules
                .zone_violation_type
                .unwrap_or_else(|| DEFAULT_ZONE_VIOLATION_TYPE.to_string()),
        };

        let zone = file
            .zone
            .and_then(|zone| zone.points)
            .map(|points| points.into_iter().map(|[x, y]| Point::new(x, y)).collect());

        let cooldown = Duration::from_secs(
            file.cooldown
                .and_then(|cooldown| cooldown.seconds)
                .unwrap_or(DEFAULT_COOLDOWN_SECS),
        );

        let storage = file.storage.unwrap_or_default();
        let storage = StorageSettings {
            snapshot_dir: storage
                .snapshot_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            snapshot_prefix: storage
                .snapshot_prefix
                .unwrap_or_else(|| DEFAULT_SNAPSHOT_PREFIX.to_string()),
            image_extension: storage
                .image_extension
                .unwrap_or_else(|| DEFAULT_IMAGE_EXTENSION.to_string()),
            record_format: match storage.record_format.as_deref() {
                Some(name) => parse_record_format(name)?,
                None => RecordFormat::Csv,
            },
            csv_path: storage
                .csv_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_PATH)),
        };

        let alerts = file.alerts.unwrap_or_default();
        let alerts = AlertSettings {
            background: alerts.background.unwrap_or(false),
            subject: alerts.subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            message_prefix: alerts.message_prefix.unwrap_or_default(),
            sound: alerts.sound.map(sound_settings),
            speech: alerts.speech.map(speech_settings),
            whatsapp: alerts.whatsapp.map(whatsapp_settings),
            email: match alerts.email {
                Some(email) => Some(email_settings(email)?),
                None => None,
            },
        };

        let display = file.display.unwrap_or_default();
        let display = DisplaySettings {
            preview_path: display.preview_path,
            stream_addr: display.stream_addr,
            font_path: display.font_path,
            font_scale: display.font_scale.unwrap_or(DEFAULT_FONT_SCALE),
        };

        Ok(Self {
            location,
            checks,
            source,
            model,
            rules,
            zone,
            cooldown,
            storage,
            alerts,
            display,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_nonempty("SENTINEL_STREAM_ADDR") {
            self.display.stream_addr = Some(addr);
        }
        if let Some(url) = env_nonempty("SENTINEL_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(path) = env_nonempty("SENTINEL_MODEL_PATH") {
            self.model.model_path = Some(PathBuf::from(path));
        }
        if let Some(location) = env_nonempty("SENTINEL_LOCATION") {
            self.location = location;
        }
        if let Some(checks) = env_nonempty("SENTINEL_CHECKS") {
            let parsed = split_csv(&checks);
            self.checks = parse_checks(parsed.iter().map(String::as_str))?;
        }
        if let Some(cooldown) = env_nonempty("SENTINEL_COOLDOWN_SECS") {
            let seconds: u64 = cooldown.parse().map_err(|_| {
                anyhow!("SENTINEL_COOLDOWN_SECS must be an integer number of seconds")
            })?;
            self.cooldown = Duration::from_secs(seconds);
        }
        if let Some(confidence) = env_nonempty("SENTINEL_CONFIDENCE") {
            self.rules.confidence_threshold = confidence
                .parse()
                .map_err(|_| anyhow!("SENTINEL_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Some(dir) = env_nonempty("SENTINEL_SNAPSHOT_DIR") {
            self.storage.snapshot_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_nonempty("SENTINEL_CSV_PATH") {
            self.storage.csv_path = PathBuf::from(path);
        }
        if let Some(token) = env_nonempty("SENTINEL_WHATSAPP_TOKEN") {
            if let Some(whatsapp) = self.alerts.whatsapp.as_mut() {
                whatsapp.access_token = token;
            }
        }
        if let Some(username) = env_nonempty("SENTINEL_SMTP_USERNAME") {
            if let Some(email) = self.alerts.email.as_mut() {
                email.username = username;
            }
        }
        if let Some(password) = env_nonempty("SENTINEL_SMTP_PASSWORD") {
            if let Some(email) = self.alerts.email.as_mut() {
                email.password = password;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.location.trim().is_empty() {
            return Err(anyhow!("location must not be empty"));
        }
        if self.checks.is_empty() {
            return Err(anyhow!("at least one check must be enabled"));
        }
        if let Some(addr) = &self.display.stream_addr {
            addr.parse::<std::net::SocketAddr>().map_err(|_| {
                anyhow!("display.stream_addr must be host:port, got '{}'", addr)
            })?;
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model input_size must be greater than zero"));
        }
        for (name, value) in [
            ("model.confidence", self.model.confidence),
            ("model.iou", self.model.iou),
            ("rules.confidence_threshold", self.rules.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.model.backend == BackendKind::Tract && self.model.model_path.is_none() {
            return Err(anyhow!("model backend 'tract' requires model.path"));
        }
        if self.rules.violation_labels.is_empty() {
            return Err(anyhow!("rules.violation_labels must not be empty"));
        }
        if self.checks.contains(&Check::Zone) {
            match &self.zone {
                Some(points) if points.len() >= MIN_ZONE_POINTS => {}
                _ => {
                    return Err(anyhow!(
                        "zone check requires zone.points with at least {} points",
                        MIN_ZONE_POINTS
                    ))
                }
            }
            if self.rules.zone_subjects.is_empty() {
                return Err(anyhow!("rules.zone_subjects must not be empty"));
            }
        }
        if self.cooldown.as_secs() == 0 {
            return Err(anyhow!("cooldown must be greater than zero"));
        }
        self.storage.image_extension = self
            .storage
            .image_extension
            .trim_start_matches('.')
            .to_lowercase();
        if !matches!(self.storage.image_extension.as_str(), "jpg" | "jpeg" | "png") {
            return Err(anyhow!(
                "storage.image_extension must be jpg or png, got {}",
                self.storage.image_extension
            ));
        }
        self.validate_alerts()
    }

    fn validate_alerts(&self) -> Result<()> {
        if let Some(sound) = self.alerts.sound.as_ref().filter(|s| s.enabled) {
            if sound.path.as_os_str().is_empty() {
                return Err(anyhow!("alerts.sound.path is required when sound is enabled"));
            }
        }
        if let Some(whatsapp) = self.alerts.whatsapp.as_ref().filter(|w| w.enabled) {
            require("alerts.whatsapp.phone_number_id", &whatsapp.phone_number_id)?;
            require("alerts.whatsapp.to", &whatsapp.to)?;
            require(
                "alerts.whatsapp.access_token (or SENTINEL_WHATSAPP_TOKEN)",
                &whatsapp.access_token,
            )?;
        }
        if let Some(email) = self.alerts.email.as_ref().filter(|e| e.enabled) {
            require("alerts.email.smtp_host", &email.smtp_host)?;
            require("alerts.email.from", &email.from)?;
            require("alerts.email.to", &email.to)?;
            require(
                "alerts.email.username (or SENTINEL_SMTP_USERNAME)",
                &email.username,
            )?;
            require(
                "alerts.email.password (or SENTINEL_SMTP_PASSWORD)",
                &email.password,
            )?;
        }
        Ok(())
    }
}

fn sound_settings(file: SoundConfigFile) -> SoundSettings {
    SoundSettings {
        enabled: file.enabled.unwrap_or(true),
        path: file.path.unwrap_or_default(),
        player: file
            .player
            .unwrap_or_else(|| DEFAULT_SOUND_PLAYER.to_string()),
        player_args: file.player_args.unwrap_or_else(|| {
            DEFAULT_SOUND_PLAYER_ARGS
                .iter()
                .map(|s| s.to_string())
                .collect()
        }),
    }
}

fn speech_settings(file: SpeechConfigFile) -> SpeechSettings {
    SpeechSettings {
        enabled: file.enabled.unwrap_or(true),
        program: file
            .program
            .unwrap_or_else(|| DEFAULT_SPEECH_PROGRAM.to_string()),
        rate_flag: file
            .rate_flag
            .unwrap_or_else(|| DEFAULT_SPEECH_RATE_FLAG.to_string()),
        rate: file.rate.unwrap_or(DEFAULT_SPEECH_RATE),
    }
}

fn whatsapp_settings(file: WhatsAppConfigFile) -> WhatsAppSettings {
    WhatsAppSettings {
        enabled: file.enabled.unwrap_or(true),
        api_base: file
            .api_base
            .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE.to_string()),
        phone_number_id: file.phone_number_id.unwrap_or_default(),
        to: file.to.unwrap_or_default(),
        access_token: file.access_token.unwrap_or_default(),
        timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS)),
    }
}

fn email_settings(file: EmailConfigFile) -> Result<EmailSettings> {
    let security = match file.security.as_deref() {
        None => SmtpSecurity::Tls,
        Some(value) => match value.to_lowercase().as_str() {
            "tls" | "ssl" | "smtps" => SmtpSecurity::Tls,
            "starttls" => SmtpSecurity::StartTls,
            other => {
                return Err(anyhow!(
                    "alerts.email.security must be tls or starttls, got {}",
                    other
                ))
            }
        },
    };
    Ok(EmailSettings {
        enabled: file.enabled.unwrap_or(true),
        smtp_host: file
            .smtp_host
            .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
        smtp_port: file.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
        security,
        username: file.username.unwrap_or_default(),
        password: file.password.unwrap_or_default(),
        from: file.from.unwrap_or_default(),
        to: file.to.unwrap_or_default(),
        timeout: Duration::from_secs(file.timeout_secs.unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS)),
    })
}

fn parse_checks<'a>(names: impl Iterator<Item = &'a str>) -> Result<Vec<Check>> {
    let mut checks = Vec::new();
    for name in names {
        let check: Check = name.parse()?;
        if !checks.contains(&check) {
            checks.push(check);
        }
    }
    Ok(checks)
}

fn parse_backend(name: &str) -> Result<BackendKind> {
    match name.to_lowercase().as_str() {
        "scripted" => Ok(BackendKind::Scripted),
        "tract" | "onnx" => Ok(BackendKind::Tract),
        other => Err(anyhow!(
            "unknown model backend '{}'; expected scripted or tract",
            other
        )),
    }
}

fn parse_record_format(name: &str) -> Result<RecordFormat> {
    match name.to_lowercase().as_str() {
        "csv" => Ok(RecordFormat::Csv),
        "json" => Ok(RecordFormat::Json),
        other => Err(anyhow!(
            "unknown record_format '{}'; expected csv or json",
            other
        )),
    }
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} is required", name));
    }
    Ok(())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_live_stream_behaviour() -> Result<()> {
        let cfg = SentinelConfig::from_file(SentinelConfigFile::default())?;
        assert_eq!(cfg.location, "Zone 1");
        assert_eq!(cfg.checks, vec![Check::Ppe]);
        assert_eq!(cfg.cooldown, Duration::from_secs(180));
        assert_eq!(cfg.model.confidence, 0.5);
        assert_eq!(cfg.rules.confidence_threshold, 0.6);
        assert_eq!(cfg.source.width, 640);
        assert_eq!(cfg.source.height, 480);
        assert_eq!(cfg.storage.record_format, RecordFormat::Csv);
        assert!(cfg.alerts.email.is_none());
        Ok(())
    }

    #[test]
    fn zone_check_without_polygon_is_rejected() -> Result<()> {
        let file: SentinelConfigFile = serde_json::from_str(r#"{"checks": ["zone"]}"#)?;
        let mut cfg = SentinelConfig::from_file(file)?;
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn stream_address_must_parse() -> Result<()> {
        let file: SentinelConfigFile =
            serde_json::from_str(r#"{"display": {"stream_addr": "localhost"}}"#)?;
        let mut cfg = SentinelConfig::from_file(file)?;
        assert!(cfg.validate().is_err());

        let file: SentinelConfigFile =
            serde_json::from_str(r#"{"display": {"stream_addr": "127.0.0.1:8090"}}"#)?;
        let mut cfg = SentinelConfig::from_file(file)?;
        cfg.validate()?;
        assert_eq!(cfg.display.stream_addr.as_deref(), Some("127.0.0.1:8090"));
        Ok(())
    }

    #[test]
    fn enabled_email_requires_credentials() -> Result<()> {
        let file: SentinelConfigFile = serde_json::from_str(
            r#"{"alerts": {"email": {"from": "a@example.com", "to": "b@example.com"}}}"#,
        )?;
        let mut cfg = SentinelConfig::from_file(file)?;
        let err = cfg.validate().expect_err("missing credentials");
        assert!(err.to_string().contains("username"));
        Ok(())
    }

    #[test]
    fn rejects_unknown_enum_values() {
        for raw in [
            r#"{"checks": ["both"]}"#,
            r#"{"model": {"backend": "opencv"}}"#,
            r#"{"storage": {"record_format": "xml"}}"#,
            r#"{"alerts": {"email": {"security": "none"}}}"#,
        ] {
            let file: SentinelConfigFile = serde_json::from_str(raw).expect("parse");
            assert!(SentinelConfig::from_file(file).is_err(), "{} accepted", raw);
        }
    }

    #[test]
    fn parses_toml_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sentinel.toml");
        std::fs::write(
            &path,
            r#"
location = "Bay 4"
checks = ["ppe", "zone"]

[zone]
points = [[100.0, 100.0], [400.0, 100.0], [400.0, 400.0], [100.0, 400.0]]

[storage]
record_format = "json"
image_extension = ".PNG"
"#,
        )?;
        let file = read_config_file(&path)?;
        let mut cfg = SentinelConfig::from_file(file)?;
        cfg.validate()?;
        assert_eq!(cfg.location, "Bay 4");
        assert_eq!(cfg.checks, vec![Check::Ppe, Check::Zone]);
        assert_eq!(cfg.zone.as_ref().map(Vec::len), Some(4));
        assert_eq!(cfg.storage.record_format, RecordFormat::Json);
        assert_eq!(cfg.storage.image_extension, "png");
        Ok(())
    }
}
