//! Alert fan-out.
//!
//! An `Alert` is built once per frame that produced new violation records and
//! handed to every configured channel. Channels are best-effort: a failure (or
//! panic) in one is logged and recorded, and the remaining channels still run.
//! Nothing is retried.

pub mod email;
pub mod sound;
pub mod speech;
pub mod summary;
pub mod whatsapp;
pub mod worker;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::config::AlertSettings;

pub use email::EmailChannel;
pub use sound::SoundChannel;
pub use speech::SpeechChannel;
pub use whatsapp::WhatsAppChannel;
pub use worker::DispatchWorker;

#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    /// Email subject line.
    pub subject: String,
    /// Spoken sentence, also the body's first line.
    pub summary: String,
    /// Text message body.
    pub message: String,
    pub location: String,
    pub violation_types: Vec<String>,
    pub snapshots: Vec<PathBuf>,
}

impl Alert {
    /// Plain-text body used for email.
    pub fn body(&self) -> String {
        let mut body = format!("{}\n\nLocation: {}\n", self.summary, self.location);
        if !self.violation_types.is_empty() {
            body.push_str(&format!("Violations: {}\n", self.violation_types.join(", ")));
        }
        for snapshot in &self.snapshots {
            body.push_str(&format!("Snapshot: {}\n", snapshot.display()));
        }
        body
    }
}

/// One delivery mechanism.
pub trait AlertChannel: Send {
    fn name(&self) -> &'static str;

    fn deliver(&self, alert: &Alert) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelFailure {
    pub channel: &'static str,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<ChannelFailure>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct AlertDispatcher {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels enabled in `settings`, in a fixed order: sound, speech,
    /// WhatsApp, email.
    pub fn from_settings(settings: &AlertSettings) -> Result<Self> {
        let mut dispatcher = Self::new();
        if let Some(sound) = settings.sound.as_ref().filter(|s| s.enabled) {
            dispatcher.add(SoundChannel::from_settings(sound));
        }
        if let Some(speech) = settings.speech.as_ref().filter(|s| s.enabled) {
            dispatcher.add(SpeechChannel::from_settings(speech));
        }
        if let Some(whatsapp) = settings.whatsapp.as_ref().filter(|s| s.enabled) {
            dispatcher.add(WhatsAppChannel::from_settings(whatsapp)?);
        }
        if let Some(email) = settings.email.as_ref().filter(|s| s.enabled) {
            dispatcher.add(EmailChannel::from_settings(email)?);
        }
        Ok(dispatcher)
    }

    pub fn add<C: AlertChannel + 'static>(&mut self, channel: C) {
        self.channels.push(Box::new(channel));
    }

    pub fn with_channel<C: AlertChannel + 'static>(mut self, channel: C) -> Self {
        self.add(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let mut report = DispatchReport::default();
        for channel in &self.channels {
            let name = channel.name();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| channel.deliver(alert)))
                .unwrap_or_else(|payload| Err(anyhow!("channel panicked: {}", panic_message(&payload))));
            match outcome {
                Ok(()) => {
                    log::info!("alert delivered via {}", name);
                    report.delivered.push(name);
                }
                Err(e) => {
                    log::warn!("alert channel {} failed: {:#}", name, e);
                    report.failed.push(ChannelFailure {
                        channel: name,
                        error: format!("{:#}", e),
                    });
                }
            }
        }
        report
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Channel that records what it was asked to deliver.
    #[derive(Clone)]
    pub struct RecordingChannel {
        pub name: &'static str,
        pub calls: Arc<Mutex<Vec<String>>>,
        pub fail: bool,
    }

    impl RecordingChannel {
        pub fn new(name: &'static str, calls: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                calls,
                fail: false,
            }
        }

        pub fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn deliver(&self, alert: &Alert) -> Result<()> {
            self.calls
                .lock()
                .map_err(|_| anyhow!("calls lock poisoned"))?
                .push(format!("{}:{}", self.name, alert.summary));
            if self.fail {
                Err(anyhow!("{} unavailable", self.name))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::testing::RecordingChannel;
    use super::*;

    struct PanickingChannel;

    impl AlertChannel for PanickingChannel {
        fn name(&self) -> &'static str {
            "panics"
        }

        fn deliver(&self, _alert: &Alert) -> Result<()> {
            panic!("tts engine crashed");
        }
    }

    fn alert() -> Alert {
        Alert {
            subject: "PPE Violation Alert".to_string(),
            summary: "Warning! Mask not detected.".to_string(),
            message: "Warning! Mask not detected.".to_string(),
            location: "Zone 1".to_string(),
            violation_types: vec!["no_mask".to_string()],
            snapshots: vec![PathBuf::from("violations/a.jpg")],
        }
    }

    #[test]
    fn failing_email_does_not_block_other_channels() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::new()
            .with_channel(RecordingChannel::new("email", calls.clone()).failing())
            .with_channel(RecordingChannel::new("sound", calls.clone()))
            .with_channel(RecordingChannel::new("speech", calls.clone()));

        let report = dispatcher.dispatch(&alert());

        assert_eq!(report.delivered, vec!["sound", "speech"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].channel, "email");
        assert!(report.failed[0].error.contains("unavailable"));
        assert_eq!(calls.lock().expect("lock").len(), 3);
    }

    #[test]
    fn panicking_channel_is_contained() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::new()
            .with_channel(PanickingChannel)
            .with_channel(RecordingChannel::new("whatsapp", calls.clone()));

        let report = dispatcher.dispatch(&alert());

        assert_eq!(report.delivered, vec!["whatsapp"]);
        assert!(report.failed[0].error.contains("tts engine crashed"));
        assert!(!report.all_delivered());
    }

    #[test]
    fn body_lists_location_and_snapshots() {
        let body = alert().body();
        assert!(body.starts_with("Warning! Mask not detected."));
        assert!(body.contains("Location: Zone 1"));
        assert!(body.contains("Snapshot: violations/a.jpg"));
    }
}
