use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

use super::{Alert, AlertChannel};
use crate::config::SpeechSettings;

/// Speaks the alert summary with a command-line text-to-speech engine
/// (`espeak -s 200 "<text>"` by default).
pub struct SpeechChannel {
    program: String,
    rate_flag: String,
    rate: u32,
}

impl SpeechChannel {
    pub fn new(program: impl Into<String>, rate_flag: impl Into<String>, rate: u32) -> Self {
        Self {
            program: program.into(),
            rate_flag: rate_flag.into(),
            rate,
        }
    }

    pub fn from_settings(settings: &SpeechSettings) -> Self {
        Self::new(
            settings.program.clone(),
            settings.rate_flag.clone(),
            settings.rate,
        )
    }

    fn args(&self, text: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(3);
        if !self.rate_flag.is_empty() {
            args.push(self.rate_flag.clone());
            args.push(self.rate.to_string());
        }
        args.push(text.to_string());
        args
    }
}

impl AlertChannel for SpeechChannel {
    fn name(&self) -> &'static str {
        "speech"
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        if alert.summary.trim().is_empty() {
            return Ok(());
        }
        let status = Command::new(&self.program)
            .args(self.args(&alert.summary))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("failed to start {}", self.program))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", self.program, status));
        }
        Ok(())
    }
}
