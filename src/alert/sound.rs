use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

use super::{Alert, AlertChannel};
use crate::config::SoundSettings;

/// Plays an audio file through an external player and waits for it to finish.
pub struct SoundChannel {
    player: String,
    args: Vec<String>,
    path: PathBuf,
}

impl SoundChannel {
    pub fn new(player: impl Into<String>, args: Vec<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            args,
            path: path.into(),
        }
    }

    pub fn from_settings(settings: &SoundSettings) -> Self {
        Self::new(
            settings.player.clone(),
            settings.player_args.clone(),
            settings.path.clone(),
        )
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.player);
        cmd.args(&self.args)
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl AlertChannel for SoundChannel {
    fn name(&self) -> &'static str {
        "sound"
    }

    fn deliver(&self, _alert: &Alert) -> Result<()> {
        if !self.path.is_file() {
            return Err(anyhow!("alert sound {} not found", self.path.display()));
        }
        let status = self
            .command()
            .status()
            .with_context(|| format!("failed to start {}", self.player))?;
        if !status.success() {
            return Err(anyhow!("{} exited with {}", self.player, status));
        }
        Ok(())
    }
}
