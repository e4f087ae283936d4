use std::collections::VecDeque;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Backend that replays detections from a script instead of running a model.
///
/// A script is JSON: either a flat list of detections reported for every
/// frame, or a list of per-frame lists consumed in order (frames past the end
/// of the script report nothing).
pub struct ScriptedBackend {
    script: Script,
    min_confidence: f32,
}

enum Script {
    Repeat(Vec<Detection>),
    Sequence(VecDeque<Vec<Detection>>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptFile {
    Sequence(Vec<Vec<Detection>>),
    Repeat(Vec<Detection>),
}

impl ScriptedBackend {
    pub fn empty() -> Self {
        Self::repeating(Vec::new())
    }

    /// Report the same detections on every frame.
    pub fn repeating(detections: Vec<Detection>) -> Self {
        Self {
            script: Script::Repeat(detections),
            min_confidence: 0.0,
        }
    }

    /// Report one entry per frame, then nothing.
    pub fn sequence(frames: Vec<Vec<Detection>>) -> Self {
        Self {
            script: Script::Sequence(frames.into()),
            min_confidence: 0.0,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: ScriptFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid detection script: {}", e))?;
        let backend = match parsed {
            ScriptFile::Repeat(detections) => Self::repeating(detections),
            ScriptFile::Sequence(frames) => Self::sequence(frames),
        };
        backend.validate()?;
        Ok(backend)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Drop detections below `threshold`, like a model's own score cut-off.
    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = threshold;
        self
    }

    fn validate(&self) -> Result<()> {
        let all: Box<dyn Iterator<Item = &Detection>> = match &self.script {
            Script::Repeat(detections) => Box::new(detections.iter()),
            Script::Sequence(frames) => Box::new(frames.iter().flatten()),
        };
        for det in all {
            if !(0.0..=1.0).contains(&det.confidence) {
                return Err(anyhow!(
                    "detection '{}' confidence {} outside [0, 1]",
                    det.label,
                    det.confidence
                ));
            }
        }
        Ok(())
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        let detections = match &mut self.script {
            Script::Repeat(detections) => detections.clone(),
            Script::Sequence(frames) => frames.pop_front().unwrap_or_default(),
        };
        Ok(detections
            .into_iter()
            .filter(|det| det.confidence >= self.min_confidence)
            .collect())
    }
}
