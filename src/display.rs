//! Output surface and stop control for the frame loop.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// Receives every annotated frame.
pub trait FrameSink {
    fn render(&mut self, image: &RgbImage) -> Result<()>;
}

/// Discards frames.
#[derive(Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn render(&mut self, _image: &RgbImage) -> Result<()> {
        Ok(())
    }
}

/// Hands each frame to several sinks. Every sink sees every frame; the first
/// failure is returned after all of them ran.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn FrameSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<S: FrameSink + 'static>(&mut self, sink: S) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl FrameSink for SinkSet {
    fn render(&mut self, image: &RgbImage) -> Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.render(image) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Rewrites one image file per frame. Viewers that poll the file see a live
/// picture; the write goes through a temporary file and a rename so readers
/// never catch a half-written image.
pub struct PreviewSink {
    path: PathBuf,
    tmp_path: PathBuf,
    rendered: u64,
}

impl PreviewSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| anyhow!("preview path {} needs an image extension", path.display()))?
            .to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create preview dir {}", parent.display()))?;
        }
        let tmp_path = path.with_extension(format!("tmp.{}", ext));
        Ok(Self {
            path,
            tmp_path,
            rendered: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl FrameSink for PreviewSink {
    fn render(&mut self, image: &RgbImage) -> Result<()> {
        image
            .save(&self.tmp_path)
            .with_context(|| format!("write preview {}", self.tmp_path.display()))?;
        std::fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("replace preview {}", self.path.display()))?;
        self.rendered += 1;
        Ok(())
    }
}

/// Shared stop flag for the frame loop.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set the flag on Ctrl-C. Only one handler may be installed per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let flag = self.flag.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))
    }

    /// Set the flag when a line starting with `q` or Esc is read from stdin.
    pub fn watch_stdin(&self) -> Result<()> {
        let flag = self.flag.clone();
        std::thread::Builder::new()
            .name("stop-keys".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    if is_stop_key(&line) {
                        log::info!("stop requested from keyboard");
                        flag.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn stdin watcher: {}", e))?;
        Ok(())
    }
}

fn is_stop_key(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("q") || line.starts_with('\u{1b}')
}
