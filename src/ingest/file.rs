//! Local sources: synthetic `stub://` frames and still images on disk.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use super::SourceStats;
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Endless synthetic frames. Pixel content drifts every frame so encoders and
/// previews see changing input.
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        log::info!("source {}: synthetic {}x{}", self.name, self.width, self.height);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_count += 1;
        let shift = (self.frame_count % 256) as u32;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        });
        Ok(Some(Frame::new(image, self.frame_count)))
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.name.clone(),
        }
    }
}

/// A single image file, or every image in a directory sorted by file name.
pub struct ImageSource {
    root: PathBuf,
    pending: Vec<PathBuf>,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageSource {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() {
            return Err(anyhow!("image source {} does not exist", root.display()));
        }
        Ok(Self {
            root,
            pending: Vec::new(),
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        let mut paths = if self.root.is_dir() {
            list_images(&self.root)?
        } else {
            vec![self.root.clone()]
        };
        if paths.is_empty() {
            return Err(anyhow!("no images found in {}", self.root.display()));
        }
        // Popped from the back.
        paths.reverse();
        self.pending = paths;
        log::info!(
            "source {}: {} image(s) queued",
            self.root.display(),
            self.pending.len()
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.pending.pop() else {
            return Ok(None);
        };
        let image = match image::open(&path) {
            Ok(image) => image.into_rgb8(),
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(anyhow!("decode {}: {}", path.display(), e));
            }
        };
        self.frame_count += 1;
        self.last_error = None;
        Ok(Some(Frame::new(image, self.frame_count)))
    }

    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.root.display().to_string(),
        }
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_image_path(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
