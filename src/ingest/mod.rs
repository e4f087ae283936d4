//! Frame sources.
//!
//! A `FrameSource` wraps one of:
//! - `stub://name`: synthetic frames, unbounded (tests and dry runs)
//! - a local image file or a directory of images, replayed once in name order
//! - an HTTP camera serving MJPEG or single JPEG snapshots (feature: ingest-http)
//! - a V4L2 capture device such as `/dev/video0` (feature: ingest-v4l2)
//! - an in-memory list of images supplied by the caller
//!
//! `next_frame` yields `Ok(None)` once a finite source is exhausted. Every
//! frame is rescaled to the configured working resolution before it is
//! returned.

pub mod file;
#[cfg(feature = "ingest-http")]
pub mod http;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::collections::VecDeque;

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::config::SourceSettings;
use crate::frame::Frame;

pub use file::{ImageSource, SyntheticSource};
#[cfg(feature = "ingest-http")]
pub use http::HttpCameraSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub struct FrameSource {
    backend: SourceBackend,
    width: u32,
    height: u32,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    Images(ImageSource),
    Memory(MemorySource),
    #[cfg(feature = "ingest-http")]
    Http(HttpCameraSource),
    #[cfg(feature = "ingest-v4l2")]
    V4l2(V4l2Source),
}

impl FrameSource {
    /// Pick a backend from the source URL.
    pub fn open(settings: &SourceSettings) -> Result<Self> {
        let url = settings.url.trim();
        if url.is_empty() {
            return Err(anyhow!("source url is empty"));
        }
        let backend = if url.starts_with("stub://") {
            SourceBackend::Synthetic(SyntheticSource::new(url, settings.width, settings.height))
        } else if url.starts_with("http://") || url.starts_with("https://") {
            open_http(url, settings.target_fps)?
        } else if url.starts_with("/dev/video") {
            open_v4l2(url, settings)?
        } else if url.contains("://") && !url.starts_with("file://") {
            return Err(anyhow!("unsupported source url '{}'", url));
        } else {
            SourceBackend::Images(ImageSource::new(url.trim_start_matches("file://"))?)
        };
        Ok(Self {
            backend,
            width: settings.width,
            height: settings.height,
        })
    }

    /// Replay caller-supplied images, then end.
    pub fn from_images(images: Vec<RgbImage>, width: u32, height: u32) -> Self {
        Self {
            backend: SourceBackend::Memory(MemorySource {
                pending: images.into(),
                captured: 0,
            }),
            width,
            height,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.connect(),
            SourceBackend::Images(source) => source.connect(),
            SourceBackend::Memory(_) => Ok(()),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::V4l2(source) => source.connect(),
        }
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame()?,
            SourceBackend::Images(source) => source.next_frame()?,
            SourceBackend::Memory(source) => source.next_frame(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.next_frame()?,
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::V4l2(source) => source.next_frame()?,
        };
        Ok(frame.map(|mut frame| {
            frame.resize_to(self.width, self.height);
            frame
        }))
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(_) | SourceBackend::Memory(_) => true,
            SourceBackend::Images(source) => source.is_healthy(),
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::V4l2(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            SourceBackend::Images(source) => source.stats(),
            SourceBackend::Memory(source) => SourceStats {
                frames_captured: source.captured,
                source: "memory".to_string(),
            },
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::V4l2(source) => source.stats(),
        }
    }
}

struct MemorySource {
    pending: VecDeque<RgbImage>,
    captured: u64,
}

impl MemorySource {
    fn next_frame(&mut self) -> Option<Frame> {
        let image = self.pending.pop_front()?;
        self.captured += 1;
        Some(Frame::new(image, self.captured))
    }
}

#[cfg(feature = "ingest-http")]
fn open_http(url: &str, target_fps: u32) -> Result<SourceBackend> {
    Ok(SourceBackend::Http(HttpCameraSource::new(url, target_fps)?))
}

#[cfg(not(feature = "ingest-http"))]
fn open_http(url: &str, _target_fps: u32) -> Result<SourceBackend> {
    Err(anyhow!(
        "source '{}' requires the ingest-http feature",
        url
    ))
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(url: &str, settings: &SourceSettings) -> Result<SourceBackend> {
    Ok(SourceBackend::V4l2(V4l2Source::new(
        url,
        settings.width,
        settings.height,
        settings.target_fps,
    )?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(url: &str, _settings: &SourceSettings) -> Result<SourceBackend> {
    Err(anyhow!(
        "source '{}' requires the ingest-v4l2 feature",
        url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> SourceSettings {
        SourceSettings {
            url: url.to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
            max_frames: None,
        }
    }

    #[test]
    fn stub_source_resizes_and_never_ends() -> Result<()> {
        let mut source = FrameSource::open(&settings("stub://yard"))?;
        source.connect()?;
        for expected in 1..=3 {
            let frame = source.next_frame()?.expect("synthetic frame");
            assert_eq!(frame.index, expected);
            assert_eq!((frame.width(), frame.height()), (64, 48));
        }
        assert_eq!(source.stats().frames_captured, 3);
        Ok(())
    }

    #[test]
    fn memory_source_ends_after_last_image() -> Result<()> {
        let mut source =
            FrameSource::from_images(vec![RgbImage::new(10, 10), RgbImage::new(20, 20)], 32, 24);
        assert!(source.next_frame()?.is_some());
        let second = source.next_frame()?.expect("second frame");
        assert_eq!((second.width(), second.height()), (32, 24));
        assert!(source.next_frame()?.is_none());
        assert!(source.is_healthy());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn undecodable_file_reports_unhealthy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame.png");
        std::fs::write(&path, b"garbage")?;
        let mut source = FrameSource::open(&settings(&path.display().to_string()))?;
        source.connect()?;
        assert!(source.next_frame().is_err());
        assert!(!source.is_healthy());
        Ok(())
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(FrameSource::open(&settings("rtsp://camera/stream")).is_err());
        assert!(FrameSource::open(&settings("  ")).is_err());
    }
}
