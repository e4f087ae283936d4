//! V4L2 capture devices (`/dev/video*`).
//!
//! Requests packed RGB at the working resolution; drivers that refuse get
//! YUYV, which is converted in-process.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::SourceStats;
use crate::frame::Frame;

pub struct V4l2Source {
    device_path: String,
    width: u32,
    height: u32,
    target_fps: u32,
    state: Option<CaptureState>,
    format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

#[self_referencing]
struct CaptureState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(device_path: &str, width: u32, height: u32, target_fps: u32) -> Result<Self> {
        if !device_path.starts_with("/dev/") {
            return Err(anyhow!("'{}' is not a device node", device_path));
        }
        Ok(Self {
            device_path: device_path.to_string(),
            width,
            height,
            target_fps,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device_path)
            .with_context(|| format!("open capture device {}", self.device_path))?;
        let mut wanted = device.format().context("read capture format")?;
        wanted.width = self.width;
        wanted.height = self.height;
        wanted.fourcc = v4l::FourCC::new(b"RGB3");
        let mut active = device.set_format(&wanted).context("set capture format")?;
        if PixelFormat::from_fourcc(&active.fourcc.repr).is_err() {
            wanted.fourcc = v4l::FourCC::new(b"YUYV");
            active = device.set_format(&wanted).context("set YUYV capture format")?;
        }
        self.format = PixelFormat::from_fourcc(&active.fourcc.repr)?;

        if self.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.target_fps);
            if let Err(e) = device.set_params(&params) {
                log::warn!("source {}: could not set fps: {}", self.device_path, e);
            }
        }

        self.width = active.width;
        self.height = active.height;
        let state = CaptureStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|e| anyhow::Error::new(e).context("create capture buffers"))
            },
        }
        .try_build()
        .map_err(|e| {
            self.last_error = Some(e.to_string());
            e
        })?;
        self.state = Some(state);
        self.last_error = None;

        log::info!(
            "source {}: {}x{} {:?}",
            self.device_path,
            self.width,
            self.height,
            self.format
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("capture device {} not connected", self.device_path))?;
        let (width, height, format) = (self.width, self.height, self.format);
        let captured = state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map_err(|e| anyhow::Error::new(e).context("capture frame"))
                .and_then(|(buf, _meta)| normalize_to_rgb(buf, width, height, format))
        });
        let pixels = captured.map_err(|e| {
            self.last_error = Some(e.to_string());
            e
        })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::from_rgb(pixels, width, height, self.frame_count).map(Some)
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        match self.last_frame_at {
            Some(last) => last.elapsed() <= self.health_grace(),
            None => true,
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.device_path.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let per_frame = if self.target_fps == 0 {
            0
        } else {
            1000 / self.target_fps
        };
        Duration::from_millis(u64::from(per_frame.saturating_mul(6).max(2_000)))
    }
}
