//! HTTP camera source.
//!
//! Handles both `multipart/x-mixed-replace` MJPEG streams (IP cameras,
//! ESP32-CAM `/stream`) and plain JPEG snapshot URLs, which are re-fetched
//! for every frame.

use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::SourceStats;
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK: usize = 8192;

pub struct HttpCameraSource {
    url: String,
    target_fps: u32,
    stream: Option<HttpStream>,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

enum HttpStream {
    Mjpeg(MjpegReader),
    Snapshot,
}

impl HttpCameraSource {
    pub fn new(url: &str, target_fps: u32) -> Result<Self> {
        let parsed = Url::parse(url).context("parse camera url")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                parsed.scheme()
            ));
        }
        Ok(Self {
            url: url.to_string(),
            target_fps,
            stream: None,
            connected_at: None,
            last_frame_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.url)
            .call()
            .with_context(|| format!("connect to camera {}", self.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        self.stream = Some(if content_type.contains("multipart") {
            HttpStream::Mjpeg(MjpegReader::new(response.into_reader()))
        } else {
            HttpStream::Snapshot
        });
        self.connected_at = Some(Instant::now());
        self.last_error = None;
        log::info!("source {}: connected ({})", self.url, content_type);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let min_interval = frame_interval(self.target_fps);
        loop {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| anyhow!("camera {} not connected", self.url))?;
            let jpeg = match stream {
                HttpStream::Mjpeg(reader) => match reader.next_jpeg() {
                    Ok(Some(bytes)) => bytes,
                    Ok(None) => {
                        log::info!("source {}: stream ended", self.url);
                        return Ok(None);
                    }
                    Err(e) => {
                        self.last_error = Some(e.to_string());
                        return Err(e);
                    }
                },
                HttpStream::Snapshot => match fetch_snapshot(&self.url) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.last_error = Some(e.to_string());
                        return Err(e);
                    }
                },
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let image = image::load_from_memory(&jpeg)
                .context("decode camera jpeg")?
                .into_rgb8();
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return Ok(Some(Frame::new(image, self.frame_count)));
        }
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        match self.last_frame_at {
            Some(last) => last.elapsed() <= health_grace(self.target_fps),
            None => connected_at.elapsed() <= Duration::from_secs(5),
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.url.clone(),
        }
    }
}

/// Splits a multipart byte stream into JPEG images by SOI/EOI markers,
/// ignoring part headers and boundaries.
struct MjpegReader {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegReader {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let jpeg = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(jpeg));
            }
            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);
            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                return Err(anyhow!("mjpeg frame exceeded {} bytes", MAX_JPEG_BYTES));
            }
        }
    }
}

fn fetch_snapshot(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read snapshot body")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty snapshot from {}", url));
    }
    Ok(bytes)
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let tail = &buffer[start + 2..];
    let end = tail.windows(2).position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(u64::from((1000 / target_fps).max(1)))
    }
}

fn health_grace(target_fps: u32) -> Duration {
    let per_frame = if target_fps == 0 { 0 } else { 1000 / target_fps };
    Duration::from_millis(u64::from(per_frame.saturating_mul(6).max(2_000)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn finds_jpeg_between_part_headers() {
        let mut data = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        data.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        data.extend_from_slice(b"\r\n--frame");
        let (start, end) = find_jpeg_bounds(&data).expect("bounds");
        assert_eq!(&data[start..end], &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        assert!(find_jpeg_bounds(&[0xFF, 0xD8, 0x00]).is_none());
    }

    #[test]
    fn reader_yields_each_frame_then_ends() -> Result<()> {
        let mut data = Vec::new();
        for payload in [1u8, 2u8] {
            data.extend_from_slice(b"--b\r\n\r\n");
            data.extend_from_slice(&[0xFF, 0xD8, payload, 0xFF, 0xD9]);
        }
        let mut reader = MjpegReader::new(Box::new(Cursor::new(data)));
        assert_eq!(reader.next_jpeg()?, Some(vec![0xFF, 0xD8, 1, 0xFF, 0xD9]));
        assert_eq!(reader.next_jpeg()?, Some(vec![0xFF, 0xD8, 2, 0xFF, 0xD9]));
        assert_eq!(reader.next_jpeg()?, None);
        Ok(())
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpCameraSource::new("udp://10.0.0.2:5000", 10).is_err());
        assert!(HttpCameraSource::new("http://10.0.0.2:81/stream", 10).is_ok());
    }

    #[test]
    fn pacing_intervals() {
        assert_eq!(frame_interval(0), Duration::ZERO);
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(health_grace(1), Duration::from_millis(6_000));
        assert_eq!(health_grace(30), Duration::from_millis(2_000));
    }
}
