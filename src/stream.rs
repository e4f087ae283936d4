//! Live annotated feed over HTTP.
//!
//! `GET /stream` answers with `multipart/x-mixed-replace` and pushes every new
//! frame as a JPEG part, which browsers show directly in an `<img>`.
//! `GET /frame.jpg` returns the latest frame once, `GET /` serves a viewer
//! page and `GET /health` reports how many frames have been published.
//! A server bound to a loopback address refuses non-loopback peers.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::display::FrameSink;

const MAX_REQUEST_BYTES: usize = 8192;
const BOUNDARY: &str = "sentinelframe";
const POLL_INTERVAL: Duration = Duration::from_millis(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const JPEG_QUALITY: u8 = 80;

const VIEWER_PAGE: &str = "<!doctype html>
<html>
<head><title>PPE Sentinel</title></head>
<body style=\"margin:0;background:#111;color:#eee;font-family:sans-serif\">
<h1 style=\"font-size:1.2em;padding:0.5em\">PPE Sentinel live feed</h1>
<img src=\"/stream\" alt=\"live feed\" style=\"max-width:100%\">
</body>
</html>
";

#[derive(Default)]
struct Latest {
    seq: u64,
    jpeg: Option<Arc<Vec<u8>>>,
}

/// Most recent encoded frame, shared between the sink and client threads.
#[derive(Clone, Default)]
struct FrameSlot {
    inner: Arc<Mutex<Latest>>,
}

impl FrameSlot {
    fn publish(&self, jpeg: Vec<u8>) -> Result<u64> {
        let mut latest = self
            .inner
            .lock()
            .map_err(|_| anyhow!("stream frame lock poisoned"))?;
        latest.seq += 1;
        latest.jpeg = Some(Arc::new(jpeg));
        Ok(latest.seq)
    }

    fn latest(&self) -> Result<(u64, Option<Arc<Vec<u8>>>)> {
        let latest = self
            .inner
            .lock()
            .map_err(|_| anyhow!("stream frame lock poisoned"))?;
        Ok((latest.seq, latest.jpeg.clone()))
    }
}

/// Encodes each annotated frame as JPEG and hands it to the stream server.
pub struct StreamSink {
    slot: FrameSlot,
}

impl FrameSink for StreamSink {
    fn render(&mut self, image: &RgbImage) -> Result<()> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
            .encode_image(image)
            .context("encode stream frame")?;
        self.slot.publish(jpeg)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct StreamHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Stop accepting, end open streams and wait for the server thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("stream server thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub struct StreamServer {
    addr: String,
}

impl StreamServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Bind and start serving. Frames rendered into the returned sink are
    /// what clients see.
    pub fn spawn(self) -> Result<(StreamHandle, StreamSink)> {
        let configured_addr: SocketAddr = self
            .addr
            .parse()
            .map_err(|_| anyhow!("invalid stream address '{}'", self.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind stream server on {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let slot = FrameSlot::default();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let server_slot = slot.clone();
        let join = std::thread::Builder::new()
            .name("stream-server".to_string())
            .spawn(move || {
                if let Err(err) = serve(listener, server_slot, shutdown_thread) {
                    log::error!("stream server stopped: {:#}", err);
                }
            })
            .map_err(|e| anyhow!("failed to spawn stream server: {}", e))?;
        log::info!("live stream on http://{}/", addr);

        Ok((
            StreamHandle {
                addr,
                shutdown,
                join: Some(join),
            },
            StreamSink { slot },
        ))
    }
}

fn serve(listener: TcpListener, slot: FrameSlot, shutdown: Arc<AtomicBool>) -> Result<()> {
    let mut clients: Vec<JoinHandle<()>> = Vec::new();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let slot = slot.clone();
                let shutdown = shutdown.clone();
                let spawned = std::thread::Builder::new()
                    .name("stream-client".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &slot, &shutdown) {
                            log::debug!("stream client {} dropped: {:#}", peer, err);
                        }
                    });
                match spawned {
                    Ok(join) => clients.push(join),
                    Err(err) => log::warn!("stream client {} rejected: {}", peer, err),
                }
                clients.retain(|client| !client.is_finished());
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => return Err(err.into()),
        }
    }
    for client in clients {
        let _ = client.join();
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, slot: &FrameSlot, shutdown: &AtomicBool) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        return write_response(&mut stream, 403, "text/plain", b"forbidden");
    }

    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        return write_response(&mut stream, 405, "text/plain", b"method not allowed");
    }
    match request.path.as_str() {
        "/" | "/index.html" => {
            write_response(&mut stream, 200, "text/html; charset=utf-8", VIEWER_PAGE.as_bytes())
        }
        "/health" => {
            let (seq, _) = slot.latest()?;
            let body = format!(r#"{{"status":"ok","frames":{}}}"#, seq);
            write_response(&mut stream, 200, "application/json", body.as_bytes())
        }
        "/frame.jpg" => match slot.latest()? {
            (_, Some(jpeg)) => write_response(&mut stream, 200, "image/jpeg", &jpeg),
            (_, None) => write_response(&mut stream, 503, "text/plain", b"no frame yet"),
        },
        "/stream" => stream_frames(&mut stream, slot, shutdown),
        _ => write_response(&mut stream, 404, "text/plain", b"not found"),
    }
}

fn stream_frames(stream: &mut TcpStream, slot: &FrameSlot, shutdown: &AtomicBool) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        BOUNDARY
    );
    stream.write_all(header.as_bytes())?;
    let mut sent = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        let (seq, jpeg) = slot.latest()?;
        match jpeg {
            Some(jpeg) if seq > sent => {
                let part = format!(
                    "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                    BOUNDARY,
                    jpeg.len()
                );
                stream.write_all(part.as_bytes())?;
                stream.write_all(&jpeg)?;
                stream.write_all(b"\r\n")?;
                stream.flush()?;
                sent = seq;
            }
            _ => std::thread::sleep(POLL_INTERVAL),
        }
    }
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    parse_request(&String::from_utf8_lossy(&data))
}

fn parse_request(text: &str) -> Result<HttpRequest> {
    let request_line = text.split("\r\n").next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{}\r\nContent-Type: {}\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line,
        content_type,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(addr: SocketAddr, path: &str) -> Result<Vec<u8>> {
        let mut client = TcpStream::connect(addr)?;
        client.set_read_timeout(Some(Duration::from_secs(5)))?;
        write!(client, "GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path)?;
        let mut response = Vec::new();
        client.read_to_end(&mut response)?;
        Ok(response)
    }

    fn split_response(response: &[u8]) -> Result<(String, &[u8])> {
        let end = response
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .ok_or_else(|| anyhow!("no header terminator"))?;
        Ok((
            String::from_utf8_lossy(&response[..end]).to_string(),
            &response[end + 4..],
        ))
    }

    #[test]
    fn latest_frame_is_served_as_jpeg() -> Result<()> {
        let (handle, mut sink) = StreamServer::new("127.0.0.1:0").spawn()?;

        let missing = get(handle.addr, "/frame.jpg")?;
        assert!(split_response(&missing)?.0.starts_with("HTTP/1.1 503"));

        sink.render(&RgbImage::from_pixel(64, 48, image::Rgb([200, 10, 10])))?;
        let response = get(handle.addr, "/frame.jpg?t=1")?;
        let (head, body) = split_response(&response)?;
        assert!(head.starts_with("HTTP/1.1 200"));
        assert!(head.contains("Content-Type: image/jpeg"));
        let decoded = image::load_from_memory(body)?.into_rgb8();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        let health = get(handle.addr, "/health")?;
        assert!(split_response(&health)?.1.ends_with(br#""frames":1}"#));
        handle.stop()
    }

    #[test]
    fn stream_pushes_multipart_jpeg_parts() -> Result<()> {
        let (handle, mut sink) = StreamServer::new("127.0.0.1:0").spawn()?;
        sink.render(&RgbImage::new(32, 32))?;

        let mut client = TcpStream::connect(handle.addr)?;
        client.set_read_timeout(Some(Duration::from_secs(5)))?;
        client.write_all(b"GET /stream HTTP/1.1\r\nHost: localhost\r\n\r\n")?;

        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while !received.windows(2).any(|w| w == [0xFF, 0xD9]) {
            let n = client.read(&mut buf)?;
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        let text = String::from_utf8_lossy(&received);
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.contains("multipart/x-mixed-replace; boundary=sentinelframe"));
        assert!(text.contains("--sentinelframe\r\nContent-Type: image/jpeg"));
        assert!(received.windows(2).any(|w| w == [0xFF, 0xD9]));

        drop(client);
        handle.stop()
    }

    #[test]
    fn viewer_page_and_unknown_paths() -> Result<()> {
        let (handle, _sink) = StreamServer::new("127.0.0.1:0").spawn()?;
        let page = get(handle.addr, "/")?;
        let (head, body) = split_response(&page)?;
        assert!(head.starts_with("HTTP/1.1 200"));
        assert!(String::from_utf8_lossy(body).contains("<img src=\"/stream\""));

        let missing = get(handle.addr, "/ws")?;
        assert!(split_response(&missing)?.0.starts_with("HTTP/1.1 404"));
        handle.stop()
    }

    #[test]
    fn rejects_bad_addresses_and_methods() -> Result<()> {
        assert!(StreamServer::new("not-an-address").spawn().is_err());
        let request = parse_request("POST /stream HTTP/1.1\r\nHost: x\r\n\r\n")?;
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/stream");
        assert!(parse_request("").is_err());
        Ok(())
    }
}
