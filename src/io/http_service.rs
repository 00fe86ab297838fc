// src/io/http_service.rs - HTTP front of the node
use std::fs::File;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::core::lock::lock_mutex;
use crate::core::timestamp::parse_date_dir;
use crate::core::wait::StopSignal;
use crate::io::http_live_out::LiveStream;
use crate::recorder::{Catalog, SegmentRecorder, list_recordings};
use crate::ring::FrameBuffer;

const ACCEPT_POLL: Duration = Duration::from_millis(200);
/// How long `join` waits for request threads before leaving them behind.
pub const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

type Workers = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Everything the routes read from. Cloned into every request thread.
#[derive(Clone)]
pub struct HttpContext {
    pub buffer: Arc<FrameBuffer>,
    pub recorder: Option<Arc<SegmentRecorder>>,
    pub recordings_root: PathBuf,
    pub boundary: String,
    pub stop: Arc<StopSignal>,
}

pub struct HttpService {
    addr: Option<SocketAddr>,
    accept: Option<JoinHandle<()>>,
    workers: Workers,
}

impl HttpService {
    pub fn start(bind: &str, ctx: HttpContext) -> anyhow::Result<Self> {
        let server = Server::http(bind).map_err(|e| anyhow::anyhow!("bind {}: {}", bind, e))?;
        let addr = server.server_addr().to_ip();
        let workers: Workers = Arc::new(Mutex::new(Vec::new()));

        let shown = addr.map(|a| a.to_string()).unwrap_or_else(|| bind.to_string());
        info!("[http] listening on {}", shown);

        let accept = thread::Builder::new().name("http-accept".into()).spawn({
            let workers = workers.clone();
            move || {
                while !ctx.stop.is_stopped() {
                    let req = match server.recv_timeout(ACCEPT_POLL) {
                        Ok(Some(req)) => req,
                        Ok(None) => continue,
                        Err(e) => {
                            error!("[http] accept failed: {}", e);
                            break;
                        }
                    };
                    route(req, &ctx, &workers);
                }
                debug!("[http] accept loop finished");
            }
        })?;

        Ok(Self {
            addr,
            accept: Some(accept),
            workers,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Joins the accept loop, then every request thread that finishes within
    /// `WORKER_JOIN_TIMEOUT`. A thread stuck writing to a client that stopped
    /// reading is detached.
    pub fn join(&mut self) {
        if let Some(handle) = self.accept.take() {
            if handle.join().is_err() {
                error!("[http] accept thread panicked");
            }
        }

        let mut pending: Vec<_> = lock_mutex(&self.workers, "HttpService::join")
            .drain(..)
            .collect();
        let deadline = Instant::now() + WORKER_JOIN_TIMEOUT;
        while !pending.is_empty() && Instant::now() < deadline {
            let (done, rest): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|h| h.is_finished());
            for handle in done {
                if handle.join().is_err() {
                    error!("[http] request thread panicked");
                }
            }
            pending = rest;
            if !pending.is_empty() {
                thread::sleep(Duration::from_millis(20));
            }
        }

        if !pending.is_empty() {
            warn!("[http] detached {} stalled request thread(s)", pending.len());
        }
        info!("[http] stopped");
    }
}

fn route(req: Request, ctx: &HttpContext, workers: &Workers) {
    if req.method() != &Method::Get {
        let _ = req.respond(Response::empty(StatusCode(405)));
        return;
    }

    let url = req.url().split('?').next().unwrap_or("").to_string();
    debug!("[http] GET {}", url);

    match url.as_str() {
        "/" => {
            let mut resp = Response::empty(StatusCode(301));
            if let Some(h) = header("Location", "/stream.mjpg") {
                resp.add_header(h);
            }
            let _ = req.respond(resp);
        }
        "/stream.mjpg" => {
            let peer = peer_of(&req);
            spawn_worker(workers, format!("viewer-{}", peer), {
                let ctx = ctx.clone();
                move || stream_to(req, &ctx, &peer)
            });
        }
        "/snapshot.jpg" => spawn_worker(workers, "http-snapshot".into(), {
            let ctx = ctx.clone();
            move || handle_snapshot(req, &ctx)
        }),
        "/api/recordings" => spawn_worker(workers, "http-listing".into(), {
            let ctx = ctx.clone();
            move || handle_recordings(req, &ctx)
        }),
        "/api/recorder" => match &ctx.recorder {
            Some(rec) => respond_json(req, &rec.status()),
            None => {
                let resp = Response::from_string("recorder disabled");
                let _ = req.respond(resp.with_status_code(StatusCode(404)));
            }
        },
        other => match other.strip_prefix("/download/") {
            Some(rel) => {
                let rel = rel.to_string();
                spawn_worker(workers, "http-download".into(), {
                    let ctx = ctx.clone();
                    move || handle_download(req, &ctx, &rel)
                });
            }
            None => {
                warn!("[http] no route for {}", other);
                let _ = req.respond(Response::empty(StatusCode(404)));
            }
        },
    }
}

/// Runs one request off the accept thread so a slow client only holds up
/// itself.
fn spawn_worker<F>(workers: &Workers, name: String, work: F)
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new().name(name).spawn(work) {
        Ok(handle) => {
            let mut list = lock_mutex(workers, "http::spawn_worker");
            list.retain(|h| !h.is_finished());
            list.push(handle);
        }
        Err(e) => error!("[http] cannot spawn request thread: {}", e),
    }
}

fn peer_of(req: &Request) -> String {
    req.remote_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn stream_to(req: Request, ctx: &HttpContext, peer: &str) {
    let live = LiveStream::new(peer, &ctx.boundary, &ctx.buffer, &ctx.stop);
    let mut out = req.into_writer();
    if let Err(e) = live.write_head(&mut out) {
        debug!("[http] {} left before the stream started: {}", peer, e);
        return;
    }
    live.run(&mut out);
}

fn handle_snapshot(req: Request, ctx: &HttpContext) {
    let Some(frame) = ctx.buffer.snapshot() else {
        let resp = Response::from_string("no frame yet");
        let _ = req.respond(resp.with_status_code(StatusCode(503)));
        return;
    };

    let mut resp = Response::from_data(frame.data.to_vec());
    for (k, v) in [("Content-Type", "image/jpeg"), ("Cache-Control", "no-store")] {
        if let Some(h) = header(k, v) {
            resp.add_header(h);
        }
    }
    let _ = req.respond(resp);
}

fn handle_recordings(req: Request, ctx: &HttpContext) {
    let catalog = if ctx.recordings_root.is_dir() {
        match list_recordings(&ctx.recordings_root) {
            Ok(c) => c,
            Err(e) => {
                error!("[http] listing {} failed: {}", ctx.recordings_root.display(), e);
                let resp = Response::from_string("listing failed");
                let _ = req.respond(resp.with_status_code(StatusCode(500)));
                return;
            }
        }
    } else {
        Catalog::default()
    };
    respond_json(req, &catalog);
}

fn handle_download(req: Request, ctx: &HttpContext, rel: &str) {
    let Some(path) = resolve_download(&ctx.recordings_root, rel) else {
        warn!("[http] rejected download path {:?}", rel);
        let resp = Response::from_string("bad path");
        let _ = req.respond(resp.with_status_code(StatusCode(400)));
        return;
    };

    let file = match File::open(&path) {
        Ok(f) => f,
        Err(_) => {
            let _ = req.respond(Response::empty(StatusCode(404)));
            return;
        }
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut resp = Response::from_file(file);
    if let Some(h) = header("Content-Type", content_type_for(&path)) {
        resp.add_header(h);
    }
    let disposition = format!("attachment; filename=\"{}\"", name);
    if let Some(h) = header("Content-Disposition", &disposition) {
        resp.add_header(h);
    }
    let _ = req.respond(resp);
}

/// Maps `<file>` or `<YYYY-MM-DD>/<file>` below `root`. Anything else,
/// including `..`, separators inside the name or hidden files, is refused.
pub fn resolve_download(root: &Path, rel: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(rel).ok()?;
    let parts: Vec<&str> = decoded.split('/').collect();

    let (day, name) = match parts.as_slice() {
        [name] => (None, *name),
        [day, name] => (Some(*day), *name),
        _ => return None,
    };

    if name.is_empty() || name.starts_with('.') || name.contains('\\') || name.contains('\0') {
        return None;
    }

    match day {
        Some(d) => {
            parse_date_dir(d)?;
            Some(root.join(d).join(name))
        }
        None => Some(root.join(name)),
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("mjpeg") | Some("mjpg") => "video/x-motion-jpeg",
        Some("h264") => "video/h264",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

fn respond_json<T: Serialize>(req: Request, value: &T) {
    match serde_json::to_string(value) {
        Ok(body) => {
            let mut resp = Response::from_string(body);
            if let Some(h) = header("Content-Type", "application/json") {
                resp.add_header(h);
            }
            let _ = req.respond(resp);
        }
        Err(e) => {
            error!("[http] json encode failed: {}", e);
            let _ = req.respond(Response::empty(StatusCode(500)));
        }
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_paths() {
        let root = Path::new("/rec");
        assert_eq!(
            resolve_download(root, "2025-10-19/recording_20251019_130509.mp4"),
            Some(PathBuf::from("/rec/2025-10-19/recording_20251019_130509.mp4"))
        );
        assert_eq!(
            resolve_download(root, "recording_20251019_130509.mp4"),
            Some(PathBuf::from("/rec/recording_20251019_130509.mp4"))
        );
        assert!(resolve_download(root, "../etc/passwd").is_none());
        assert!(resolve_download(root, "2025-10-19/../../etc/passwd").is_none());
        assert!(resolve_download(root, "%2E%2E/secret").is_none());
        assert!(resolve_download(root, "misc/file.mp4").is_none());
        assert!(resolve_download(root, "2025-10-19/.hidden").is_none());
        assert!(resolve_download(root, "2025-10-19/").is_none());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.mjpeg")), "video/x-motion-jpeg");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
    }
}
