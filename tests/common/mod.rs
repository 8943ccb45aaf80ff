//! Local HTTP fixture for install-flow tests (no external network).
//!
//! Routes can be replaced while the server runs, and every request path is
//! counted so tests can assert what was (not) fetched.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        HeaderMap, StatusCode, Uri,
        header::{CONTENT_RANGE, RANGE},
    },
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use silk_installer_lib::core::downloader::{Downloader, RetryPolicy};
use silk_installer_lib::core::version::{HttpManifestSource, VersionResolver};
use silk_installer_lib::{Installer, ProgressBus};
use tokio::net::TcpListener;

pub const MAIN_CLASS: &str = "de.rhm176.loader.Main";

#[derive(Clone, Default)]
pub struct Route {
    pub body: Vec<u8>,
    pub delay: Option<Duration>,
    pub status: Option<StatusCode>,
    /// Answer `Range: bytes=N-` with 206.
    pub ranges: bool,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Default)]
struct Shared {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    ranges: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

/// Counts a request as in flight until dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(shared: &Shared) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(shared.in_flight.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TestServer {
    base_url: String,
    shared: Shared,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Shared::default();

        let app = Router::new().fallback(handle).with_state(shared.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", addr.port()),
            shared,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn serve(&self, path: &str, route: Route) {
        self.shared
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), route);
    }

    pub fn hits(&self, path: &str) -> usize {
        self.shared
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn range_requests(&self) -> Vec<String> {
        self.shared.ranges.lock().unwrap().clone()
    }

    /// Highest number of requests the server was handling at once.
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }
}

async fn handle(State(shared): State<Shared>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    *shared.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;
    let _in_flight = InFlight::enter(&shared);

    let route = shared.routes.lock().unwrap().get(&path).cloned();
    let Some(route) = route else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(delay) = route.delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(status) = route.status {
        return status.into_response();
    }

    let start = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.strip_suffix('-'))
        .and_then(|v| v.parse::<usize>().ok());
    if let (true, Some(start)) = (route.ranges, start) {
        shared.ranges.lock().unwrap().push(format!("bytes={start}-"));
        let total = route.body.len();
        return Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(CONTENT_RANGE, format!("bytes {start}-{}/{total}", total - 1))
            .body(Body::from(route.body[start..].to_vec()))
            .unwrap();
    }

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Length", route.body.len().to_string())
        .body(Body::from(route.body))
        .unwrap()
}

// ─── Manifest helpers ───

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// One artifact of a test manifest.
pub struct Fixture {
    pub id: &'static str,
    pub path: &'static str,
    pub body: Vec<u8>,
    /// Server paths, in mirror order.
    pub mirrors: Vec<String>,
}

impl Fixture {
    pub fn new(id: &'static str, path: &'static str, body: &[u8]) -> Self {
        Self {
            id,
            path,
            body: body.to_vec(),
            mirrors: vec![format!("/a/{path}")],
        }
    }

    pub fn with_mirrors(mut self, mirrors: &[&str]) -> Self {
        self.mirrors = mirrors.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn primary(&self) -> &str {
        &self.mirrors[0]
    }
}

/// Serve every fixture's body on all of its mirrors.
pub fn serve_fixtures(server: &TestServer, fixtures: &[Fixture]) {
    for fixture in fixtures {
        for mirror in &fixture.mirrors {
            server.serve(mirror, Route::ok(fixture.body.clone()));
        }
    }
}

/// Schema 1 manifest with a single loader `2.3.0` for runtimes `[1.0,1.5)`.
pub fn manifest(server: &TestServer, fixtures: &[Fixture]) -> String {
    manifest_with_versions(server, fixtures, &["2.3.0"])
}

/// Like [`manifest`], listing the same artifacts under every loader version.
pub fn manifest_with_versions(server: &TestServer, fixtures: &[Fixture], versions: &[&str]) -> String {
    let artifacts: Vec<serde_json::Value> = fixtures
        .iter()
        .map(|f| {
            serde_json::json!({
                "id": f.id,
                "urls": f.mirrors.iter().map(|m| server.url(m)).collect::<Vec<_>>(),
                "checksum": { "algorithm": "sha256", "digest": sha256_hex(&f.body) },
                "size": f.body.len(),
                "path": f.path,
            })
        })
        .collect();

    let loaders: serde_json::Map<String, serde_json::Value> = versions
        .iter()
        .map(|version| {
            let entry = serde_json::json!({
                "channel": "stable",
                "runtime": "[1.0,1.5)",
                "mainClass": MAIN_CLASS,
                "jvmArgs": ["-Xmx1G"],
                "artifacts": artifacts.clone(),
            });
            (version.to_string(), entry)
        })
        .collect();

    serde_json::json!({
        "schemaVersion": 1,
        "loaders": loaders,
    })
    .to_string()
}

pub fn three_jars() -> Vec<Fixture> {
    vec![
        Fixture::new("silk-loader", "silk-loader.jar", b"loader jar bytes"),
        Fixture::new("lib-a", "lib/a.jar", b"library a"),
        Fixture::new("lib-c", "lib/c.jar", b"library c"),
    ]
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(20),
        attempt_timeout: Duration::from_secs(5),
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn downloader(bus: &ProgressBus) -> Downloader {
    Downloader::new(http_client(), bus.clone()).with_retry(fast_retry())
}

/// Installer against `/manifest.json` on `server`.
pub fn installer(server: &TestServer, bus: ProgressBus) -> Installer {
    let source = HttpManifestSource::new(http_client(), server.url("/manifest.json"), fast_retry());
    let resolver = VersionResolver::new(Arc::new(source));
    Installer::new(resolver, downloader(&bus), bus)
}

/// Start a server that serves `fixtures` and their manifest.
pub async fn serve_install(fixtures: &[Fixture]) -> TestServer {
    let server = TestServer::start().await;
    serve_fixtures(&server, fixtures);
    server.serve("/manifest.json", Route::ok(manifest(&server, fixtures)));
    server
}
