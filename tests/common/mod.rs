use axum::{body::Body, http::Request, response::Response};
use chrono::{DateTime, TimeZone, Utc};
use reqlog::stream::{ManualClock, ACCESS_LOG_FILE, APPLICATION_LOG_FILE};
use reqlog::{create_router, error, AppState, Config, LogConfig, Loggers};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub fn access_log(&self) -> PathBuf {
        self.dir.path().join(ACCESS_LOG_FILE)
    }

    pub fn application_log(&self) -> PathBuf {
        self.dir.path().join(APPLICATION_LOG_FILE)
    }

    pub fn access_records(&self) -> Vec<serde_json::Value> {
        read_records(&self.access_log())
    }

    pub fn application_records(&self) -> Vec<serde_json::Value> {
        read_records(&self.application_log())
    }
}

pub fn start_of_test_day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

/// Build the state with loggers rooted in a fresh temp dir and a manual clock.
pub fn test_state() -> (Arc<AppState>, Arc<ManualClock>, TempDir) {
    error::install_panic_hook();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let clock = Arc::new(ManualClock::new(start_of_test_day()));

    let config = Config {
        server_address: "127.0.0.1:0".to_string(),
        log: LogConfig::in_dir(dir.path()),
    };
    let loggers =
        Loggers::open_with_clock(&config.log, clock.clone()).expect("Failed to open loggers");

    let state = Arc::new(AppState { config, loggers });
    (state, clock, dir)
}

pub fn spawn_app() -> TestApp {
    let (state, clock, dir) = test_state();
    let router = create_router(state.clone());

    TestApp {
        router,
        state,
        clock,
        dir,
    }
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .extension(axum::extract::ConnectInfo(peer()))
        .body(Body::empty())
        .unwrap()
}

pub fn peer() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn read_records(path: &std::path::Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("log line is not valid JSON"))
        .collect()
}
