use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::stream::{ApplicationRecord, Severity};
use crate::timing::ClientAddr;
use crate::AppState;

const TIME_SERIES_STEPS: [&str; 4] = [
    "Step 1: Received request at index endpoint",
    "Step 2: Retrieved client IP",
    "Step 3: Generated timestamp",
    "Step 4: Prepared response JSON",
];

#[derive(Debug, Serialize)]
pub struct TimeSeriesResponse {
    pub timestamp: String,
    pub ip: String,
}

pub async fn time_series(
    State(state): State<Arc<AppState>>,
    ClientAddr(ip): ClientAddr,
) -> Json<TimeSeriesResponse> {
    let now = Utc::now();

    let record = ApplicationRecord::at(
        now,
        Severity::Info,
        crate::stream::record::APPLICATION_EVENT,
        "Index endpoint executed successfully",
        TIME_SERIES_STEPS.iter().map(|s| s.to_string()).collect(),
        ip.clone(),
    );
    state.loggers.application.log(Severity::Info, record).await;

    Json(TimeSeriesResponse {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
        ip,
    })
}

/// Router fallback: nothing matched the request path.
pub async fn not_found() -> AppError {
    AppError::NotFound
}
