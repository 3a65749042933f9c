// Error interceptor.
//
// Handlers return `Result<_, AppError>`; the error travels out in the
// response extensions. This middleware is the single place where failures
// are logged to the `application` stream and rewritten into one of three
// fixed JSON bodies. Panics are caught here too and treated as unhandled
// failures, and so is any error status the framework produced on its own
// (405, extractor rejections).

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::AppError;
use crate::stream::{ApplicationRecord, Severity};
use crate::timing::ClientAddr;
use crate::AppState;

pub async fn intercept_errors(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let client = ClientAddr::of(&req);

    let failure = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(mut response) => match response.extensions_mut().remove::<AppError>() {
            Some(failure) => failure,
            None if is_failure(response.status()) => {
                AppError::from_status(response.status(), &method, &path)
            }
            None => return response,
        },
        Err(payload) => AppError::from_panic(payload),
    };

    let record = failure_record(&failure, &path, &client.0);
    state.loggers.application.log(record.level(), record).await;

    (
        failure.status(),
        Json(json!({ "error": failure.public_message() })),
    )
        .into_response()
}

/// The application record describing a failed request.
pub fn failure_record(failure: &AppError, path: &str, ip: &str) -> ApplicationRecord {
    match failure {
        AppError::NotFound => ApplicationRecord::new(
            Severity::Warning,
            format!("Resource not found: {path}"),
            steps(&["Error handler triggered", "Returned 404 Not Found"]),
            ip,
        ),
        AppError::Internal => ApplicationRecord::new(
            Severity::Error,
            format!("Internal server error at {path}"),
            steps(&[
                "Error handler triggered",
                "Returned 500 Internal Server Error",
            ]),
            ip,
        ),
        AppError::Unhandled {
            message,
            stacktrace,
        } => ApplicationRecord::error_with_stacktrace(
            message.clone(),
            steps(&["Unhandled exception occurred"]),
            ip,
            stacktrace.clone(),
        ),
    }
}

fn is_failure(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

fn steps(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_a_warning_naming_the_path() {
        let record = failure_record(&AppError::NotFound, "/missing", "10.1.1.1");
        assert_eq!(record.level(), Severity::Warning);
        assert_eq!(record.message(), "Resource not found: /missing");
        assert_eq!(record.ip(), "10.1.1.1");
        assert!(record.stacktrace().is_none());
    }

    #[test]
    fn internal_is_an_error_naming_the_path() {
        let record = failure_record(&AppError::Internal, "/reports", "10.1.1.1");
        assert_eq!(record.level(), Severity::Error);
        assert_eq!(record.message(), "Internal server error at /reports");
        assert_eq!(record.trace().len(), 2);
    }

    #[test]
    fn only_error_statuses_are_failures() {
        assert!(is_failure(StatusCode::METHOD_NOT_ALLOWED));
        assert!(is_failure(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(is_failure(StatusCode::BAD_GATEWAY));
        assert!(!is_failure(StatusCode::OK));
        assert!(!is_failure(StatusCode::NOT_MODIFIED));
    }

    #[test]
    fn unhandled_keeps_message_and_stacktrace() {
        let failure = AppError::Unhandled {
            message: "division by zero".to_string(),
            stacktrace: "at calc.rs:10".to_string(),
        };
        let record = failure_record(&failure, "/calc", "10.1.1.1");
        assert_eq!(record.level(), Severity::Error);
        assert_eq!(record.message(), "division by zero");
        assert_eq!(record.stacktrace(), Some("at calc.rs:10"));
        assert_eq!(record.trace(), ["Unhandled exception occurred".to_string()]);
    }
}
