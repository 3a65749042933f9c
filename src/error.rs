use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::sync::Once;
use thiserror::Error;

/// Failures raised by the logging subsystem itself.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("failed to write log file {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LogError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LogError::WriteFailure {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a failed request dispatch.
///
/// Handlers return `Result<_, AppError>`. The response produced here is only
/// a carrier: [`crate::intercept::intercept_errors`] picks the failure out of
/// the response extensions, logs it and replaces the body with a sanitized one.
#[derive(Debug, Clone)]
pub enum AppError {
    /// No route matched the request.
    NotFound,
    /// The handler explicitly reported a server-side failure.
    Internal,
    /// Anything else that escaped the handler.
    Unhandled { message: String, stacktrace: String },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal | AppError::Unhandled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The fixed body text a client gets for this failure class.
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::NotFound => "Not Found",
            AppError::Internal => "Internal Server Error",
            AppError::Unhandled { .. } => "Unexpected Server Error",
        }
    }

    /// Build an `Unhandled` failure from a caught panic payload.
    ///
    /// The stack trace is the one recorded by [`install_panic_hook`] on this
    /// thread when the panic was raised. Without the hook it falls back to a
    /// trace of the catching frame.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };

        let stacktrace = PANIC_TRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| {
                format!("panic: {message}\n\nStack backtrace:\n{}", Backtrace::force_capture())
            });

        AppError::Unhandled { message, stacktrace }
    }

    /// Classify an error status that no handler reported through `AppError`,
    /// such as axum's own 405 for a route hit with the wrong method or an
    /// extractor rejection.
    pub fn from_status(status: StatusCode, method: &Method, path: &str) -> Self {
        if status == StatusCode::NOT_FOUND {
            return AppError::NotFound;
        }

        let message = format!("{status}: {method} {path}");
        AppError::Unhandled {
            stacktrace: format!(
                "{message} (rejected before reaching a handler)\n\nStack backtrace:\n{}",
                Backtrace::force_capture()
            ),
            message,
        }
    }
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record a backtrace at the point of every panic so that
/// [`AppError::from_panic`] can report the frames that actually panicked.
/// The previously installed hook still runs. Safe to call more than once.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = format!("{info}\n\nStack backtrace:\n{}", Backtrace::force_capture());
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err: anyhow::Error = err.into();
        let stacktrace = match err.backtrace().status() {
            BacktraceStatus::Captured => format!("{err:?}"),
            _ => format!("{err:?}\n\nStack backtrace:\n{}", Backtrace::force_capture()),
        };

        AppError::Unhandled {
            message: err.to_string(),
            stacktrace,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.public_message()).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anyhow_errors_become_unhandled_with_a_stacktrace() {
        let err: AppError = anyhow::anyhow!("database exploded").into();
        match err {
            AppError::Unhandled {
                message,
                stacktrace,
            } => {
                assert_eq!(message, "database exploded");
                assert!(stacktrace.contains("database exploded"));
                assert!(stacktrace.len() > message.len());
            }
            other => panic!("expected Unhandled, got {other:?}"),
        }
    }

    #[test]
    fn io_errors_convert_through_anyhow() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let err = AppError::from(io_err);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Unexpected Server Error");
    }

    #[test]
    fn panic_payloads_keep_their_message() {
        let err = AppError::from_panic(Box::new("boom"));
        match err {
            AppError::Unhandled { message, stacktrace } => {
                assert_eq!(message, "boom");
                assert!(!stacktrace.is_empty());
            }
            other => panic!("expected Unhandled, got {other:?}"),
        }
    }

    #[inline(never)]
    fn explode_in_report_builder() {
        panic!("report builder gave up");
    }

    #[test]
    fn panic_stacktrace_shows_the_panicking_frame() {
        install_panic_hook();

        let payload = std::panic::catch_unwind(explode_in_report_builder).unwrap_err();
        match AppError::from_panic(payload) {
            AppError::Unhandled { message, stacktrace } => {
                assert_eq!(message, "report builder gave up");
                assert!(
                    stacktrace.contains("explode_in_report_builder"),
                    "panic site missing from:\n{stacktrace}"
                );
            }
            other => panic!("expected Unhandled, got {other:?}"),
        }
    }

    #[test]
    fn panic_trace_is_consumed_once() {
        install_panic_hook();

        let payload = std::panic::catch_unwind(|| panic!("first")).unwrap_err();
        let _ = AppError::from_panic(payload);
        assert!(PANIC_TRACE.with(|slot| slot.borrow().is_none()));
    }

    #[test]
    fn bare_statuses_fall_into_the_fixed_classes() {
        assert!(matches!(
            AppError::from_status(StatusCode::NOT_FOUND, &Method::GET, "/nope"),
            AppError::NotFound
        ));

        match AppError::from_status(StatusCode::METHOD_NOT_ALLOWED, &Method::POST, "/time-series") {
            AppError::Unhandled { message, stacktrace } => {
                assert_eq!(message, "405 Method Not Allowed: POST /time-series");
                assert!(stacktrace.starts_with(&message));
            }
            other => panic!("expected Unhandled, got {other:?}"),
        }
    }

    #[test]
    fn failure_classes_map_to_fixed_statuses() {
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotFound.public_message(), "Not Found");
        assert_eq!(AppError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::Internal.public_message(), "Internal Server Error");
    }

    #[test]
    fn into_response_carries_the_failure() {
        let response = AppError::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(
            response.extensions().get::<AppError>(),
            Some(AppError::Internal)
        ));
    }
}
