// Request timing middleware.
//
// Every request that runs to completion produces exactly one access record
// on the `access` stream. Failures have already been turned into responses
// by `intercept::intercept_errors` (layered inside this one), so the status
// seen here is the status the client gets. A request whose future is
// dropped before completion produces no record.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::convert::Infallible;
use std::future::{ready, Future};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::error::LogError;
use crate::stream::{AccessRecord, Severity};
use crate::AppState;

const UNKNOWN_CLIENT: &str = "unknown";

/// Resolved client address of the current request, stored in the request
/// extensions by [`track_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl ClientAddr {
    /// Prefer the proxy-forwarded address over the raw socket peer.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(fwd) = headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(first) = fwd.split(',').next().map(str::trim) {
                if !first.is_empty() {
                    return ClientAddr(first.to_string());
                }
            }
        }
        match peer {
            Some(addr) => ClientAddr(addr.ip().to_string()),
            None => ClientAddr(UNKNOWN_CLIENT.to_string()),
        }
    }

    fn from_parts(parts: &Parts) -> Self {
        if let Some(addr) = parts.extensions.get::<ClientAddr>() {
            return addr.clone();
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self::resolve(&parts.headers, peer)
    }

    pub fn of(req: &Request) -> Self {
        if let Some(addr) = req.extensions().get::<ClientAddr>() {
            return addr.clone();
        }
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self::resolve(req.headers(), peer)
    }
}

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        ready(Ok(Self::from_parts(parts)))
    }
}

/// A request that has started but not yet completed.
#[derive(Debug)]
pub struct RequestTiming {
    started: Instant,
    method: String,
    path: String,
    client: ClientAddr,
    user_agent: Option<String>,
}

impl RequestTiming {
    pub fn start(req: &Request) -> Self {
        Self {
            started: Instant::now(),
            method: req.method().to_string(),
            path: req.uri().path().to_owned(),
            client: ClientAddr::of(req),
            user_agent: req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        }
    }

    pub fn client(&self) -> &ClientAddr {
        &self.client
    }

    /// Close the request with the status the client received.
    pub fn finish(self, status: StatusCode) -> Result<AccessRecord, LogError> {
        AccessRecord::new(
            self.method,
            self.path,
            status.as_u16(),
            self.client.0,
            self.user_agent,
            self.started.elapsed().as_secs_f64(),
        )
    }
}

pub async fn track_request(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let timing = RequestTiming::start(&req);
    req.extensions_mut().insert(timing.client().clone());

    let response = next.run(req).await;

    match timing.finish(response.status()) {
        Ok(record) => state.loggers.access.log(Severity::Info, record).await,
        Err(e) => tracing::warn!(error = %e, "Could not build access record"),
    }

    response
}
