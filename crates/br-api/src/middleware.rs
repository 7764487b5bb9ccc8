//! HTTP middleware for the API server.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::any::Any;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Instant;
use tracing::{error, info, warn, Span};

use crate::error::{ApiError, ErrorResponse};
use crate::state::AppState;
use crate::webhooks::headers::REQUEST_ID;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Middleware to add request ID to requests and responses.
///
/// Uses the caller's `request-id` header when present, otherwise
/// `req_<epochMillis>`.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(generate_request_id);

    request.extensions_mut().insert(RequestId(request_id.clone()));
    Span::current().record("request_id", &request_id);

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }

    response
}

pub fn generate_request_id() -> String {
    format!("req_{}", Utc::now().timestamp_millis())
}

/// Request ID extension type.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Middleware for request logging.
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request completed with error"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request completed"
        );
    }

    response
}

/// Middleware to add CORS headers.
///
/// Sentry calls the webhook server-to-server, so only the read-only
/// endpoints need to be reachable from browsers.
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([HeaderName::from_static(REQUEST_ID)])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Middleware to add security headers.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );

    response
}

/// Source addresses permitted to post webhooks.
///
/// The client address is the socket peer. `X-Forwarded-For` is only
/// consulted when the peer is one of the configured trusted proxies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpAllowlist {
    addresses: Vec<IpAddr>,
    trusted_proxies: Vec<IpAddr>,
}

impl IpAllowlist {
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: canonical(addresses),
            trusted_proxies: Vec::new(),
        }
    }

    /// Parses textual addresses, skipping blank entries.
    pub fn parse<I, S>(entries: I) -> Result<Self, AddrParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(parse_addresses(entries)?))
    }

    /// Proxies whose `X-Forwarded-For` header is believed.
    pub fn with_trusted_proxies(mut self, proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        self.trusted_proxies = canonical(proxies);
        self
    }

    /// Like [`with_trusted_proxies`](Self::with_trusted_proxies), from text.
    pub fn with_trusted_proxy_list<I, S>(self, entries: I) -> Result<Self, AddrParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.with_trusted_proxies(parse_addresses(entries)?))
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn trusted_proxies(&self) -> &[IpAddr] {
        &self.trusted_proxies
    }

    /// An empty list allows every address.
    pub fn allows(&self, ip: IpAddr) -> bool {
        self.is_empty() || self.addresses.contains(&ip.to_canonical())
    }

    fn is_trusted_proxy(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.contains(&ip.to_canonical())
    }

    /// Works out the originating address from the socket peer and an
    /// optional `X-Forwarded-For` value.
    ///
    /// Behind a trusted peer the header is walked right to left and the
    /// first hop that is not itself a trusted proxy wins. An unparseable hop
    /// yields `None`.
    pub fn resolve_client(
        &self,
        peer: Option<IpAddr>,
        forwarded_for: Option<&str>,
    ) -> Option<IpAddr> {
        let peer = peer?;
        let forwarded_for = match forwarded_for {
            Some(value) if self.is_trusted_proxy(peer) => value,
            _ => return Some(peer),
        };

        let mut client = peer;
        let hops = forwarded_for
            .rsplit(',')
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        for hop in hops {
            client = hop.parse::<IpAddr>().ok()?;
            if !self.is_trusted_proxy(client) {
                break;
            }
        }
        Some(client)
    }
}

fn canonical(addresses: impl IntoIterator<Item = IpAddr>) -> Vec<IpAddr> {
    addresses.into_iter().map(|ip| ip.to_canonical()).collect()
}

fn parse_addresses<I, S>(entries: I) -> Result<Vec<IpAddr>, AddrParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| entry.as_ref().trim().to_string())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse::<IpAddr>())
        .collect()
}

/// Originating address of `request` as seen through `allowlist`'s trusted
/// proxies.
pub fn client_ip(request: &Request, allowlist: &IpAllowlist) -> Option<IpAddr> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let forwarded_for = request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok());

    allowlist.resolve_client(peer, forwarded_for)
}

/// Rejects requests from addresses outside the configured allowlist.
pub async fn ip_allowlist(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.allowlist.is_empty() {
        return Ok(next.run(request).await);
    }

    match client_ip(&request, &state.allowlist) {
        Some(ip) if state.allowlist.allows(ip) => Ok(next.run(request).await),
        Some(ip) => {
            warn!(client_ip = %ip, "Webhook from address outside allowlist");
            metrics::counter!("br_webhooks_rejected_total", "reason" => "ip").increment(1);
            Err(ApiError::Forbidden(format!("Source address {} is not allowed", ip)))
        }
        None => {
            warn!("Webhook with unknown source address while allowlist is active");
            metrics::counter!("br_webhooks_rejected_total", "reason" => "ip").increment(1);
            Err(ApiError::Forbidden(
                "Source address could not be determined".to_string(),
            ))
        }
    }
}

/// Maps a handler panic to a JSON 500.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
            message: "Something went wrong".to_string(),
            details: None,
            request_id: None,
        }),
    )
        .into_response()
}
