//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4)
//! - Extract the upstream target from an absolute-form URI or the Host header
//! - Prepare the request for forwarding (origin-form URI, hop-by-hop headers removed)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The target is resolved once and reused for the log event URL

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::uri::{Authority, PathAndQuery};
use axum::http::{Request, Uri, Version};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Headers that apply to a single hop and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Issues a fresh UUID for requests that arrive without an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(value))
    }
}

/// Read the request ID set by the request-id layer.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    #[error("request has no upstream host")]
    MissingHost,

    #[error("invalid host header: {0}")]
    InvalidHost(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamScheme {
    Http,
    Https,
}

impl UpstreamScheme {
    fn default_port(self) -> u16 {
        match self {
            UpstreamScheme::Http => 80,
            UpstreamScheme::Https => 443,
        }
    }
}

impl fmt::Display for UpstreamScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamScheme::Http => f.write_str("http"),
            UpstreamScheme::Https => f.write_str("https"),
        }
    }
}

/// Where a proxied request is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    scheme: UpstreamScheme,
    host: String,
    port: u16,
    path_and_query: String,
}

impl UpstreamTarget {
    /// Resolve the target from the request line, falling back to `Host`.
    pub fn from_request<B>(request: &Request<B>) -> Result<Self, TargetError> {
        let uri = request.uri();
        let scheme = match uri.scheme_str() {
            None | Some("http") => UpstreamScheme::Http,
            Some("https") => UpstreamScheme::Https,
            Some(other) => return Err(TargetError::UnsupportedScheme(other.to_string())),
        };

        let authority = match uri.authority() {
            Some(authority) => authority.clone(),
            None => {
                let value = request
                    .headers()
                    .get(header::HOST)
                    .ok_or(TargetError::MissingHost)?;
                let text = value
                    .to_str()
                    .map_err(|_| TargetError::InvalidHost(String::from_utf8_lossy(value.as_bytes()).into_owned()))?;
                text.parse::<Authority>()
                    .map_err(|_| TargetError::InvalidHost(text.to_string()))?
            }
        };

        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(TargetError::MissingHost);
        }

        Ok(Self {
            scheme,
            port: authority.port_u16().unwrap_or(scheme.default_port()),
            host,
            path_and_query: uri
                .path_and_query()
                .map(PathAndQuery::as_str)
                .unwrap_or("/")
                .to_string(),
        })
    }

    /// Host name without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == UpstreamScheme::Https
    }

    /// `Some` when the host is an IP literal and needs no name resolution.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    /// `host[:port]`, omitting the scheme's default port.
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Absolute URL recorded in log events.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority(), self.path_and_query)
    }

    /// Rewrite `request` for the upstream hop.
    pub fn prepare(&self, request: Request<Body>) -> Request<Body> {
        let (mut parts, body) = request.into_parts();

        for name in connection_tokens(&parts.headers) {
            parts.headers.remove(name);
        }
        for name in HOP_BY_HOP {
            parts.headers.remove(name);
        }
        if let Ok(host) = HeaderValue::from_str(&self.authority()) {
            parts.headers.insert(header::HOST, host);
        }

        if let Ok(uri) = self.path_and_query.parse::<Uri>() {
            parts.uri = uri;
        }
        parts.version = Version::HTTP_11;

        Request::from_parts(parts, body)
    }
}

/// Extra hop-by-hop headers named in `Connection`.
fn connection_tokens(headers: &header::HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}
