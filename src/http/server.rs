//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the forward-proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener, plain or TLS
//! - Forward requests upstream through the traced transport
//! - Publish one log event per completed upstream exchange
//!
//! # Design Decisions
//! - Timeouts bound the upstream exchange only, never the publish
//! - The publish runs on its own task so a dropped client cannot cancel it

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::event::LogEvent;
use crate::http::request::{self, MakeRequestUuid, UpstreamTarget};
use crate::lifecycle::ShutdownListener;
use crate::net::{Transport, TransportError};
use crate::observability::metrics;
use crate::pipeline::Dispatcher;
use crate::trace::TraceContext;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to build upstream transport: {0}")]
    Transport(#[from] TransportError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub transport: Arc<Transport>,
    pub source_name: Arc<str>,
    pub in_flight: Arc<Semaphore>,
}

/// Forward HTTP proxy that records network phase timings.
pub struct ProxyServer {
    router: Router,
    config: ProxyConfig,
}

impl ProxyServer {
    /// Create a new proxy server publishing into `dispatcher`.
    pub fn new(config: ProxyConfig, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let transport = Transport::new(&config.timeouts)?;

        let state = AppState {
            dispatcher,
            transport: Arc::new(transport),
            source_name: Arc::from(config.name.as_str()),
            in_flight: Arc::new(Semaphore::new(config.listener.max_connections)),
        };

        let router = Self::build_router(state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve until `shutdown` fires, then stop accepting and drain connections.
    pub async fn run(
        self,
        listener: TcpListener,
        tls: Option<RustlsConfig>,
        mut shutdown: ShutdownListener,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            tls = tls.is_some(),
            "Proxy server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        match tls {
            None => {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        shutdown.recv().await;
                        tracing::info!("Listener shutdown requested");
                    })
                    .await?;
            }
            Some(tls) => {
                let handle = axum_server::Handle::new();
                let grace = Duration::from_secs(self.config.timeouts.shutdown_secs);
                let signal = handle.clone();
                tokio::spawn(async move {
                    shutdown.recv().await;
                    tracing::info!("Listener shutdown requested");
                    signal.graceful_shutdown(Some(grace));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, tls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Forwards the request upstream and publishes its trace.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let request_id = request::request_id(&request);

    let _permit = match Arc::clone(&state.in_flight).try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(request_id = %request_id, peer = %peer, "Too many concurrent requests");
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many concurrent requests").into_response();
        }
    };

    if request.method() == Method::CONNECT {
        tracing::debug!(request_id = %request_id, uri = %request.uri(), "CONNECT tunneling not supported");
        return (StatusCode::NOT_IMPLEMENTED, "CONNECT is not supported").into_response();
    }

    let target = match UpstreamTarget::from_request(&request) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let method = request.method().to_string();
    let url = target.url();
    tracing::debug!(
        request_id = %request_id,
        peer = %peer,
        method = %method,
        url = %url,
        "Proxying request"
    );

    let mut trace = TraceContext::begin();
    match state
        .transport
        .forward(target.prepare(request), &target, &mut trace)
        .await
    {
        Ok(response) => {
            let status = response.status();
            let event = LogEvent::build(&state.source_name, url, method, status.as_u16(), &trace);
            metrics::record_trace(&event.trace);
            let dispatcher = state.dispatcher.clone();
            match tokio::spawn(async move { dispatcher.publish(event).await }).await {
                Ok(accepted) => {
                    tracing::trace!(request_id = %request_id, sinks = accepted, "Published log event");
                }
                Err(e) => tracing::error!(request_id = %request_id, error = %e, "Publish task failed"),
            }

            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, url = %url, error = %e, "Upstream error");
            let status = if e.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
            (status, "Upstream request failed").into_response()
        }
    }
}
