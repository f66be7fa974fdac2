//! Instrumented upstream transport.
//!
//! Performs name resolution, TCP dial, optional TLS and the HTTP/1
//! exchange itself so each step can fire its phase hook at the exact instant.
//! The first response byte is stamped by the connection's read side, not
//! when hyper finishes parsing the head.

use axum::body::Body;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::RootCertStore;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::config::TimeoutConfig;
use crate::http::request::UpstreamTarget;
use crate::trace::PhaseHooks;

/// Errors talking to the upstream server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no addresses found for {0}")]
    NoAddress(String),

    #[error("failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid TLS server name {0}")]
    ServerName(String),

    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("upstream request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("failed to build TLS client: {0}")]
    ClientConfig(#[from] rustls::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(..))
    }
}

/// Opens a fresh, fully traced upstream connection per request.
pub struct Transport {
    tls: TlsConnector,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl Transport {
    /// Build the transport with platform root certificates.
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            tracing::warn!(error = %e, "Failed to load native root certificates");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "Loaded native root certificates");

        Self::with_roots(roots, timeouts)
    }

    /// Build the transport trusting only `roots`.
    pub fn with_roots(roots: RootCertStore, timeouts: &TimeoutConfig) -> Result<Self, TransportError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let mut config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            tls: TlsConnector::from(Arc::new(config)),
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
            response_timeout: Duration::from_secs(timeouts.request_secs),
        })
    }

    /// Send `request` to `target`, firing `hooks` as the exchange progresses.
    ///
    /// Returns once the response head has arrived; the body streams afterwards.
    /// Each connection step is bounded by the connect timeout, and the wait
    /// for the response head by the request timeout.
    pub async fn forward<H>(
        &self,
        request: Request<Body>,
        target: &UpstreamTarget,
        hooks: &mut H,
    ) -> Result<Response<Incoming>, TransportError>
    where
        H: PhaseHooks + Send,
    {
        hooks.get_conn();
        let tcp = self.dial(target, hooks).await?;

        if target.is_tls() {
            let tls = self.handshake_tls(target, tcp, hooks).await?;
            self.exchange(tls, request, hooks).await
        } else {
            self.exchange(tcp, request, hooks).await
        }
    }

    async fn dial<H: PhaseHooks>(
        &self,
        target: &UpstreamTarget,
        hooks: &mut H,
    ) -> Result<TcpStream, TransportError> {
        let addrs: Vec<SocketAddr> = match target.ip() {
            Some(ip) => vec![SocketAddr::new(ip, target.port())],
            None => {
                hooks.dns_start();
                let resolved = timeout(self.connect_timeout, lookup_host((target.host(), target.port()))).await;
                hooks.dns_done();
                resolved
                    .map_err(|_| TransportError::Timeout("dns lookup", self.connect_timeout))?
                    .map_err(|source| TransportError::Resolve {
                        host: target.host().to_string(),
                        source,
                    })?
                    .collect()
            }
        };
        if addrs.is_empty() {
            return Err(TransportError::NoAddress(target.host().to_string()));
        }

        hooks.dial_start();
        let connected = timeout(self.connect_timeout, TcpStream::connect(&addrs[..])).await;
        hooks.dial_done();
        let stream = connected
            .map_err(|_| TransportError::Timeout("dial", self.connect_timeout))?
            .map_err(|source| TransportError::Connect {
                host: target.host().to_string(),
                source,
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        Ok(stream)
    }

    async fn handshake_tls<H: PhaseHooks>(
        &self,
        target: &UpstreamTarget,
        tcp: TcpStream,
        hooks: &mut H,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
        let server_name = ServerName::try_from(target.host().to_string())
            .map_err(|_| TransportError::ServerName(target.host().to_string()))?;

        hooks.tls_start();
        let handshake = timeout(self.connect_timeout, self.tls.connect(server_name, tcp)).await;
        hooks.tls_done();

        handshake
            .map_err(|_| TransportError::Timeout("tls handshake", self.connect_timeout))?
            .map_err(|source| TransportError::Tls {
                host: target.host().to_string(),
                source,
            })
    }

    async fn exchange<T, H>(
        &self,
        io: T,
        request: Request<Body>,
        hooks: &mut H,
    ) -> Result<Response<Incoming>, TransportError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: PhaseHooks,
    {
        let io = FirstByte::new(io);
        let first_byte = io.observed();

        let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Body>(TokioIo::new(io))
            .await
            .map_err(TransportError::Handshake)?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "Upstream connection closed with error");
            }
        });
        hooks.got_conn();

        let response = timeout(self.response_timeout, sender.send_request(request))
            .await
            .map_err(|_| TransportError::Timeout("response", self.response_timeout))?
            .map_err(TransportError::Request)?;
        match first_byte.get() {
            Some(at) => hooks.first_response_byte_at(*at),
            None => hooks.first_response_byte(),
        }
        Ok(response)
    }
}

/// Connection wrapper stamping the instant the first response byte is read.
struct FirstByte<T> {
    inner: T,
    seen: Arc<OnceLock<Instant>>,
}

impl<T> FirstByte<T> {
    fn new(inner: T) -> Self {
        Self {
            inner,
            seen: Arc::new(OnceLock::new()),
        }
    }

    fn observed(&self) -> Arc<OnceLock<Instant>> {
        Arc::clone(&self.seen)
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for FirstByte<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(polled, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            let _ = this.seen.set(Instant::now());
        }
        polled
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for FirstByte<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
