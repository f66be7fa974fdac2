//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Listener side:
//!     tls.rs (optional certificate/key for the proxy listener)
//!
//! Upstream side (transport.rs), per request:
//!     get_conn → DNS (dns_start/dns_done, skipped for IP literals)
//!     → TCP dial (dial_start/dial_done)
//!     → TLS for https targets (tls_start/tls_done)
//!     → HTTP/1 handshake (got_conn)
//!     → send request, response head arrives (first_response_byte)
//! ```
//!
//! # Design Decisions
//! - One fresh upstream connection per request so every phase is observable
//! - Every network step has its own deadline
//! - TLS roots come from the platform store

pub mod tls;
pub mod transport;

pub use transport::{Transport, TransportError};
