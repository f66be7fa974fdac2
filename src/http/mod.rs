//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, timeout)
//!     → request.rs (resolve upstream target, strip hop-by-hop headers)
//!     → net::transport (traced upstream exchange)
//!     → LogEvent → pipeline dispatcher
//!     → Send response to client
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, TargetError, UpstreamTarget, X_REQUEST_ID};
pub use server::{ProxyServer, ServerError};
