//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured diagnostics on stderr)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Operator terminal / log collector (stderr)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - stdout is reserved for the console sink's JSON lines
//! - Request ID flows through proxy logs
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
