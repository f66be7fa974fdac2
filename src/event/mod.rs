//! Log events produced for each completed request.
//!
//! # Data Flow
//! ```text
//! Response received
//!     → builder.rs (TraceContext → TraceDeltas, wall-clock timestamp)
//!     → types.rs (LogEvent, immutable, serde wire format)
//!     → pipeline dispatcher (shared as Arc<LogEvent>)
//! ```

pub mod builder;
pub mod types;

pub use types::{LogEvent, TraceDeltas};
