//! Per-request network phase tracing.
//!
//! # Data Flow
//! ```text
//! Proxy handler:
//!     TraceContext::begin() (owned by the request)
//!     → &mut TraceContext handed to the transport
//!     → hooks.rs callbacks fire as DNS / dial / TLS / exchange progress
//!     → event builder reads the finished context once
//! ```
//!
//! # Design Decisions
//! - One context per request, never shared, so no locking
//! - Hooks are plain synchronous calls: recording is an in-memory write
//! - Last write wins when a phase fires more than once

pub mod context;
pub mod hooks;

pub use context::{Phase, TraceContext};
pub use hooks::PhaseHooks;
