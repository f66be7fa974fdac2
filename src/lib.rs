//! Forward HTTP proxy that traces network phases per request and fans
//! structured log events out to console and queue sinks.

pub mod config;
pub mod event;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod sink;
pub mod trace;

pub use config::schema::ProxyConfig;
pub use event::{LogEvent, TraceDeltas};
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
pub use pipeline::{Dispatcher, Pipeline};
pub use trace::{Phase, PhaseHooks, TraceContext};
