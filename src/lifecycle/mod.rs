//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGQUIT → wait_for_termination() returns
//!
//! Coordinator (coordinator.rs):
//!     Registered exit actions, in registration order:
//!         drain.rs wait (buffer empty or timeout) → sink flush (bounded)
//!
//! Shutdown (shutdown.rs):
//!     Latched once all exit actions ran → listener stops accepting
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: flush sinks first, then close the listener
//! - Every wait has a bound; timeouts never abort in-flight work
//! - Exit action failures are logged, never escalated

pub mod coordinator;
pub mod drain;
pub mod shutdown;
pub mod signals;

pub use coordinator::{ShutdownCoordinator, ShutdownError, ShutdownReport};
pub use drain::wait_until_timeout;
pub use shutdown::{Shutdown, ShutdownListener};
