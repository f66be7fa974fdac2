//! Ordered exit actions run once at shutdown.

use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::sink::SinkError;

/// Errors reported by an exit action. Logged, never escalated.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("flush of {sink} did not finish within {timeout:?}")]
    FlushTimeout { sink: String, timeout: Duration },

    #[error("flush of {sink} failed: {source}")]
    Flush {
        sink: String,
        #[source]
        source: SinkError,
    },

    #[error("exit action {name} panicked")]
    Panicked { name: String },
}

/// Outcome of a coordinator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Actions that finished without error.
    pub completed: usize,
    /// Actions that returned an error or panicked.
    pub failed: usize,
}

type ExitFuture = BoxFuture<'static, Result<(), ShutdownError>>;

struct ExitAction {
    name: String,
    run: Box<dyn FnOnce() -> ExitFuture + Send>,
}

/// Registry of exit actions.
///
/// Actions run sequentially in registration order. `run` consumes the
/// coordinator, so each action executes at most once.
#[derive(Default)]
pub struct ShutdownCoordinator {
    actions: Vec<ExitAction>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an exit action.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ShutdownError>> + Send + 'static,
    {
        self.actions.push(ExitAction {
            name: name.into(),
            run: Box::new(move || action().boxed()),
        });
    }

    /// Registered action names, in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Execute every action in order, one at a time.
    pub async fn run(self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        tracing::info!(actions = self.actions.len(), "Running exit actions");

        for action in self.actions {
            // Spawned so a panicking action cannot take down the rest.
            let outcome = match tokio::spawn((action.run)()).await {
                Ok(result) => result,
                Err(_) => Err(ShutdownError::Panicked {
                    name: action.name.clone(),
                }),
            };

            match outcome {
                Ok(()) => {
                    tracing::debug!(action = %action.name, "Exit action completed");
                    report.completed += 1;
                }
                Err(e) => {
                    tracing::error!(action = %action.name, error = %e, "Exit action failed");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            "Exit actions finished"
        );
        report
    }
}
