//! Terminal hooks run by the outcome notifier.
//!
//! A hook runs once the terminal record of a game is durably stored, never
//! before. Hooks run in registration order; a failing hook is logged and does
//! not stop the others or touch the recorded outcome.
//!
//! The settlement coordinator registers itself as a hook so signatures can
//! be pre-issued; [`FairPlayHook`] publishes the advisory think-time report.

mod fairplay;

pub use fairplay::FairPlayHook;

use std::sync::Arc;

use async_trait::async_trait;

use chess_core::TerminalRecord;

#[derive(Debug, thiserror::Error)]
#[error("{hook} hook failed: {message}")]
pub struct HookError {
    pub hook: &'static str,
    pub message: String,
}

impl HookError {
    pub fn new(hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            hook,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait TerminalHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Called with the stored terminal record. `first_write` is false when
    /// the record was already present, e.g. after a restart.
    async fn on_terminal(&self, record: &TerminalRecord, first_write: bool)
    -> Result<(), HookError>;
}

/// Ordered set of terminal hooks.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn TerminalHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Arc<dyn TerminalHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn push(&mut self, hook: Arc<dyn TerminalHook>) {
        self.hooks.push(hook);
    }

    pub fn into_hooks(self) -> Vec<Arc<dyn TerminalHook>> {
        self.hooks
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook, collecting failures.
    pub async fn run(&self, record: &TerminalRecord, first_write: bool) -> Vec<HookError> {
        let mut failures = Vec::new();
        for hook in &self.hooks {
            match hook.on_terminal(record, first_write).await {
                Ok(()) => tracing::debug!(
                    target: "runtime::notifier",
                    game_id = %record.game_id,
                    hook = hook.name(),
                    "terminal hook completed"
                ),
                Err(error) => {
                    tracing::error!(
                        target: "runtime::notifier",
                        game_id = %record.game_id,
                        hook = hook.name(),
                        error = %error,
                        "terminal hook failed"
                    );
                    failures.push(error);
                }
            }
        }
        failures
    }
}
