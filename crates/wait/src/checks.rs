//! Extra readiness criteria layered on top of the Ready condition.

use std::fmt;
use std::sync::Arc;

use settle_core::{ConditionStatus, ConditionsDecoder, StatusDecoder, WatchEvent};
use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct CheckError(#[from] anyhow::Error);

impl CheckError {
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }
}

/// A predicate over watch events. `Ok(true)` means settled, `Ok(false)` means "not yet,
/// show me the next event".
pub trait ConditionCheck: Send {
    fn evaluate(&mut self, event: &WatchEvent) -> Result<bool, CheckError>;
}

impl<F> ConditionCheck for F
where
    F: FnMut(&WatchEvent) -> Result<bool, CheckError> + Send,
{
    fn evaluate(&mut self, event: &WatchEvent) -> Result<bool, CheckError> {
        self(event)
    }
}

/// Ordered checks evaluated once the Ready condition has converged.
///
/// Checks settle left to right: the first unsettled check is evaluated, and if it
/// settles the next one is evaluated against the same event. A settled check is
/// never evaluated again, so progress survives across events and watch restarts.
#[derive(Default)]
pub struct CheckPipeline {
    checks: Vec<Box<dyn ConditionCheck>>,
    settled: usize,
}

impl CheckPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, check: impl ConditionCheck + 'static) -> Self {
        self.push(check);
        self
    }

    pub fn push(&mut self, check: impl ConditionCheck + 'static) {
        self.checks.push(Box::new(check));
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Number of checks that have signalled done.
    pub fn settled(&self) -> usize {
        self.settled
    }

    pub fn is_settled(&self) -> bool {
        self.settled >= self.checks.len()
    }

    /// Feed one event; returns true once every check has settled. Stops at the first error.
    pub fn advance(&mut self, event: &WatchEvent) -> Result<bool, CheckError> {
        while let Some(check) = self.checks.get_mut(self.settled) {
            if !check.evaluate(event)? {
                return Ok(false);
            }
            self.settled += 1;
        }
        Ok(true)
    }
}

impl fmt::Debug for CheckPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckPipeline").field("len", &self.checks.len()).field("settled", &self.settled).finish()
    }
}

/// Settles when the named condition reports `True` on an event's object.
#[derive(Clone)]
pub struct RequireCondition {
    type_: String,
    decoder: Arc<dyn StatusDecoder>,
}

impl RequireCondition {
    pub fn new(type_: &str) -> Self {
        Self { type_: type_.to_string(), decoder: Arc::new(ConditionsDecoder) }
    }

    pub fn with_decoder(mut self, decoder: impl StatusDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }
}

impl ConditionCheck for RequireCondition {
    fn evaluate(&mut self, event: &WatchEvent) -> Result<bool, CheckError> {
        let Some(object) = event.object() else { return Ok(false) };
        let status = self.decoder.decode(object).map_err(|e| CheckError(anyhow::Error::new(e)))?;
        Ok(status.condition_status(&self.type_) == ConditionStatus::True)
    }
}
