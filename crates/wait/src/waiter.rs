//! Readiness waiter: fast-path check, then drive a watch session to a terminal state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use settle_core::{ControlPlane, ObjectMeta, WatchEvent, WatchTarget};
use tracing::{debug, info};

use crate::checks::CheckPipeline;
use crate::config::WaiterConfig;
use crate::context::WaitContext;
use crate::error::WaitError;
use crate::evaluator::{evaluate, Convergence};
use crate::session::WatchSession;

/// States of one wait. `Success`, `Failure`, `Timeout` and `FatalError` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Init,
    FastPathCheck,
    Watching,
    Success,
    Failure,
    Timeout,
    FatalError,
}

impl WaitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Timeout | Self::FatalError)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::FastPathCheck => "fast_path",
            Self::Watching => "watching",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::FatalError => "fatal",
        }
    }

    /// Terminal state reached by a finished wait.
    pub fn of(result: &Result<(), WaitError>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) if e.is_interrupted() => Self::Timeout,
            Err(e) if e.is_not_ready() => Self::Failure,
            Err(_) => Self::FatalError,
        }
    }
}

/// Blocks callers until a resource converges. Cheap to share; each call owns its
/// own watch session, so concurrent waits on different resources are independent.
#[derive(Clone)]
pub struct Waiter {
    api: Arc<dyn ControlPlane>,
    config: WaiterConfig,
}

impl Waiter {
    pub fn new(api: Arc<dyn ControlPlane>, config: WaiterConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &WaiterConfig {
        &self.config
    }

    /// Wait for the Ready condition of `target` at its generation.
    pub async fn wait(&self, ctx: &WaitContext, target: &WatchTarget) -> Result<(), WaitError> {
        self.wait_with(ctx, target, CheckPipeline::default()).await
    }

    /// Wait for the Ready condition and then for every check in `checks` to settle.
    ///
    /// Returns when a terminal state is reached or `ctx` ends (cancellation or the
    /// earlier of its deadline and the configured timeout). The watch stream is closed
    /// before this returns on every path.
    pub async fn wait_with(&self, ctx: &WaitContext, target: &WatchTarget, checks: CheckPipeline) -> Result<(), WaitError> {
        let t0 = Instant::now();
        counter!("wait_attempts", 1u64);
        let ctx = match self.config.timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        };
        let mut run = Run { target, checks, state: WaitState::Init };
        let result = tokio::select! {
            biased;
            why = ctx.done() => Err(WaitError::interrupted(target, why)),
            res = run.drive(self.api.as_ref(), self.config.watch_backoff_max) => res,
        };
        let outcome = WaitState::of(&result);
        info!(
            kind = %target.kind(),
            ns = ?target.namespace(),
            name = %target.name(),
            generation = target.generation(),
            from = ?run.state,
            outcome = outcome.label(),
            took_ms = t0.elapsed().as_millis() as u64,
            "wait finished"
        );
        counter!("wait_outcomes", 1u64, "outcome" => outcome.label());
        histogram!("wait_duration_ms", t0.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

/// Per-call state: the target, the extra-check progress and the current state.
struct Run<'t> {
    target: &'t WatchTarget,
    checks: CheckPipeline,
    state: WaitState,
}

impl<'t> Run<'t> {
    fn enter(&mut self, next: WaitState) {
        debug!(name = %self.target.name(), from = ?self.state, to = ?next, "wait state");
        self.state = next;
    }

    async fn drive(&mut self, api: &dyn ControlPlane, backoff_max: Duration) -> Result<(), WaitError> {
        let target = self.target;
        self.enter(WaitState::FastPathCheck);
        let object = api.get(target.key()).await.map_err(|e| WaitError::api(target, e))?;
        let resource_version = ObjectMeta::of(&object)
            .map_err(|e| WaitError::decode(target, e))?
            .resource_version_or_latest()
            .to_string();
        if self.observe(&WatchEvent::Added(object))? {
            return Ok(());
        }

        self.enter(WaitState::Watching);
        let mut session = WatchSession::open(api, target, &resource_version, backoff_max).await?;
        loop {
            let event = session.next().await?;
            counter!("watch_events", 1u64);
            debug!(
                name = %target.name(),
                event = event.type_name(),
                rv = %session.resource_version(),
                restarts = session.restarts(),
                "watch event"
            );
            if self.observe(&event)? {
                return Ok(());
            }
        }
    }

    /// Classify one event. `Ok(true)` is success, `Ok(false)` keeps waiting.
    fn observe(&mut self, event: &WatchEvent) -> Result<bool, WaitError> {
        let target = self.target;
        let object = match event {
            WatchEvent::Added(o) | WatchEvent::Modified(o) => o,
            WatchEvent::Deleted(_) => return Err(WaitError::deleted(target)),
            WatchEvent::Error(status) => return Err(WaitError::watch_status(target, status.clone())),
        };
        let status = target.decode(object).map_err(|e| WaitError::decode(target, e))?;
        match evaluate(&status, target.generation()) {
            Convergence::Pending => {
                debug!(name = %target.name(), observed = ?status.observed_generation, want = target.generation(), "pending");
                Ok(false)
            }
            Convergence::NotReady(message) => Err(WaitError::not_ready(target, message)),
            Convergence::Ready => {
                let done = self.checks.advance(event).map_err(|e| WaitError::check_failed(target, e))?;
                if !done {
                    debug!(name = %target.name(), settled = self.checks.settled(), of = self.checks.len(), "ready; extra checks pending");
                }
                Ok(done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Interrupt;
    use settle_core::ResourceKind;

    fn target() -> WatchTarget {
        WatchTarget::new(ResourceKind::new("kpack.io", "v1alpha2", "Image"), Some("ns"), "app", 1)
    }

    #[test]
    fn outcomes_map_to_terminal_states() {
        let t = target();
        let cases = [
            (Ok(()), WaitState::Success),
            (Err(WaitError::not_ready(&t, "boom".into())), WaitState::Failure),
            (Err(WaitError::interrupted(&t, Interrupt::DeadlineExceeded)), WaitState::Timeout),
            (Err(WaitError::interrupted(&t, Interrupt::Cancelled)), WaitState::Timeout),
            (Err(WaitError::deleted(&t)), WaitState::FatalError),
        ];
        for (result, want) in cases {
            let got = WaitState::of(&result);
            assert_eq!(got, want);
            assert!(got.is_terminal(), "{:?}", got);
        }
    }

    #[test]
    fn in_flight_states_are_not_terminal() {
        for s in [WaitState::Init, WaitState::FastPathCheck, WaitState::Watching] {
            assert!(!s.is_terminal(), "{:?}", s);
        }
        assert_eq!(WaitState::FastPathCheck.label(), "fast_path");
    }
}
