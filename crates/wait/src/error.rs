use settle_core::{ApiError, DecodeError, ErrorStatus, WatchTarget};
use thiserror::Error;

use crate::checks::CheckError;
use crate::context::Interrupt;

/// Terminal outcome of a wait other than success.
#[derive(Debug, Error)]
pub enum WaitError {
    /// Ready=False at the target generation.
    #[error("{kind} {name:?} not ready: {message}")]
    NotReady { kind: String, name: String, message: String },
    /// An extra check rejected the resource; renders like `NotReady`.
    #[error("{kind} {name:?} not ready: {source}")]
    CheckFailed {
        kind: String,
        name: String,
        #[source]
        source: CheckError,
    },
    #[error("{kind} {name:?} was deleted while waiting for it to become ready")]
    Deleted { kind: String, name: String },
    #[error("watching {kind} {name:?}: {source}")]
    Transport {
        kind: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },
    /// The server ended the watch with a non-recoverable status.
    #[error("watching {kind} {name:?}: {status}")]
    WatchStatus { kind: String, name: String, status: ErrorStatus },
    #[error("decoding {kind} {name:?}: {source}")]
    Decode {
        kind: String,
        name: String,
        #[source]
        source: DecodeError,
    },
    #[error("timed out waiting for {kind} {name:?} to become ready")]
    DeadlineExceeded { kind: String, name: String },
    #[error("stopped waiting for {kind} {name:?}: cancelled")]
    Cancelled { kind: String, name: String },
}

fn ident(target: &WatchTarget) -> (String, String) {
    (target.kind().kind.clone(), target.name().to_string())
}

impl WaitError {
    pub(crate) fn not_ready(target: &WatchTarget, message: String) -> Self {
        let (kind, name) = ident(target);
        Self::NotReady { kind, name, message }
    }

    pub(crate) fn check_failed(target: &WatchTarget, source: CheckError) -> Self {
        let (kind, name) = ident(target);
        Self::CheckFailed { kind, name, source }
    }

    pub(crate) fn deleted(target: &WatchTarget) -> Self {
        let (kind, name) = ident(target);
        Self::Deleted { kind, name }
    }

    pub(crate) fn watch_status(target: &WatchTarget, status: ErrorStatus) -> Self {
        let (kind, name) = ident(target);
        Self::WatchStatus { kind, name, status }
    }

    pub(crate) fn decode(target: &WatchTarget, source: DecodeError) -> Self {
        let (kind, name) = ident(target);
        Self::Decode { kind, name, source }
    }

    /// A missing resource on fetch means it was deleted out from under the wait.
    pub(crate) fn api(target: &WatchTarget, err: ApiError) -> Self {
        let (kind, name) = ident(target);
        match err {
            ApiError::NotFound(_) => Self::Deleted { kind, name },
            ApiError::Transport(source) => Self::Transport { kind, name, source },
        }
    }

    pub(crate) fn interrupted(target: &WatchTarget, why: Interrupt) -> Self {
        let (kind, name) = ident(target);
        match why {
            Interrupt::Cancelled => Self::Cancelled { kind, name },
            Interrupt::DeadlineExceeded => Self::DeadlineExceeded { kind, name },
        }
    }

    /// The caller's context ended; the resource itself did not fail.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    /// The resource reported a failure (Ready=False or a rejecting extra check).
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. } | Self::CheckFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::ResourceKind;

    fn target() -> WatchTarget {
        WatchTarget::new(ResourceKind::new("kpack.io", "v1alpha2", "Builder"), Some("some-namespace"), "some-name", 2)
    }

    #[test]
    fn not_ready_renders_kind_name_and_message() {
        let err = WaitError::not_ready(&target(), "some-message".into());
        assert_eq!(err.to_string(), "Builder \"some-name\" not ready: some-message");
        assert!(err.is_not_ready());
        assert!(!err.is_interrupted());
    }

    #[test]
    fn check_failures_render_like_not_ready() {
        let err = WaitError::check_failed(&target(), CheckError::msg("stack missing"));
        assert_eq!(err.to_string(), "Builder \"some-name\" not ready: stack missing");
    }

    #[test]
    fn not_found_maps_to_deleted() {
        let t = target();
        let err = WaitError::api(&t, ApiError::NotFound(t.key().clone()));
        assert!(matches!(err, WaitError::Deleted { .. }));
    }

    #[test]
    fn interruptions_are_distinct() {
        let c = WaitError::interrupted(&target(), Interrupt::Cancelled);
        let d = WaitError::interrupted(&target(), Interrupt::DeadlineExceeded);
        assert!(c.is_interrupted() && d.is_interrupted());
        assert!(matches!(c, WaitError::Cancelled { .. }));
        assert!(matches!(d, WaitError::DeadlineExceeded { .. }));
        assert!(!c.is_not_ready());
    }
}
