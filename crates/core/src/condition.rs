//! Typed reconciliation status: observed generation plus named conditions.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Type name of the condition that signals overall reconciliation.
pub const READY: &str = "Ready";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    /// Empty when the reconciler did not report one.
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus, message: &str) -> Self {
        Self { type_: type_.to_string(), status, message: message.to_string(), reason: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessStatus {
    /// `None` until the reconciler has written status at least once.
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: SmallVec<[Condition; 4]>,
}

impl ReadinessStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Status of the named condition; `Unknown` when it has not been reported.
    pub fn condition_status(&self, type_: &str) -> ConditionStatus {
        self.condition(type_).map(|c| c.status).unwrap_or_default()
    }

    pub fn ready(&self) -> ConditionStatus {
        self.condition_status(READY)
    }

    /// True when this status was written for `generation`.
    pub fn observed(&self, generation: i64) -> bool {
        self.observed_generation == Some(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ready_is_unknown() {
        let st = ReadinessStatus {
            observed_generation: Some(1),
            conditions: smallvec::smallvec![Condition::new("BuilderReady", ConditionStatus::True, "")],
        };
        assert_eq!(st.ready(), ConditionStatus::Unknown);
        assert!(st.condition(READY).is_none());
        assert_eq!(st.condition_status("BuilderReady"), ConditionStatus::True);
    }

    #[test]
    fn observed_matches_exact_generation_only() {
        let st = ReadinessStatus { observed_generation: Some(2), conditions: SmallVec::new() };
        assert!(st.observed(2));
        assert!(!st.observed(3));
        assert!(!ReadinessStatus::default().observed(0));
    }
}
