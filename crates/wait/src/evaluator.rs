use settle_core::{ConditionStatus, ReadinessStatus, READY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Convergence {
    Pending,
    Ready,
    /// Ready=False at the target generation; carries the condition message verbatim.
    NotReady(String),
}

/// Classify one status snapshot against the generation that must be observed.
///
/// Reports written for any other generation are stale and stay pending whatever
/// their conditions say.
pub fn evaluate(status: &ReadinessStatus, generation: i64) -> Convergence {
    if !status.observed(generation) {
        return Convergence::Pending;
    }
    match status.condition(READY) {
        Some(c) if c.status == ConditionStatus::True => Convergence::Ready,
        Some(c) if c.status == ConditionStatus::False => Convergence::NotReady(c.message.clone()),
        _ => Convergence::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::Condition;

    fn conditions(observed: Option<i64>, list: Vec<Condition>) -> ReadinessStatus {
        ReadinessStatus { observed_generation: observed, conditions: list.into_iter().collect() }
    }

    #[test]
    fn stale_generation_is_pending_even_when_ready() {
        let st = conditions(Some(1), vec![Condition::new(READY, ConditionStatus::True, "")]);
        assert_eq!(evaluate(&st, 2), Convergence::Pending);
        let st = conditions(Some(1), vec![Condition::new(READY, ConditionStatus::False, "old failure")]);
        assert_eq!(evaluate(&st, 2), Convergence::Pending);
    }

    #[test]
    fn ready_true_at_generation_converges() {
        let st = conditions(Some(2), vec![Condition::new(READY, ConditionStatus::True, "")]);
        assert_eq!(evaluate(&st, 2), Convergence::Ready);
    }

    #[test]
    fn ready_false_carries_message_verbatim() {
        let st = conditions(Some(2), vec![Condition::new(READY, ConditionStatus::False, "build failed: exit 1")]);
        assert_eq!(evaluate(&st, 2), Convergence::NotReady("build failed: exit 1".into()));
    }

    #[test]
    fn unknown_or_absent_ready_is_pending() {
        let st = conditions(Some(2), vec![Condition::new(READY, ConditionStatus::Unknown, "working")]);
        assert_eq!(evaluate(&st, 2), Convergence::Pending);
        let st = conditions(Some(2), vec![Condition::new("Succeeded", ConditionStatus::True, "")]);
        assert_eq!(evaluate(&st, 2), Convergence::Pending);
        assert_eq!(evaluate(&ReadinessStatus::default(), 2), Convergence::Pending);
    }
}
