// Invariant Framework
//
// Invariants are pure rules that must hold for every year log transition.
// They are evaluated on the merged log *before* it replaces the persisted
// one, so a violation never reaches disk.

use std::collections::HashSet;

use chrono_tz::Tz;

use crate::log::{Event, YearLog};

/// Result of invariant evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantResult {
    Pass,
    Fail(String),
}

/// Trait implemented by all invariants.
///
/// Invariants must be:
/// - Pure
/// - Deterministic
/// - Side-effect free
pub trait Invariant: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, previous: &YearLog, next: &YearLog) -> InvariantResult;
}

/// Invariant engine that evaluates a set of invariants.
#[derive(Default)]
pub struct InvariantEngine {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantEngine {
    pub fn new() -> Self {
        Self {
            invariants: Vec::new(),
        }
    }

    /// Rules every merged year log must satisfy.
    pub fn for_merge(tz: Tz) -> Self {
        let mut engine = Self::for_replace(tz);
        engine.register(AppendOnly);
        engine
    }

    /// Rules for a wholesale rewrite, where earlier entries may go.
    pub fn for_replace(tz: Tz) -> Self {
        let mut engine = Self::new();
        engine.register(ChronologicalOrder);
        engine.register(UniqueEntries);
        engine.register(SingleYear { tz });
        engine
    }

    pub fn register<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Evaluate all invariants.
    ///
    /// Stops at the first failure.
    pub fn evaluate(&self, previous: &YearLog, next: &YearLog) -> Result<(), InvariantViolation> {
        for invariant in &self.invariants {
            match invariant.validate(previous, next) {
                InvariantResult::Pass => continue,
                InvariantResult::Fail(reason) => {
                    return Err(InvariantViolation {
                        invariant: invariant.name(),
                        year: next.year(),
                        reason,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Returned when an invariant is violated.
#[derive(Debug, thiserror::Error)]
#[error("invariant `{invariant}` violated for {year}: {reason}")]
pub struct InvariantViolation {
    pub invariant: &'static str,
    pub year: i32,
    pub reason: String,
}

/// Entries are non-decreasing by timestamp.
pub struct ChronologicalOrder;

impl Invariant for ChronologicalOrder {
    fn name(&self) -> &'static str {
        "chronological-order"
    }

    fn validate(&self, _previous: &YearLog, next: &YearLog) -> InvariantResult {
        match next
            .entries()
            .windows(2)
            .find(|pair| pair[0].timestamp > pair[1].timestamp)
        {
            Some(pair) => InvariantResult::Fail(format!(
                "{:?} recorded after later entry {:?}",
                pair[1].rendered_text, pair[0].rendered_text
            )),
            None => InvariantResult::Pass,
        }
    }
}

/// No two entries share a (timestamp, text) pair.
pub struct UniqueEntries;

impl Invariant for UniqueEntries {
    fn name(&self) -> &'static str {
        "unique-entries"
    }

    fn validate(&self, _previous: &YearLog, next: &YearLog) -> InvariantResult {
        let mut seen = HashSet::new();
        for event in next.entries() {
            if !seen.insert(event.dedup_key()) {
                return InvariantResult::Fail(format!("duplicate entry {:?}", event.rendered_text));
            }
        }
        InvariantResult::Pass
    }
}

/// Every previously persisted entry survives the transition.
pub struct AppendOnly;

impl Invariant for AppendOnly {
    fn name(&self) -> &'static str {
        "append-only"
    }

    fn validate(&self, previous: &YearLog, next: &YearLog) -> InvariantResult {
        let kept: HashSet<_> = next.entries().iter().map(Event::dedup_key).collect();
        match previous
            .entries()
            .iter()
            .find(|event| !kept.contains(&event.dedup_key()))
        {
            Some(event) => {
                InvariantResult::Fail(format!("entry {:?} was dropped", event.rendered_text))
            }
            None => InvariantResult::Pass,
        }
    }
}

/// Every entry falls in the log's local calendar year.
pub struct SingleYear {
    pub tz: Tz,
}

impl Invariant for SingleYear {
    fn name(&self) -> &'static str {
        "single-year"
    }

    fn validate(&self, _previous: &YearLog, next: &YearLog) -> InvariantResult {
        match next
            .entries()
            .iter()
            .find(|event| event.local_year(&self.tz) != next.year())
        {
            Some(event) => InvariantResult::Fail(format!(
                "{:?} belongs to {}",
                event.rendered_text,
                event.local_year(&self.tz)
            )),
            None => InvariantResult::Pass,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{EventKind, Timestamp};
    use chrono::{FixedOffset, TimeZone};
    use chrono_tz::America::Los_Angeles;

    fn ts(month: u32, day: u32) -> Timestamp {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, month, day, 12, 0, 0)
            .unwrap()
    }

    fn added(month: u32, day: u32, key: &str) -> Event {
        Event::new(ts(month, day), "1", EventKind::Added, key)
    }

    #[test]
    fn merged_log_passes() {
        let previous = YearLog::normalized(2025, vec![added(1, 1, "A - a")]);
        let mut next = previous.clone();
        next.merge(vec![added(2, 1, "B - b")]);

        InvariantEngine::for_merge(Los_Angeles)
            .evaluate(&previous, &next)
            .unwrap();
    }

    #[test]
    fn out_of_order_log_is_rejected() {
        let next = YearLog::from_entries(2025, vec![added(3, 1, "B - b"), added(1, 1, "A - a")]);

        let err = InvariantEngine::for_replace(Los_Angeles)
            .evaluate(&YearLog::new(2025), &next)
            .unwrap_err();

        assert_eq!(err.invariant, "chronological-order");
    }

    #[test]
    fn duplicate_entry_is_rejected() {
        let next = YearLog::from_entries(2025, vec![added(1, 1, "A - a"), added(1, 1, "A - a")]);

        let err = InvariantEngine::for_replace(Los_Angeles)
            .evaluate(&YearLog::new(2025), &next)
            .unwrap_err();

        assert_eq!(err.invariant, "unique-entries");
    }

    #[test]
    fn dropping_history_is_rejected_on_merge() {
        let previous = YearLog::normalized(2025, vec![added(1, 1, "A - a")]);
        let next = YearLog::normalized(2025, vec![added(2, 1, "B - b")]);

        let err = InvariantEngine::for_merge(Los_Angeles)
            .evaluate(&previous, &next)
            .unwrap_err();

        assert!(err.to_string().contains("append-only"));
    }

    #[test]
    fn entry_from_another_year_is_rejected() {
        let next = YearLog::normalized(2024, vec![added(1, 1, "A - a")]);

        let err = InvariantEngine::for_replace(Los_Angeles)
            .evaluate(&YearLog::new(2024), &next)
            .unwrap_err();

        assert_eq!(err.invariant, "single-year");
    }
}
