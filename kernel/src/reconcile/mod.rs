// Reconciliation
//
// Drives one run across all tracked collections:
// snapshot → fetch → diff → merge into year logs → save snapshot → report
//
// Collections are isolated from each other: a fetch or storage failure for
// one is recorded and the run carries on with the rest. Every year a
// collection's events touch is loaded and validated before anything is
// written; a collection touching a year that fails contributes no events
// and keeps its old snapshot, so the next run sees the same diff. Year
// logs are persisted before snapshots, so a snapshot only advances once
// the events derived from it are durable.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{CollectionConfig, ConfigError, TrackerConfig};
use crate::diff::{diff, DiffCounts};
use crate::invariants::{InvariantEngine, InvariantViolation};
use crate::log::{bucket_by_year, Event, EventKind, LogError, YearLog, YearLogStore};
use crate::report::{ReportSink, YearReport};
use crate::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use crate::source::{MembershipSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("{0}")]
    Invariant(#[from] InvariantViolation),

    #[error("year log {0} was not persisted")]
    YearNotPersisted(i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionStatus {
    Updated { added: usize, removed: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionOutcome {
    pub collection: String,
    #[serde(flatten)]
    pub status: CollectionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum YearStatus {
    Written { inserted: usize, total: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearOutcome {
    pub year: i32,
    #[serde(flatten)]
    pub status: YearStatus,
}

/// Result of a reconciliation or backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub collections: Vec<CollectionOutcome>,
    pub years: Vec<YearOutcome>,
    pub report_failures: Vec<String>,
}

impl RunReport {
    /// True when every collection and year was processed.
    pub fn is_clean(&self) -> bool {
        self.collections
            .iter()
            .all(|c| matches!(c.status, CollectionStatus::Updated { .. }))
            && self
                .years
                .iter()
                .all(|y| matches!(y.status, YearStatus::Written { .. }))
    }

    fn fail_collection(&mut self, index: usize, reason: String) {
        self.collections[index].status = CollectionStatus::Failed { reason };
    }
}

/// A collection whose snapshot is waiting for its year logs.
struct Pending {
    outcome: usize,
    collection_id: String,
    snapshot: Snapshot,
    events: Vec<Event>,
    years: BTreeSet<i32>,
}

impl Pending {
    fn blocked_by(&self, failed: &BTreeMap<i32, String>) -> Option<i32> {
        self.years.iter().copied().find(|year| failed.contains_key(year))
    }
}

/// A validated year log, ready to be written.
struct MergedYear {
    log: YearLog,
    inserted: usize,
    changed: bool,
}

/// Sole writer of snapshots and year logs.
pub struct Reconciler<S: SnapshotStore, L: YearLogStore> {
    config: TrackerConfig,
    snapshots: S,
    logs: L,
    merge_invariants: InvariantEngine,
    replace_invariants: InvariantEngine,
}

impl<S: SnapshotStore, L: YearLogStore> Reconciler<S, L> {
    pub fn new(config: TrackerConfig, snapshots: S, logs: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let tz = config.time_zone;

        Ok(Self {
            config,
            snapshots,
            logs,
            merge_invariants: InvariantEngine::for_merge(tz),
            replace_invariants: InvariantEngine::for_replace(tz),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn snapshots(&self) -> &S {
        &self.snapshots
    }

    pub fn logs(&self) -> &L {
        &self.logs
    }

    /// Run one reconciliation at wall-clock time `now`.
    pub fn reconcile<M: MembershipSource + ?Sized>(
        &mut self,
        source: &M,
        sink: &mut dyn ReportSink,
        now: DateTime<Utc>,
    ) -> RunReport {
        let tz = self.config.time_zone;
        let mut report = RunReport::default();
        let mut pending = Vec::new();

        for collection in &self.config.collections {
            let outcome = report.collections.len();
            match self.observe(collection, source, now) {
                Ok((snapshot, events, counts)) => {
                    info!(
                        collection = %collection.name,
                        added = counts.added,
                        removed = counts.removed,
                        "collection diffed"
                    );
                    report.collections.push(CollectionOutcome {
                        collection: collection.name.clone(),
                        status: CollectionStatus::Updated {
                            added: counts.added,
                            removed: counts.removed,
                        },
                    });
                    pending.push(Pending {
                        outcome,
                        collection_id: collection.id.clone(),
                        snapshot,
                        years: events.iter().map(|e| e.local_year(&tz)).collect(),
                        events,
                    });
                }
                Err(e) => {
                    warn!(collection = %collection.name, error = %e, "collection skipped");
                    report.collections.push(CollectionOutcome {
                        collection: collection.name.clone(),
                        status: CollectionStatus::Failed {
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        let (loaded, mut failed_years) = self.load_years(&pending);
        let merged = self.merge_pending(&mut pending, &loaded, &mut failed_years, &mut report);

        let mut years = BTreeMap::new();
        let mut persisted = Vec::new();
        for MergedYear {
            log,
            inserted,
            changed,
        } in merged
        {
            let year = log.year();
            if changed {
                if let Err(e) = self.logs.replace(&log) {
                    warn!(year, error = %e, "year log not written");
                    failed_years.insert(year, e.to_string());
                    continue;
                }
            }
            info!(year, inserted, total = log.len(), "year log merged");
            years.insert(
                year,
                YearStatus::Written {
                    inserted,
                    total: log.len(),
                },
            );
            persisted.push(log);
        }
        for (year, reason) in &failed_years {
            years.insert(*year, YearStatus::Failed {
                reason: reason.clone(),
            });
        }
        report.years = years
            .into_iter()
            .map(|(year, status)| YearOutcome { year, status })
            .collect();

        // Only a failed write can still block a collection here.
        for item in pending {
            if let Some(year) = item.blocked_by(&failed_years) {
                let reason = ReconcileError::YearNotPersisted(year).to_string();
                report.fail_collection(item.outcome, reason);
                continue;
            }
            if let Err(e) = self.snapshots.save(&item.collection_id, &item.snapshot) {
                warn!(collection_id = %item.collection_id, error = %e, "snapshot not saved");
                report.fail_collection(item.outcome, e.to_string());
            }
        }

        hand_off(&persisted, sink, &mut report);
        report
    }

    /// Rebuild year logs from the full `added_at` history of every
    /// collection, replacing each affected year wholesale.
    ///
    /// Any fetch failure aborts before anything is written: a partial
    /// rebuild would silently drop the failed collection's history.
    pub fn backfill<M: MembershipSource + ?Sized>(
        &mut self,
        source: &M,
        sink: &mut dyn ReportSink,
    ) -> Result<RunReport, ReconcileError> {
        let tz = self.config.time_zone;
        let mut report = RunReport::default();
        let mut events = Vec::new();

        for collection in &self.config.collections {
            let members = source.fetch_members(&collection.id)?;
            let before = events.len();
            events.extend(members.iter().filter_map(|item| {
                let at = item.observed_at?;
                Some(Event::new(
                    at.with_timezone(&tz).fixed_offset(),
                    collection.name.as_str(),
                    EventKind::Added,
                    item.key.as_str(),
                ))
            }));
            report.collections.push(CollectionOutcome {
                collection: collection.name.clone(),
                status: CollectionStatus::Updated {
                    added: events.len() - before,
                    removed: 0,
                },
            });
        }

        let mut persisted = Vec::new();
        for (year, events) in bucket_by_year(events, &tz) {
            let next = YearLog::normalized(year, events);
            self.replace_invariants.evaluate(&YearLog::new(year), &next)?;
            self.logs.replace(&next)?;
            info!(year, total = next.len(), "year log rebuilt");

            report.years.push(YearOutcome {
                year,
                status: YearStatus::Written {
                    inserted: next.len(),
                    total: next.len(),
                },
            });
            persisted.push(next);
        }

        hand_off(&persisted, sink, &mut report);
        Ok(report)
    }

    fn observe<M: MembershipSource + ?Sized>(
        &self,
        collection: &CollectionConfig,
        source: &M,
        now: DateTime<Utc>,
    ) -> Result<(Snapshot, Vec<Event>, DiffCounts), ReconcileError> {
        let old = self.snapshots.load(&collection.id)?;
        let new = source.fetch_members(&collection.id)?;

        let diff = diff(&old, &new, &collection.name, now, &self.config.time_zone);
        debug!(
            collection = %collection.name,
            old = old.len(),
            new = new.len(),
            "snapshots compared"
        );

        Ok((new, diff.events, diff.counts))
    }

    /// Load the persisted log of every year the pending events touch.
    fn load_years(&self, pending: &[Pending]) -> (BTreeMap<i32, YearLog>, BTreeMap<i32, String>) {
        let years: BTreeSet<i32> = pending
            .iter()
            .flat_map(|item| item.years.iter().copied())
            .collect();

        let mut loaded = BTreeMap::new();
        let mut failed = BTreeMap::new();
        for year in years {
            match self.logs.load(year) {
                Ok(log) => {
                    loaded.insert(year, log);
                }
                Err(e) => {
                    warn!(year, error = %e, "year log unreadable");
                    failed.insert(year, e.to_string());
                }
            }
        }
        (loaded, failed)
    }

    /// Merge the events of every collection not blocked by a failed year.
    ///
    /// A collection touching a failed year contributes nothing: none of its
    /// events are merged and its snapshot stays put, so the next run sees
    /// the same diff instead of re-stamping part of it. A year failing its
    /// invariants blocks its collections in turn, so merging repeats until
    /// no new year fails. Unchanged logs are marked so they are not
    /// rewritten.
    fn merge_pending(
        &self,
        pending: &mut Vec<Pending>,
        loaded: &BTreeMap<i32, YearLog>,
        failed: &mut BTreeMap<i32, String>,
        report: &mut RunReport,
    ) -> Vec<MergedYear> {
        let tz = self.config.time_zone;

        loop {
            pending.retain(|item| match item.blocked_by(failed) {
                Some(year) => {
                    warn!(collection_id = %item.collection_id, year, "collection held back");
                    let reason = ReconcileError::YearNotPersisted(year).to_string();
                    report.fail_collection(item.outcome, reason);
                    false
                }
                None => true,
            });

            let events = pending
                .iter()
                .flat_map(|item| item.events.iter().cloned())
                .collect();

            let mut merged = Vec::new();
            let mut newly_failed = false;
            for (year, events) in bucket_by_year(events, &tz) {
                let Some(previous) = loaded.get(&year) else {
                    failed.insert(year, "year log was not loaded".into());
                    newly_failed = true;
                    continue;
                };

                let mut next = previous.clone();
                let inserted = next.merge(events);
                match self.merge_invariants.evaluate(previous, &next) {
                    Ok(()) => merged.push(MergedYear {
                        changed: next != *previous,
                        log: next,
                        inserted,
                    }),
                    Err(e) => {
                        warn!(year, error = %e, "year log rejected");
                        failed.insert(year, e.to_string());
                        newly_failed = true;
                    }
                }
            }

            if !newly_failed {
                return merged;
            }
        }
    }
}

/// Give every persisted year to the sink; failures are recorded only.
fn hand_off(persisted: &[YearLog], sink: &mut dyn ReportSink, report: &mut RunReport) {
    for log in persisted {
        if let Err(e) = sink.year_log(&YearReport::from_log(log)) {
            warn!(year = log.year(), error = %e, "report not produced");
            report.report_failures.push(format!("{}: {e}", log.year()));
        }
    }
}
