// Deterministic Replay Engine
//
// Replays the complete event history and derives aggregate state from it:
// running membership counts per collection and per-year "most added"
// rankings. Read-only over year logs.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::TrackerConfig;
use crate::log::{Event, EventKind, LogError, YearLog, YearLogStore};
use crate::snapshot::{entity_of, Snapshot, SnapshotError, SnapshotStore};

mod scores;

pub use scores::{score_entities, top_entities_per_collection, CollectionRanking, EntityScore};

/// Membership count of one collection right after an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeSample {
    pub date: NaiveDate,
    #[serde(rename = "playlist")]
    pub collection: String,
    pub count: i64,
}

/// Per-collection step series handed to chart rendering.
pub type SizeHistory = BTreeMap<String, Vec<(NaiveDate, i64)>>;

/// An entity and how often it was counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityCount {
    pub entity: String,
    pub count: usize,
}

/// year -> collection -> top entities by additions.
pub type MostAddedByYear = BTreeMap<i32, BTreeMap<String, Vec<EntityCount>>>;

/// State reconstructed from the event history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateState {
    pub size_series: Vec<SizeSample>,
    pub final_sizes: BTreeMap<String, i64>,
    pub most_added_by_year: MostAddedByYear,
}

/// Everything the stats document needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub current_top: Vec<CollectionRanking>,
    pub most_added_by_year: MostAddedByYear,
    pub scores: Vec<EntityScore>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// All events of `logs`, ascending by timestamp.
///
/// The sort is stable, so same-instant events keep log order.
pub fn ordered_events(logs: &[YearLog]) -> Vec<&Event> {
    let mut events: Vec<&Event> = logs.iter().flat_map(|log| log.entries()).collect();
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    events
}

/// Fold the history into running per-collection counts, one sample per event.
pub fn size_series(logs: &[YearLog]) -> Vec<SizeSample> {
    let mut sizes: HashMap<&str, i64> = HashMap::new();

    ordered_events(logs)
        .into_iter()
        .map(|event| {
            let count = sizes.entry(event.collection.as_str()).or_insert(0);
            match event.kind {
                EventKind::Added => *count += 1,
                EventKind::Removed => *count -= 1,
            }
            SizeSample {
                date: event.timestamp.date_naive(),
                collection: event.collection.clone(),
                count: *count,
            }
        })
        .collect()
}

pub fn size_history(samples: &[SizeSample]) -> SizeHistory {
    let mut history = SizeHistory::new();
    for sample in samples {
        history
            .entry(sample.collection.clone())
            .or_default()
            .push((sample.date, sample.count));
    }
    history
}

/// Most frequent entries, ties broken by first appearance.
pub(crate) fn most_common<'a>(
    entities: impl IntoIterator<Item = &'a str>,
    top_n: usize,
) -> Vec<EntityCount> {
    let mut counts: Vec<EntityCount> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for entity in entities {
        match index.get(entity) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(entity, counts.len());
                counts.push(EntityCount {
                    entity: entity.to_string(),
                    count: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(top_n);
    counts
}

/// Top entities by additions, per collection, per year.
pub fn most_added_by_year(logs: &[YearLog], top_n: usize) -> MostAddedByYear {
    let mut results = MostAddedByYear::new();

    for log in logs {
        let mut by_collection: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for event in log.entries().iter().filter(|e| e.kind == EventKind::Added) {
            by_collection
                .entry(event.collection.as_str())
                .or_default()
                .push(entity_of(&event.item_key));
        }

        let year = results.entry(log.year()).or_default();
        for (collection, entities) in by_collection {
            year.insert(collection.to_string(), most_common(entities, top_n));
        }
    }

    results
}

/// Reconstruct aggregate state from complete year logs.
pub fn replay(logs: &[YearLog], top_n: usize) -> AggregateState {
    let size_series = size_series(logs);

    let mut final_sizes = BTreeMap::new();
    for sample in &size_series {
        final_sizes.insert(sample.collection.clone(), sample.count);
    }

    AggregateState {
        size_series,
        final_sizes,
        most_added_by_year: most_added_by_year(logs, top_n),
    }
}

/// Current snapshot of every configured collection, keyed by name.
pub fn current_snapshots<S: SnapshotStore>(
    config: &TrackerConfig,
    store: &S,
) -> Result<BTreeMap<String, Snapshot>, SnapshotError> {
    config
        .collections
        .iter()
        .map(|c| store.load(&c.id).map(|snapshot| (c.name.clone(), snapshot)))
        .collect()
}

/// Build the stats report from persisted snapshots and logs.
pub fn stats<S: SnapshotStore, L: YearLogStore>(
    config: &TrackerConfig,
    snapshots: &S,
    logs: &L,
) -> Result<StatsReport, ReplayError> {
    let current = current_snapshots(config, snapshots)?;
    let logs = logs.load_all()?;

    let mut scores = score_entities(config, &current);
    scores.truncate(config.top_scores);

    Ok(StatsReport {
        current_top: top_entities_per_collection(config, &current, config.top_current),
        most_added_by_year: most_added_by_year(&logs, config.top_yearly),
        scores,
    })
}
