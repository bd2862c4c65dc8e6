// Entity Scoring
//
// Scores are computed from the *current* snapshots, not from the event
// log: an entity only earns points for items it has right now, and past
// removals do not count against it. Everything else in replay is derived
// from the log.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use super::{most_common, EntityCount};
use crate::config::TrackerConfig;
use crate::snapshot::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityScore {
    pub entity: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionRanking {
    pub collection: String,
    pub top: Vec<EntityCount>,
}

/// Rank entities by score, descending.
///
/// Base score is the sum of a collection's points over every item the
/// entity has in it. Each multiplier collection then scales the score once
/// if the entity appears there at all. Entities without base points are
/// not ranked. Ties keep encounter order in configuration order.
pub fn score_entities(
    config: &TrackerConfig,
    snapshots: &BTreeMap<String, Snapshot>,
) -> Vec<EntityScore> {
    let mut scores: Vec<EntityScore> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut present: HashMap<&str, HashSet<&str>> = HashMap::new();

    for collection in &config.collections {
        let Some(snapshot) = snapshots.get(&collection.name) else {
            continue;
        };

        for item in snapshot.iter() {
            let entity = item.entity();
            present
                .entry(entity)
                .or_default()
                .insert(collection.name.as_str());

            if let Some(points) = collection.points {
                let i = *index.entry(entity).or_insert_with(|| {
                    scores.push(EntityScore {
                        entity: entity.to_string(),
                        score: 0,
                    });
                    scores.len() - 1
                });
                scores[i].score += points;
            }
        }
    }

    for score in &mut scores {
        let Some(collections) = present.get(score.entity.as_str()) else {
            continue;
        };
        for collection in &config.collections {
            if let Some(multiplier) = collection.multiplier {
                if collections.contains(collection.name.as_str()) {
                    score.score *= multiplier;
                }
            }
        }
    }

    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores
}

/// Most frequent entities in each collection's current snapshot.
pub fn top_entities_per_collection(
    config: &TrackerConfig,
    snapshots: &BTreeMap<String, Snapshot>,
    top_n: usize,
) -> Vec<CollectionRanking> {
    config
        .collections
        .iter()
        .map(|collection| CollectionRanking {
            collection: collection.name.clone(),
            top: snapshots
                .get(&collection.name)
                .map(|s| most_common(s.iter().map(|item| item.entity()), top_n))
                .unwrap_or_default(),
        })
        .collect()
}
