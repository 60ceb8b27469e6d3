use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{SourceUnitId, TopicId, TopicSelector};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRow {
    pub id: TopicId,
    pub track_id: String,
}

/// A topic's claim on `[range_start, range_end]` (inclusive) of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeUnitRow {
    pub topic_id: TopicId,
    pub document_id: String,
    pub range_start: i64,
    pub range_end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUnitRow {
    pub id: SourceUnitId,
    pub document_id: String,
    pub unit_number: i64,
}

/// Topic → source-unit mapping with its inverse, built once per scope change.
#[derive(Debug, Clone, Default)]
pub struct ScopeIndex {
    units_by_topic: HashMap<TopicId, BTreeSet<SourceUnitId>>,
    topics_by_unit: HashMap<SourceUnitId, BTreeSet<TopicId>>,
    topics_by_track: HashMap<String, BTreeSet<TopicId>>,
    all_topics: BTreeSet<TopicId>,
}

impl ScopeIndex {
    pub fn build(
        topics: &[TopicRow],
        scope_units: &[ScopeUnitRow],
        source_units: &[SourceUnitRow],
    ) -> Self {
        let mut units_by_document: HashMap<&str, Vec<(i64, &str)>> = HashMap::new();
        for unit in source_units {
            units_by_document
                .entry(unit.document_id.as_str())
                .or_default()
                .push((unit.unit_number, unit.id.as_str()));
        }
        for units in units_by_document.values_mut() {
            units.sort_unstable();
        }

        let mut index = Self::default();
        for topic in topics {
            index.all_topics.insert(topic.id.clone());
            index
                .topics_by_track
                .entry(topic.track_id.clone())
                .or_default()
                .insert(topic.id.clone());
        }

        for scope in scope_units {
            let covered = index.units_by_topic.entry(scope.topic_id.clone()).or_default();

            let Some(units) = units_by_document.get(scope.document_id.as_str()) else {
                debug!(
                    topic_id = %scope.topic_id,
                    document_id = %scope.document_id,
                    "scope unit references a missing document"
                );
                continue;
            };
            if scope.range_end < scope.range_start {
                continue;
            }

            let start = units.partition_point(|(number, _)| *number < scope.range_start);
            let end = units.partition_point(|(number, _)| *number <= scope.range_end);
            for (_, unit_id) in &units[start..end] {
                covered.insert((*unit_id).to_string());
                index
                    .topics_by_unit
                    .entry((*unit_id).to_string())
                    .or_default()
                    .insert(scope.topic_id.clone());
            }
        }

        index
    }

    pub fn selected_topics(&self, selector: &TopicSelector) -> BTreeSet<TopicId> {
        match selector {
            TopicSelector::One(topic_id) => BTreeSet::from([topic_id.clone()]),
            TopicSelector::Many(topic_ids) => topic_ids.iter().cloned().collect(),
            TopicSelector::All { track_id: Some(track_id) } => self
                .topics_by_track
                .get(track_id)
                .cloned()
                .unwrap_or_default(),
            TopicSelector::All { track_id: None } => {
                let mut topics = self.all_topics.clone();
                topics.extend(self.units_by_topic.keys().cloned());
                topics
            }
        }
    }

    /// Union of the source units covered by every selected topic. Topics
    /// without scope units contribute nothing.
    pub fn source_units_for(&self, selector: &TopicSelector) -> BTreeSet<SourceUnitId> {
        let mut units = BTreeSet::new();
        for topic_id in self.selected_topics(selector) {
            if let Some(covered) = self.units_by_topic.get(&topic_id) {
                units.extend(covered.iter().cloned());
            }
        }
        units
    }

    pub fn topics_for_unit(&self, source_unit_id: &str) -> BTreeSet<TopicId> {
        self.topics_by_unit
            .get(source_unit_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn topic_count(&self) -> usize {
        self.all_topics.len()
    }

    pub fn mapped_unit_count(&self) -> usize {
        self.topics_by_unit.len()
    }
}
