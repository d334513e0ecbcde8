//! Time bucketing for the timeline view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kgagent_core::types::Metadata;
use kgagent_core::TimeGranularity;

use crate::queries::NodeRecord;

/// Events kept per period unless the caller asks otherwise.
pub const DEFAULT_EVENTS_PER_PERIOD: usize = 10;

/// A timestamped node ready for bucketing.
#[derive(Debug, Clone)]
pub struct TimelineNode {
    pub timestamp: DateTime<Utc>,
    pub record: NodeRecord,
}

/// A node as listed under a timeline period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: Metadata,
}

/// One period of the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineBucket {
    pub time_period: String,
    pub node_count: usize,
    pub node_types: Vec<String>,
    pub events: Vec<TimelineEvent>,
}

/// Period key for a timestamp at the given granularity.
pub fn period_key(ts: &DateTime<Utc>, granularity: TimeGranularity) -> String {
    match granularity {
        TimeGranularity::Hour => ts.format("%Y-%m-%dT%H").to_string(),
        TimeGranularity::Day => ts.format("%Y-%m-%d").to_string(),
        TimeGranularity::Week => ts.format("%G-W%V").to_string(),
        TimeGranularity::Month => ts.format("%Y-%m").to_string(),
    }
}

/// Group nodes into periods ordered by period key.
///
/// Within a period, events follow node timestamp order and are capped at
/// `events_per_period`; `node_count` still counts every node.
pub fn bucket_timeline(
    mut nodes: Vec<TimelineNode>,
    granularity: TimeGranularity,
    events_per_period: usize,
) -> Vec<TimelineBucket> {
    nodes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let mut buckets: BTreeMap<String, TimelineBucket> = BTreeMap::new();
    for node in nodes {
        let key = period_key(&node.timestamp, granularity);
        let bucket = buckets.entry(key.clone()).or_insert_with(|| TimelineBucket {
            time_period: key,
            node_count: 0,
            node_types: Vec::new(),
            events: Vec::new(),
        });

        bucket.node_count += 1;
        let node_type = node.record.primary_label().to_string();
        if !bucket.node_types.contains(&node_type) {
            bucket.node_types.push(node_type);
        }
        if bucket.events.len() < events_per_period {
            bucket.events.push(TimelineEvent {
                id: node.record.node_id,
                labels: node.record.labels,
                properties: node.record.properties,
            });
        }
    }

    buckets.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, label: &str, ts: &str) -> TimelineNode {
        TimelineNode {
            timestamp: ts.parse().unwrap(),
            record: NodeRecord {
                node_id: id.to_string(),
                labels: vec![label.to_string()],
                properties: Metadata::new(),
                created_at: Some(ts.to_string()),
                updated_at: None,
            },
        }
    }

    #[test]
    fn test_period_keys() {
        let ts: DateTime<Utc> = "2024-12-30T08:15:00Z".parse().unwrap();
        assert_eq!(period_key(&ts, TimeGranularity::Hour), "2024-12-30T08");
        assert_eq!(period_key(&ts, TimeGranularity::Day), "2024-12-30");
        // ISO week year differs from the calendar year here.
        assert_eq!(period_key(&ts, TimeGranularity::Week), "2025-W01");
        assert_eq!(period_key(&ts, TimeGranularity::Month), "2024-12");
    }

    #[test]
    fn test_bucket_by_day() {
        let nodes = vec![
            node("c", "Person", "2024-03-02T09:00:00Z"),
            node("a", "Episode", "2024-03-01T10:00:00Z"),
            node("b", "Person", "2024-03-01T12:00:00Z"),
        ];
        let buckets = bucket_timeline(nodes, TimeGranularity::Day, DEFAULT_EVENTS_PER_PERIOD);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].time_period, "2024-03-01");
        assert_eq!(buckets[0].node_count, 2);
        assert_eq!(buckets[0].node_types, vec!["Episode", "Person"]);
        assert_eq!(buckets[0].events[0].id, "a");
        assert_eq!(buckets[1].time_period, "2024-03-02");
        assert_eq!(buckets[1].node_count, 1);
    }

    #[test]
    fn test_events_capped_but_counted() {
        let nodes: Vec<_> = (0..15)
            .map(|i| node(&format!("n{i}"), "Episode", &format!("2024-03-01T10:{i:02}:00Z")))
            .collect();
        let buckets = bucket_timeline(nodes, TimeGranularity::Month, 10);

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].node_count, 15);
        assert_eq!(buckets[0].events.len(), 10);
        assert_eq!(buckets[0].events[9].id, "n9");
    }

    #[test]
    fn test_empty_input() {
        assert!(bucket_timeline(Vec::new(), TimeGranularity::Week, 10).is_empty());
    }
}
