use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ResourceRecord;

/// Flattened view of one ad with its ancestors and (at most) one metrics row.
///
/// Built once per fan-out pass and handed straight to the consumer; joined
/// records are never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub campaign: ResourceRecord,
    pub ad_group: ResourceRecord,
    pub ad: ResourceRecord,
    pub insight: Option<ResourceRecord>,
}

impl JoinedRecord {
    pub fn has_insight(&self) -> bool {
        self.insight.is_some()
    }

    /// Single-level map with `campaign_`, `ad_group_`, `ad_` and `insight_`
    /// prefixed keys, the shape persistence and reporting consume.
    pub fn flatten(&self) -> Map<String, Value> {
        let mut flat = Map::new();
        let sections = [
            ("campaign", Some(&self.campaign)),
            ("ad_group", Some(&self.ad_group)),
            ("ad", Some(&self.ad)),
            ("insight", self.insight.as_ref()),
        ];

        for (prefix, record) in sections {
            let Some(record) = record else { continue };
            flat.insert(
                format!("{prefix}_id"),
                Value::String(record.id().as_str().to_owned()),
            );
            for (name, value) in record.fields() {
                if name == "id" {
                    continue;
                }
                flat.insert(format!("{prefix}_{name}"), value.clone());
            }
        }

        flat
    }
}
