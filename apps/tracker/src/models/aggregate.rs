use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a snapshot link was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    /// Inferred by the tracker when the match was observed.
    System,
    /// Asserted by the user, e.g. through a snapshot merge.
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotLink {
    pub snapshot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub character_id: String,
    pub confidence_source: ConfidenceSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_snapshot_id: Option<String>,
}

impl SnapshotLink {
    pub fn inferred(snapshot_id: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            session_id: None,
            character_id: character_id.into(),
            confidence_source: ConfidenceSource::System,
            original_snapshot_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Points a link at `target` when it currently references `source`.
    /// The first-ever snapshot id is preserved in `original_snapshot_id`.
    /// Returns false (and changes nothing) for links that do not reference `source`.
    pub fn redirect(&mut self, source: &str, target: &str) -> bool {
        if self.snapshot_id != source || source == target {
            return false;
        }
        if self.original_snapshot_id.is_none() {
            self.original_snapshot_id = Some(source.to_string());
        }
        self.snapshot_id = target.to_string();
        self.confidence_source = ConfidenceSource::User;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetails {
    pub activity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_hash: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director_activity_hash: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modes: Vec<u32>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub period: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponPerformance {
    pub reference_id: u32,
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl WeaponPerformance {
    pub fn kills(&self) -> f64 {
        self.values.get("uniqueWeaponKills").copied().unwrap_or_default()
    }
}

/// One character's performance in a single activity instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePerformance {
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weapons: Vec<WeaponPerformance>,
}

/// One record per activity instance, shared by every tracked character who
/// played it. `session_ids`/`snapshot_ids`/`character_ids` are derived from
/// `snapshot_links` by the backfill pass and are never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub id: String,
    pub activity_id: String,
    pub activity_details: ActivityDetails,
    #[serde(default)]
    pub snapshot_links: BTreeMap<String, SnapshotLink>,
    #[serde(default)]
    pub performance: BTreeMap<String, InstancePerformance>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshot_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub character_ids: Vec<String>,
}

/// Flat id sets recomputed from the current snapshot links.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Linkage {
    pub session_ids: BTreeSet<String>,
    pub snapshot_ids: BTreeSet<String>,
    pub character_ids: BTreeSet<String>,
}

impl Aggregate {
    /// A fresh aggregate seeded with exactly one character's data.
    pub fn seeded(
        id: String,
        activity_details: ActivityDetails,
        character_id: &str,
        link: SnapshotLink,
        performance: InstancePerformance,
    ) -> Self {
        Self {
            id,
            activity_id: activity_details.activity_id.clone(),
            activity_details,
            snapshot_links: BTreeMap::from([(character_id.to_string(), link)]),
            performance: BTreeMap::from([(character_id.to_string(), performance)]),
            created_at: Utc::now(),
            session_ids: Vec::new(),
            snapshot_ids: Vec::new(),
            character_ids: Vec::new(),
        }
    }

    pub fn linkage(&self) -> Linkage {
        let mut linkage = Linkage::default();
        for (character_id, link) in &self.snapshot_links {
            linkage.character_ids.insert(character_id.clone());
            linkage.snapshot_ids.insert(link.snapshot_id.clone());
            if let Some(session_id) = &link.session_id {
                linkage.session_ids.insert(session_id.clone());
            }
        }
        linkage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_sets_original_only_once() {
        let mut link = SnapshotLink::inferred("s2", "c1");
        assert!(link.redirect("s2", "s1"));
        assert_eq!(link.snapshot_id, "s1");
        assert_eq!(link.original_snapshot_id.as_deref(), Some("s2"));
        assert_eq!(link.confidence_source, ConfidenceSource::User);

        // A later merge keeps the first-ever id.
        assert!(link.redirect("s1", "s0"));
        assert_eq!(link.snapshot_id, "s0");
        assert_eq!(link.original_snapshot_id.as_deref(), Some("s2"));
    }

    #[test]
    fn test_redirect_is_noop_for_other_snapshots() {
        let mut link = SnapshotLink::inferred("s1", "c1");
        let before = link.clone();
        assert!(!link.redirect("s2", "s1"));
        assert_eq!(link, before);
    }

    #[test]
    fn test_linkage_collects_ids() {
        let details = ActivityDetails {
            activity_id: "act-1".into(),
            reference_hash: None,
            director_activity_hash: None,
            mode: None,
            modes: vec![],
            period: Utc::now(),
        };
        let mut aggregate = Aggregate::seeded(
            "a1".into(),
            details,
            "c1",
            SnapshotLink::inferred("s1", "c1").with_session(Some("sess-1".into())),
            InstancePerformance::default(),
        );
        aggregate
            .snapshot_links
            .insert("c2".into(), SnapshotLink::inferred("s9", "c2"));

        let linkage = aggregate.linkage();
        assert_eq!(linkage.character_ids.len(), 2);
        assert!(linkage.snapshot_ids.contains("s9"));
        assert_eq!(linkage.session_ids.into_iter().collect::<Vec<_>>(), vec!["sess-1"]);
    }

    #[test]
    fn test_derived_arrays_are_optional_on_read() {
        let value = serde_json::json!({
            "id": "a1",
            "activityId": "act-1",
            "activityDetails": { "activityId": "act-1", "period": 0 },
            "createdAt": 0
        });
        let aggregate: Aggregate = serde_json::from_value(value).unwrap();
        assert!(aggregate.snapshot_links.is_empty());
        assert!(aggregate.session_ids.is_empty());
    }
}
