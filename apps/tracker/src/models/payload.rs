//! Raw payloads as returned by the game-API client.
//!
//! Every level of the upstream JSON may be missing, so every field is optional
//! here. Conversion into domain types happens once, with explicit defaults or a
//! `Validation` error for the fields the tracker cannot work without.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::errors::AppError;
use crate::models::aggregate::{ActivityDetails, InstancePerformance, WeaponPerformance};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSocket {
    pub plug_hash: Option<u32>,
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub item_hash: Option<u32>,
    pub item_instance_id: Option<String>,
    pub bucket_hash: Option<u32>,
    pub sockets: Option<Vec<RawSocket>>,
}

impl RawItem {
    /// Enabled plug hashes; sockets without a plug are skipped.
    pub fn plug_hashes(&self) -> Vec<u32> {
        self.sockets
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|s| s.is_enabled.unwrap_or(true))
            .filter_map(|s| s.plug_hash)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLoadout {
    pub character_id: Option<String>,
    pub equipment: Option<Vec<RawItem>>,
    pub stats: Option<BTreeMap<String, i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    pub instance_id: Option<String>,
    pub reference_id: Option<u32>,
    pub director_activity_hash: Option<u32>,
    pub mode: Option<u32>,
    pub modes: Option<Vec<u32>>,
    pub period: Option<DateTime<Utc>>,
}

impl RawActivity {
    /// Fails when the instance id is missing: it is the aggregate's natural key.
    /// A missing period defaults to the observation time.
    pub fn into_details(self, observed_at: DateTime<Utc>) -> Result<ActivityDetails, AppError> {
        let activity_id = self
            .instance_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Activity payload has no instance id".into()))?;
        Ok(ActivityDetails {
            activity_id,
            reference_hash: self.reference_id,
            director_activity_hash: self.director_activity_hash,
            mode: self.mode,
            modes: self.modes.unwrap_or_default(),
            period: self.period.unwrap_or(observed_at),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStatValue {
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStat {
    pub basic: Option<RawStatValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWeapon {
    pub reference_id: Option<u32>,
    pub values: Option<BTreeMap<String, RawStat>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtended {
    pub weapons: Option<Vec<RawWeapon>>,
}

/// One character's entry in a post-game carnage report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPerformance {
    pub character_id: Option<String>,
    pub values: Option<BTreeMap<String, RawStat>>,
    pub extended: Option<RawExtended>,
}

fn flatten_stats(values: Option<BTreeMap<String, RawStat>>) -> BTreeMap<String, f64> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, stat)| stat.basic.and_then(|b| b.value).map(|v| (name, v)))
        .collect()
}

impl From<RawPerformance> for InstancePerformance {
    fn from(raw: RawPerformance) -> Self {
        let weapons = raw
            .extended
            .and_then(|e| e.weapons)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|w| match w.reference_id {
                Some(reference_id) => Some(WeaponPerformance {
                    reference_id,
                    values: flatten_stats(w.values),
                }),
                None => {
                    debug!("Skipping weapon entry without a reference id");
                    None
                }
            })
            .collect();
        InstancePerformance {
            values: flatten_stats(raw.values),
            weapons,
        }
    }
}
