//! Loadout tracker: content-addressed loadout snapshots, per-activity
//! aggregates shared across characters, and recording sessions.

pub mod aggregates;
pub mod config;
pub mod db;
pub mod errors;
pub mod loadout;
pub mod manifest;
pub mod models;
pub mod reconcile;
pub mod sessions;
pub mod state;
pub mod store;
