//! Per-activity aggregates and their snapshot links.

pub mod store;

pub use store::{AggregateStore, AGGREGATES};
