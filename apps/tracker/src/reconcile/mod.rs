//! Reconciliation: one observed match in, linked snapshot/aggregate/session
//! records out, plus read-only enrichment for presentation.

pub mod enrichment;
pub mod orchestrator;
pub mod retry;

pub use enrichment::{enrich_aggregate, EnrichedAggregate, EnrichedCharacter, EnrichedWeapon};
pub use orchestrator::{ObservedMatch, Reconciler, RecordedMatch, SessionReport};
pub use retry::{with_retry, RetryPolicy};
