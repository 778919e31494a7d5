pub mod aggregate;
pub mod payload;
pub mod session;
pub mod snapshot;

pub use aggregate::{
    ActivityDetails, Aggregate, ConfidenceSource, InstancePerformance, SnapshotLink,
    WeaponPerformance,
};
pub use session::{Session, SessionFilter, SessionStatus};
pub use snapshot::{CharacterSnapshot, History, HistoryMeta, Loadout, LoadoutItem};
