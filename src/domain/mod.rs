//! Domain module - core entities and pure sync logic
//!
//! Snapshot and master record types, the identity-matching rules between
//! them, field normalization, and the per-cycle state machine. Nothing in
//! here performs I/O.

pub mod matching;
pub mod normalize;
pub mod student;
pub mod sync_cycle;
pub mod tenant;

// Re-export commonly used items
pub use matching::{match_tenant, MatchOutcome};
pub use student::{NewStudent, Occupancy, Student};
pub use sync_cycle::{SyncCycleState, SyncStage, TriggerGuard};
pub use tenant::{derive_room, Tag, Tenant};
