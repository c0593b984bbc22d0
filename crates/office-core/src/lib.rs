//! office-core: occupancy model, time-of-day scheduling, the occupancy state
//! machine and panel rendering.
//!
//! Pure library. All IO lives behind [`store::OccupancyStore`]; every
//! operation takes `now` explicitly so behavior is reproducible.

pub mod clock;
pub mod engine;
pub mod render;
pub mod store;
pub mod types;

pub use clock::ReferenceZone;
pub use engine::{
    ConflictPolicy, Deregistration, Engine, EngineError, RegisterOutcome, RegisterRequest,
    Registration, TickReport, TimeField,
};
pub use render::{PanelView, describe_transition, render};
pub use store::{MemoryStore, OccupancyStore, StoreError, StoreResult};
pub use types::{EntryState, HistoryEntry, OccupancyEntry, PanelBinding, Transition};
