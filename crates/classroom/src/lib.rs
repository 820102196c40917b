//! classroom: per-room admission control and session gating.

mod actor;
mod coordinator;
mod error;
mod registry;
mod snapshot;
mod state;

pub mod config;
pub mod driver;
pub mod reporter;
pub mod simulation;
pub mod spawner;
pub mod think;

pub use actor::{ActorId, ActorKind};
pub use coordinator::{Admission, ClassroomCoordinator, EntryMode, Party, SessionPhase};
pub use error::{ConfigError, RoomError};
pub use registry::{DEFAULT_VISITOR_CAPACITY, MAX_CAPACITY, RoomRegistry};
pub use snapshot::StatusRecord;

pub use config::SimulationConfig;
pub use driver::{EntryPolicy, HolderRoute, SeatGuard, SessionGuard};
pub use reporter::{Reporter, render_table};
pub use simulation::{Simulation, SimulationHandle, SimulationReport};
pub use tokio_util::sync::CancellationToken;
