//! Error types for room coordination.

use crate::actor::ActorKind;
use crate::coordinator::SessionPhase;

/// Errors returned by coordinators and the registry.
///
/// `Admission::Denied` is not represented here: a full room or an active
/// session is ordinary control flow for non-blocking callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Release without a matching successful admission.
    #[error("{party} released from room {room} without a matching admission")]
    InvalidRelease { room: String, party: ActorKind },

    /// `begin_session`/`end_session` without holding the slot.
    #[error("invalid session transition in room {room} from {phase}: {reason}")]
    InvalidTransition {
        room: String,
        phase: SessionPhase,
        reason: &'static str,
    },

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    /// A blocking wait was abandoned. No state was mutated.
    #[error("wait cancelled in room {room}")]
    CancelledWait { room: String },

    #[error(
        "invalid {party} capacity for room {room}: must be between 1 and {max}",
        max = crate::registry::MAX_CAPACITY
    )]
    InvalidCapacity { room: String, party: ActorKind },

    #[error("duplicate room id: {0}")]
    DuplicateRoom(String),
}

impl RoomError {
    /// Contract violations indicate a driver bug and must stop the driver.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            RoomError::InvalidRelease { .. } | RoomError::InvalidTransition { .. }
        )
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    /// The room catalog was rejected by the registry.
    #[error(transparent)]
    Room(#[from] RoomError),
}
