//! Passive per-room data guarded by the coordinator's mutex.

use crate::actor::ActorId;
use crate::coordinator::{Party, SessionPhase};

/// One room's capacities and live counters.
///
/// Only `ClassroomCoordinator` touches this, and only while holding its lock.
#[derive(Debug)]
pub(crate) struct RoomState {
    pub id: String,
    pub seat_capacity: usize,
    pub visitor_capacity: usize,
    pub occupant_count: usize,
    pub visitor_count: usize,
    pub session_holder: Option<ActorId>,
    pub session_active: bool,
}

impl RoomState {
    pub fn new(id: String, seat_capacity: usize, visitor_capacity: usize) -> Self {
        Self {
            id,
            seat_capacity,
            visitor_capacity,
            occupant_count: 0,
            visitor_count: 0,
            session_holder: None,
            session_active: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.session_holder, self.session_active) {
            (_, true) => SessionPhase::InSession,
            (Some(_), false) => SessionPhase::SlotHeld,
            (None, false) => SessionPhase::Idle,
        }
    }

    pub fn count(&self, party: Party) -> usize {
        match party {
            Party::Occupant => self.occupant_count,
            Party::Visitor => self.visitor_count,
        }
    }

    pub fn count_mut(&mut self, party: Party) -> &mut usize {
        match party {
            Party::Occupant => &mut self.occupant_count,
            Party::Visitor => &mut self.visitor_count,
        }
    }
}
