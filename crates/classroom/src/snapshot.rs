//! Read-only status records for reporting.

use serde::Serialize;

use crate::coordinator::SessionPhase;

/// Lock-consistent copy of one room's state, taken by
/// `ClassroomCoordinator::snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    pub id: String,
    pub session_holder: Option<String>,
    pub session_active: bool,
    pub occupant_count: usize,
    pub visitor_count: usize,
    pub seat_capacity: usize,
    pub visitor_capacity: usize,
}

impl StatusRecord {
    pub fn phase(&self) -> SessionPhase {
        match (&self.session_holder, self.session_active) {
            (_, true) => SessionPhase::InSession,
            (Some(_), false) => SessionPhase::SlotHeld,
            (None, false) => SessionPhase::Idle,
        }
    }

    pub fn free_seats(&self) -> usize {
        self.seat_capacity.saturating_sub(self.occupant_count)
    }

    /// All seats taken.
    pub fn is_full(&self) -> bool {
        self.occupant_count >= self.seat_capacity
    }

    pub fn is_idle_and_empty(&self) -> bool {
        self.phase() == SessionPhase::Idle && self.occupant_count == 0 && self.visitor_count == 0
    }

    /// Describe the first violated room invariant, if any.
    pub fn invariant_violation(&self) -> Option<String> {
        if self.occupant_count > self.seat_capacity {
            return Some(format!(
                "room {}: {} occupants exceed {} seats",
                self.id, self.occupant_count, self.seat_capacity
            ));
        }
        if self.visitor_count > self.visitor_capacity {
            return Some(format!(
                "room {}: {} visitors exceed quota of {}",
                self.id, self.visitor_count, self.visitor_capacity
            ));
        }
        if self.session_active && self.session_holder.is_none() {
            return Some(format!("room {}: session active without a holder", self.id));
        }
        None
    }
}
