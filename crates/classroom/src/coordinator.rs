//! ClassroomCoordinator - admission control and session gating for one room.
//!
//! Composes three primitives around a single state mutex:
//! - Counting semaphores for occupant seats and visitor passes
//! - A one-permit semaphore for the exclusive session slot
//! - A `Notify` (`session_cleared`) acting as the condition variable for the
//!   "no entry while a session runs" gate
//!
//! Admitted permits are forgotten and accounted for in `RoomState`; a release
//! adds the permit back. The state mutex is never held across an `.await`.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{Notify, Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::actor::{ActorId, ActorKind};
use crate::error::RoomError;
use crate::snapshot::StatusRecord;
use crate::state::RoomState;

/// Outcome of an admission request.
#[must_use = "admission outcome must be checked"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Whether an admission request may suspend the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Wait until capacity frees and no session is active.
    Blocking,
    /// Return `Denied` immediately instead of waiting.
    NonBlocking,
}

/// Session sub-state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    /// Slot reserved, session not yet started. Entry is still open.
    SlotHeld,
    InSession,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SlotHeld => "slot_held",
            Self::InSession => "in_session",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission pools of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Occupant,
    Visitor,
}

impl Party {
    pub fn kind(self) -> ActorKind {
        match self {
            Party::Occupant => ActorKind::Occupant,
            Party::Visitor => ActorKind::Visitor,
        }
    }
}

pub struct ClassroomCoordinator {
    id: String,
    seat_capacity: usize,
    visitor_capacity: usize,
    state: Mutex<RoomState>,
    /// Notified when a session ends or a count decreases.
    session_cleared: Notify,
    seats: Semaphore,
    visitor_passes: Semaphore,
    session_slot: Semaphore,
}

impl ClassroomCoordinator {
    /// Capacities are validated by `RoomRegistry`; zero is accepted here and
    /// simply denies every entry of that party.
    ///
    /// # Panics
    ///
    /// If a capacity exceeds `MAX_CAPACITY`.
    pub fn new(id: impl Into<String>, seat_capacity: usize, visitor_capacity: usize) -> Self {
        let id = id.into();
        Self {
            state: Mutex::new(RoomState::new(id.clone(), seat_capacity, visitor_capacity)),
            id,
            seat_capacity,
            visitor_capacity,
            session_cleared: Notify::new(),
            seats: Semaphore::new(seat_capacity),
            visitor_passes: Semaphore::new(visitor_capacity),
            session_slot: Semaphore::new(1),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seat_capacity(&self) -> usize {
        self.seat_capacity
    }

    pub fn visitor_capacity(&self) -> usize {
        self.visitor_capacity
    }

    /// Free occupant permits.
    pub fn available_seats(&self) -> usize {
        self.seats.available_permits()
    }

    /// Free visitor permits.
    pub fn available_visitor_passes(&self) -> usize {
        self.visitor_passes.available_permits()
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.lock_state().phase()
    }

    pub async fn request_occupant_entry(
        &self,
        mode: EntryMode,
        cancel: &CancellationToken,
    ) -> Result<Admission, RoomError> {
        self.request_entry(Party::Occupant, mode, cancel).await
    }

    /// Always permitted, including during a session.
    pub fn release_occupant(&self) -> Result<(), RoomError> {
        self.release(Party::Occupant)
    }

    pub async fn request_visitor_entry(
        &self,
        mode: EntryMode,
        cancel: &CancellationToken,
    ) -> Result<Admission, RoomError> {
        self.request_entry(Party::Visitor, mode, cancel).await
    }

    pub fn release_visitor(&self) -> Result<(), RoomError> {
        self.release(Party::Visitor)
    }

    /// Reserve the exclusive session slot for `holder`.
    ///
    /// The session does not start until `begin_session`; until then entry
    /// remains open.
    pub async fn acquire_session_slot(
        &self,
        holder: &ActorId,
        mode: EntryMode,
        cancel: &CancellationToken,
    ) -> Result<Admission, RoomError> {
        let permit = match mode {
            EntryMode::NonBlocking => match self.session_slot.try_acquire() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!(room = %self.id, holder = %holder, "Session slot taken");
                    return Ok(Admission::Denied);
                }
            },
            EntryMode::Blocking => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                permit = self.session_slot.acquire() => permit.map_err(|_| self.cancelled())?,
            },
        };

        self.commit_slot(holder, permit);
        Ok(Admission::Admitted)
    }

    /// Start the session. Only the current slot holder may call this.
    pub fn begin_session(&self, holder: &ActorId) -> Result<(), RoomError> {
        let mut state = self.lock_state();
        let phase = state.phase();
        let reason = match &state.session_holder {
            None => Some("no session slot held"),
            Some(current) if current != holder => Some("caller does not hold the slot"),
            Some(_) if state.session_active => Some("session already in progress"),
            Some(_) => None,
        };
        if let Some(reason) = reason {
            drop(state);
            return Err(self.invalid_transition(phase, reason));
        }

        state.session_active = true;
        tracing::info!(
            room = %self.id,
            holder = %holder,
            occupants = state.occupant_count,
            visitors = state.visitor_count,
            "Session started"
        );
        Ok(())
    }

    /// End the session (or give up a held slot that never started one),
    /// free the slot and wake every waiter.
    pub fn end_session(&self, holder: &ActorId) -> Result<(), RoomError> {
        {
            let mut state = self.lock_state();
            let phase = state.phase();
            let reason = match &state.session_holder {
                None => Some("no session slot held"),
                Some(current) if current != holder => Some("caller does not hold the slot"),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                drop(state);
                return Err(self.invalid_transition(phase, reason));
            }

            state.session_active = false;
            state.session_holder = None;
            self.session_slot.add_permits(1);
            tracing::info!(room = %self.id, holder = %holder, from = %phase, "Session ended");
        }

        self.session_cleared.notify_waiters();
        Ok(())
    }

    /// Lock-consistent copy of the room state.
    pub fn snapshot(&self) -> StatusRecord {
        let state = self.lock_state();
        StatusRecord {
            id: state.id.clone(),
            session_holder: state.session_holder.as_ref().map(|h| h.to_string()),
            session_active: state.session_active,
            occupant_count: state.occupant_count,
            visitor_count: state.visitor_count,
            seat_capacity: state.seat_capacity,
            visitor_capacity: state.visitor_capacity,
        }
    }

    /// Admission request against the pool of `party`.
    pub async fn request_entry(
        &self,
        party: Party,
        mode: EntryMode,
        cancel: &CancellationToken,
    ) -> Result<Admission, RoomError> {
        match mode {
            EntryMode::NonBlocking => Ok(self.try_enter(party)),
            EntryMode::Blocking => self.enter_blocking(party, cancel).await,
        }
    }

    fn try_enter(&self, party: Party) -> Admission {
        let mut state = self.lock_state();
        if state.session_active {
            tracing::debug!(room = %self.id, party = %party.kind(), "Entry denied: session active");
            return Admission::Denied;
        }
        let Ok(permit) = self.pool(party).try_acquire() else {
            tracing::debug!(room = %self.id, party = %party.kind(), "Entry denied: at capacity");
            return Admission::Denied;
        };

        permit.forget();
        *state.count_mut(party) += 1;
        tracing::debug!(
            room = %self.id,
            party = %party.kind(),
            count = state.count(party),
            "Admitted"
        );
        Admission::Admitted
    }

    async fn enter_blocking(
        &self,
        party: Party,
        cancel: &CancellationToken,
    ) -> Result<Admission, RoomError> {
        loop {
            self.wait_session_cleared(cancel).await?;

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                permit = self.pool(party).acquire() => permit.map_err(|_| self.cancelled())?,
            };

            // A session may have begun while we waited for the permit.
            if self.commit_entry(party, permit) {
                return Ok(Admission::Admitted);
            }
        }
    }

    /// Re-check the gate under the lock and record the admission. Returns
    /// `false` (dropping the permit back into the pool) if a session is active.
    fn commit_entry(&self, party: Party, permit: SemaphorePermit<'_>) -> bool {
        let mut state = self.lock_state();
        if state.session_active {
            return false;
        }

        permit.forget();
        *state.count_mut(party) += 1;
        tracing::debug!(
            room = %self.id,
            party = %party.kind(),
            count = state.count(party),
            "Admitted after wait"
        );
        true
    }

    fn commit_slot(&self, holder: &ActorId, permit: SemaphorePermit<'_>) {
        let mut state = self.lock_state();
        debug_assert!(state.session_holder.is_none(), "slot permit acquired twice");
        permit.forget();
        state.session_holder = Some(holder.clone());
        state.session_active = false;
        tracing::info!(room = %self.id, holder = %holder, "Session slot acquired");
    }

    /// Wait until no session is active.
    ///
    /// Interest in `session_cleared` is registered before the predicate is
    /// checked, so a notification between check and wait is not lost.
    async fn wait_session_cleared(&self, cancel: &CancellationToken) -> Result<(), RoomError> {
        loop {
            let notified = self.session_cleared.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let active = self.lock_state().session_active;
            if !active {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled()),
                _ = &mut notified => {}
            }
        }
    }

    /// Return an admission of `party`. Always permitted, including during a
    /// session; fails with `InvalidRelease` when nothing is admitted.
    pub fn release(&self, party: Party) -> Result<(), RoomError> {
        {
            let mut state = self.lock_state();
            let count = state.count_mut(party);
            if *count == 0 {
                drop(state);
                tracing::error!(
                    room = %self.id,
                    party = %party.kind(),
                    "Bug: release without matching admission"
                );
                debug_assert!(false, "release without matching admission");
                return Err(RoomError::InvalidRelease {
                    room: self.id.clone(),
                    party: party.kind(),
                });
            }

            *count -= 1;
            self.pool(party).add_permits(1);
            tracing::debug!(
                room = %self.id,
                party = %party.kind(),
                count = state.count(party),
                "Released"
            );
        }

        self.session_cleared.notify_waiters();
        Ok(())
    }

    fn pool(&self, party: Party) -> &Semaphore {
        match party {
            Party::Occupant => &self.seats,
            Party::Visitor => &self.visitor_passes,
        }
    }

    /// On poison: logs error and recovers the guard. Counters are only
    /// written after validation, so the inner state is still consistent.
    fn lock_state(&self) -> MutexGuard<'_, RoomState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(room = %self.id, "Room state mutex poisoned - recovering");
                poisoned.into_inner()
            }
        }
    }

    fn cancelled(&self) -> RoomError {
        RoomError::CancelledWait {
            room: self.id.clone(),
        }
    }

    fn invalid_transition(&self, phase: SessionPhase, reason: &'static str) -> RoomError {
        tracing::error!(room = %self.id, %phase, reason, "Bug: invalid session transition");
        RoomError::InvalidTransition {
            room: self.id.clone(),
            phase,
            reason,
        }
    }
}

impl std::fmt::Debug for ClassroomCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassroomCoordinator")
            .field("id", &self.id)
            .field("seat_capacity", &self.seat_capacity)
            .field("visitor_capacity", &self.visitor_capacity)
            .finish_non_exhaustive()
    }
}
