//! Actor drivers - occupant, visitor and session-holder loops.
//!
//! Drivers are the only callers of the coordinator API in a running
//! simulation. They own their admissions through guards so that a cancelled
//! or aborted task never leaks a seat, a visitor pass or the session slot.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::actor::ActorId;
use crate::coordinator::{Admission, ClassroomCoordinator, EntryMode, Party};
use crate::error::RoomError;
use crate::registry::RoomRegistry;
use crate::think::{Pause, ThinkTime};

/// How an occupant or visitor waits for a full or gated room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPolicy {
    /// Park on the coordinator until admitted.
    Blocking,
    /// Retry the non-blocking entry after `backoff`.
    Polling { backoff: Duration },
}

/// Which room a session holder uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HolderRoute {
    /// A random room for every session.
    Random,
    Pinned(String),
}

/// An admission held by an occupant or visitor.
///
/// Releases on drop if `release` was not called, so a task that is aborted
/// while inside the room still returns its permit.
#[must_use = "dropping the guard releases the seat immediately"]
pub struct SeatGuard {
    room: Arc<ClassroomCoordinator>,
    party: Party,
    released: bool,
}

impl SeatGuard {
    fn new(room: Arc<ClassroomCoordinator>, party: Party) -> Self {
        Self {
            room,
            party,
            released: false,
        }
    }

    pub fn room(&self) -> &Arc<ClassroomCoordinator> {
        &self.room
    }

    pub fn party(&self) -> Party {
        self.party
    }

    pub fn release(mut self) -> Result<(), RoomError> {
        self.released = true;
        self.room.release(self.party)
    }
}

impl Drop for SeatGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(
            room = %self.room.id(),
            party = %self.party.kind(),
            "SeatGuard dropped without release - releasing"
        );
        if let Err(e) = self.room.release(self.party) {
            tracing::error!(room = %self.room.id(), error = %e, "Failed to release dropped seat");
        }
    }
}

/// The session slot held by a session holder.
///
/// Ends the session (or gives the slot back) on drop if `end` was not called.
#[must_use = "dropping the guard frees the session slot immediately"]
pub struct SessionGuard {
    room: Arc<ClassroomCoordinator>,
    holder: ActorId,
    ended: bool,
}

impl SessionGuard {
    pub fn room(&self) -> &Arc<ClassroomCoordinator> {
        &self.room
    }

    pub fn begin(&self) -> Result<(), RoomError> {
        self.room.begin_session(&self.holder)
    }

    pub fn end(mut self) -> Result<(), RoomError> {
        self.ended = true;
        self.room.end_session(&self.holder)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        tracing::warn!(
            room = %self.room.id(),
            holder = %self.holder,
            "SessionGuard dropped without end - freeing slot"
        );
        if let Err(e) = self.room.end_session(&self.holder) {
            tracing::error!(room = %self.room.id(), error = %e, "Failed to free dropped session slot");
        }
    }
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
pub async fn pause_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Enter `room` as `party` according to `policy`.
pub async fn admit(
    room: &Arc<ClassroomCoordinator>,
    party: Party,
    policy: EntryPolicy,
    cancel: &CancellationToken,
) -> Result<SeatGuard, RoomError> {
    let (mode, backoff) = match policy {
        EntryPolicy::Blocking => (EntryMode::Blocking, Duration::ZERO),
        EntryPolicy::Polling { backoff } => (EntryMode::NonBlocking, backoff),
    };

    loop {
        match room.request_entry(party, mode, cancel).await? {
            Admission::Admitted => return Ok(SeatGuard::new(Arc::clone(room), party)),
            Admission::Denied => {
                if !pause_or_cancel(backoff, cancel).await {
                    return Err(RoomError::CancelledWait {
                        room: room.id().to_string(),
                    });
                }
            }
        }
    }
}

/// Take the session slot of `room` for `holder`.
pub async fn reserve_session(
    room: &Arc<ClassroomCoordinator>,
    holder: &ActorId,
    cancel: &CancellationToken,
) -> Result<SessionGuard, RoomError> {
    // Blocking mode only returns once the slot is ours.
    let _ = room
        .acquire_session_slot(holder, EntryMode::Blocking, cancel)
        .await?;
    Ok(SessionGuard {
        room: Arc::clone(room),
        holder: holder.clone(),
        ended: false,
    })
}

/// One visit: enter, stay, leave.
///
/// Returns `Ok(false)` if cancelled before getting in. Cancellation while
/// inside cuts the stay short; the seat is released either way.
pub async fn run_visit<T: ThinkTime>(
    room: Arc<ClassroomCoordinator>,
    party: Party,
    think: &mut T,
    policy: EntryPolicy,
    cancel: &CancellationToken,
) -> Result<bool, RoomError> {
    let actor = ActorId::anonymous(party.kind());

    let guard = match admit(&room, party, policy, cancel).await {
        Ok(guard) => guard,
        Err(RoomError::CancelledWait { .. }) => {
            tracing::debug!(room = %room.id(), %actor, "Gave up waiting for entry");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    tracing::debug!(room = %room.id(), %actor, "Entered");

    let stay = think.pause(match party {
        Party::Occupant => Pause::OccupantStay,
        Party::Visitor => Pause::VisitorStay,
    });
    if !pause_or_cancel(stay, cancel).await {
        tracing::debug!(room = %room.id(), %actor, "Visit cut short");
    }

    guard.release()?;
    tracing::debug!(room = %room.id(), %actor, "Left");
    Ok(true)
}

pub async fn run_occupant<T: ThinkTime>(
    room: Arc<ClassroomCoordinator>,
    think: &mut T,
    policy: EntryPolicy,
    cancel: &CancellationToken,
) -> Result<bool, RoomError> {
    run_visit(room, Party::Occupant, think, policy, cancel).await
}

pub async fn run_visitor<T: ThinkTime>(
    room: Arc<ClassroomCoordinator>,
    think: &mut T,
    policy: EntryPolicy,
    cancel: &CancellationToken,
) -> Result<bool, RoomError> {
    run_visit(room, Party::Visitor, think, policy, cancel).await
}

/// Session-holder loop: reserve a room, set up, hold the session, leave,
/// take a break. Runs until cancelled and returns the number of completed
/// sessions.
///
/// Contract violations end the loop with the error.
pub async fn run_session_holder<T: ThinkTime>(
    registry: Arc<RoomRegistry>,
    holder: ActorId,
    route: HolderRoute,
    mut think: T,
    cancel: CancellationToken,
) -> Result<u64, RoomError> {
    let mut completed = 0;

    while !cancel.is_cancelled() {
        let room = Arc::clone(pick_room(&registry, &route)?);

        let session = match reserve_session(&room, &holder, &cancel).await {
            Ok(session) => session,
            Err(RoomError::CancelledWait { .. }) => break,
            Err(e) => return Err(e),
        };
        tracing::debug!(room = %room.id(), %holder, "Setting up");

        if !pause_or_cancel(think.pause(Pause::SessionSetup), &cancel).await {
            session.end()?;
            break;
        }
        session.begin()?;

        let finished = pause_or_cancel(think.pause(Pause::SessionLength), &cancel).await;
        session.end()?;
        if !finished {
            tracing::warn!(room = %room.id(), %holder, "Session cut short by shutdown");
            break;
        }
        completed += 1;

        if !pause_or_cancel(think.pause(Pause::HolderBreak), &cancel).await {
            break;
        }
    }

    tracing::debug!(%holder, completed, "Session holder stopped");
    Ok(completed)
}

fn pick_room<'a>(
    registry: &'a RoomRegistry,
    route: &HolderRoute,
) -> Result<&'a Arc<ClassroomCoordinator>, RoomError> {
    match route {
        HolderRoute::Pinned(id) => registry.get(id),
        HolderRoute::Random => {
            let index = rand::thread_rng().gen_range(0..registry.len().max(1));
            registry
                .iter()
                .nth(index)
                .ok_or_else(|| RoomError::UnknownRoom(format!("#{index}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SessionPhase;
    use crate::think::FixedThinkTime;

    fn room(seats: usize) -> Arc<ClassroomCoordinator> {
        Arc::new(ClassroomCoordinator::new("W101", seats, 5))
    }

    #[tokio::test]
    async fn seat_guard_releases_on_drop() {
        let room = room(1);
        let cancel = CancellationToken::new();

        {
            let _guard = admit(&room, Party::Occupant, EntryPolicy::Blocking, &cancel)
                .await
                .unwrap();
            assert_eq!(room.snapshot().occupant_count, 1);
        }

        assert_eq!(room.snapshot().occupant_count, 0);
        assert_eq!(room.available_seats(), 1);
    }

    #[tokio::test]
    async fn session_guard_frees_slot_on_drop() {
        let room = room(1);
        let cancel = CancellationToken::new();
        let holder = ActorId::named("Osama");

        {
            let session = reserve_session(&room, &holder, &cancel).await.unwrap();
            session.begin().unwrap();
            assert_eq!(room.session_phase(), SessionPhase::InSession);
        }

        assert_eq!(room.session_phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn polling_admit_retries_until_free() {
        let room = room(1);
        let cancel = CancellationToken::new();
        let first = admit(&room, Party::Occupant, EntryPolicy::Blocking, &cancel)
            .await
            .unwrap();

        let poller = {
            let room = Arc::clone(&room);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let policy = EntryPolicy::Polling {
                    backoff: Duration::from_millis(5),
                };
                admit(&room, Party::Occupant, policy, &cancel)
                    .await
                    .map(|guard| guard.release())
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!poller.is_finished());
        first.release().unwrap();

        let released = tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .expect("poller never got in")
            .unwrap()
            .unwrap();
        released.unwrap();
        assert_eq!(room.snapshot().occupant_count, 0);
    }

    #[tokio::test]
    async fn polling_admit_honours_cancel() {
        let room = room(1);
        let cancel = CancellationToken::new();
        let _held = admit(&room, Party::Occupant, EntryPolicy::Blocking, &cancel)
            .await
            .unwrap();

        let poll_cancel = CancellationToken::new();
        poll_cancel.cancel();
        let policy = EntryPolicy::Polling {
            backoff: Duration::from_millis(5),
        };
        let result = admit(&room, Party::Occupant, policy, &poll_cancel).await;
        assert!(matches!(result, Err(RoomError::CancelledWait { .. })));
        assert_eq!(room.snapshot().occupant_count, 1);
    }

    #[tokio::test]
    async fn visit_cancelled_inside_still_releases() {
        let room = room(2);
        let cancel = CancellationToken::new();
        let mut think = FixedThinkTime(Duration::from_secs(60));

        let visit = {
            let room = Arc::clone(&room);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_visitor(room, &mut think, EntryPolicy::Blocking, &cancel).await
            })
        };

        tokio::time::timeout(Duration::from_secs(1), async {
            while room.snapshot().visitor_count == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("visitor never entered");

        cancel.cancel();
        let entered = visit.await.unwrap().unwrap();
        assert!(entered);
        assert_eq!(room.snapshot().visitor_count, 0);
        assert_eq!(room.available_visitor_passes(), 5);
    }

    #[tokio::test]
    async fn holder_completes_sessions_and_leaves_room_idle() {
        let registry = Arc::new(RoomRegistry::new([("W101", 4)], 5).unwrap());
        let cancel = CancellationToken::new();

        let holder = tokio::spawn(run_session_holder(
            Arc::clone(&registry),
            ActorId::named("Barry"),
            HolderRoute::Pinned("W101".to_string()),
            FixedThinkTime(Duration::from_millis(5)),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let completed = holder.await.unwrap().unwrap();

        assert!(completed >= 1);
        let snap = registry.get("W101").unwrap().snapshot();
        assert!(snap.is_idle_and_empty());
    }

    #[tokio::test]
    async fn holder_with_unknown_pinned_room_fails() {
        let registry = Arc::new(RoomRegistry::new([("W101", 4)], 5).unwrap());
        let result = run_session_holder(
            registry,
            ActorId::named("Alex"),
            HolderRoute::Pinned("NOPE".to_string()),
            FixedThinkTime(Duration::ZERO),
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Err(RoomError::UnknownRoom("NOPE".to_string())));
    }
}
