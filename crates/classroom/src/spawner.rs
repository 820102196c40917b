//! Bounded actor spawner.
//!
//! Spawns one occupant per tick (and a visitor with probability
//! `visitor_ratio`) as tokio tasks. The number of live actors is capped by a
//! semaphore; at the cap the spawner waits for an actor to finish instead of
//! growing without bound.

use std::sync::Arc;

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::RoomConfig;
use crate::coordinator::{ClassroomCoordinator, Party};
use crate::driver::{EntryPolicy, pause_or_cancel, run_visit};
use crate::error::RoomError;
use crate::registry::RoomRegistry;
use crate::think::{Pause, ThinkTime};

/// Picks the room for each spawned actor.
#[derive(Debug, Clone)]
pub struct RoomChooser {
    ids: Vec<String>,
    weights: Option<WeightedIndex<u32>>,
}

impl RoomChooser {
    pub fn uniform(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            weights: None,
        }
    }

    /// Falls back to uniform when the weights are unusable (all zero).
    pub fn weighted(rooms: &[RoomConfig]) -> Self {
        let ids = rooms.iter().map(|r| r.id.clone()).collect();
        let weights = WeightedIndex::new(rooms.iter().map(|r| r.weight)).ok();
        if weights.is_none() {
            tracing::warn!("Room weights unusable, choosing rooms uniformly");
        }
        Self { ids, weights }
    }

    pub fn choose(&self) -> Option<&str> {
        if self.ids.is_empty() {
            return None;
        }
        let mut rng = rand::thread_rng();
        let index = match &self.weights {
            Some(weights) => weights.sample(&mut rng),
            None => rng.gen_range(0..self.ids.len()),
        };
        self.ids.get(index).map(String::as_str)
    }
}

/// Counters reported when the spawner stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpawnStats {
    pub spawned: u64,
    /// Entered, stayed and left.
    pub completed: u64,
    /// Cancelled before getting in.
    pub abandoned: u64,
    /// Returned an error or panicked.
    pub failed: u64,
}

impl SpawnStats {
    fn record(&mut self, result: Result<Result<bool, RoomError>, tokio::task::JoinError>) {
        match result {
            Ok(Ok(true)) => self.completed += 1,
            Ok(Ok(false)) => self.abandoned += 1,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Actor failed");
                self.failed += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "Actor task panicked");
                self.failed += 1;
            }
        }
    }
}

enum SpawnOutcome {
    Spawned,
    Skipped,
    Cancelled,
}

pub struct Spawner<T> {
    registry: Arc<RoomRegistry>,
    chooser: RoomChooser,
    think: T,
    policy: EntryPolicy,
    visitor_ratio: f64,
    limit: Arc<Semaphore>,
}

impl<T: ThinkTime + Clone> Spawner<T> {
    pub fn new(
        registry: Arc<RoomRegistry>,
        chooser: RoomChooser,
        think: T,
        policy: EntryPolicy,
        visitor_ratio: f64,
        max_actors: usize,
    ) -> Self {
        Self {
            registry,
            chooser,
            think,
            policy,
            visitor_ratio: visitor_ratio.clamp(0.0, 1.0),
            limit: Arc::new(Semaphore::new(max_actors.min(Semaphore::MAX_PERMITS))),
        }
    }

    /// Spawn until cancelled, then wait for every actor to leave.
    ///
    /// Actors observe the same token, so after cancellation they release
    /// whatever they hold and finish promptly.
    pub async fn run(mut self, cancel: CancellationToken) -> SpawnStats {
        let mut tasks = JoinSet::new();
        let mut stats = SpawnStats::default();

        loop {
            while let Some(result) = tasks.try_join_next() {
                stats.record(result);
            }

            if !pause_or_cancel(self.think.pause(Pause::SpawnInterval), &cancel).await {
                break;
            }

            let mut parties = vec![Party::Occupant];
            if self.roll_visitor() {
                parties.push(Party::Visitor);
            }

            let mut cancelled = false;
            for party in parties {
                match self.spawn_one(party, &mut tasks, &cancel).await {
                    SpawnOutcome::Spawned => stats.spawned += 1,
                    SpawnOutcome::Skipped => {}
                    SpawnOutcome::Cancelled => {
                        cancelled = true;
                        break;
                    }
                }
            }
            if cancelled {
                break;
            }
        }

        tracing::debug!(live = tasks.len(), "Spawner stopping, draining actors");
        while let Some(result) = tasks.join_next().await {
            stats.record(result);
        }
        tracing::info!(
            spawned = stats.spawned,
            completed = stats.completed,
            abandoned = stats.abandoned,
            failed = stats.failed,
            "Spawner stopped"
        );
        stats
    }

    fn roll_visitor(&self) -> bool {
        rand::thread_rng().gen_bool(self.visitor_ratio)
    }

    /// Waits for a free actor permit, then spawns `party` into a chosen room.
    async fn spawn_one(
        &mut self,
        party: Party,
        tasks: &mut JoinSet<Result<bool, RoomError>>,
        cancel: &CancellationToken,
    ) -> SpawnOutcome {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SpawnOutcome::Cancelled,
            permit = Arc::clone(&self.limit).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return SpawnOutcome::Cancelled,
            },
        };

        let room = match self.pick() {
            Ok(room) => room,
            Err(e) => {
                tracing::error!(error = %e, "Cannot place actor");
                return SpawnOutcome::Skipped;
            }
        };

        let mut think = self.think.clone();
        let policy = self.policy;
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = permit;
            run_visit(room, party, &mut think, policy, &cancel).await
        });
        SpawnOutcome::Spawned
    }

    fn pick(&self) -> Result<Arc<ClassroomCoordinator>, RoomError> {
        let id = self
            .chooser
            .choose()
            .ok_or_else(|| RoomError::UnknownRoom(String::new()))?;
        self.registry.get(id).map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::think::FixedThinkTime;
    use std::time::Duration;

    #[test]
    fn weighted_chooser_skips_zero_weight_rooms() {
        let rooms = vec![RoomConfig::new("A", 10, 0), RoomConfig::new("B", 10, 1)];
        let chooser = RoomChooser::weighted(&rooms);
        for _ in 0..50 {
            assert_eq!(chooser.choose(), Some("B"));
        }
    }

    #[test]
    fn uniform_chooser_covers_rooms() {
        let chooser = RoomChooser::uniform(["A", "B"]);
        let picks: std::collections::HashSet<_> = (0..200).filter_map(|_| chooser.choose()).collect();
        assert_eq!(picks.len(), 2);
        assert_eq!(RoomChooser::uniform(Vec::<String>::new()).choose(), None);
    }

    #[tokio::test]
    async fn spawner_respects_actor_cap_and_drains() {
        let registry = Arc::new(RoomRegistry::new([("A", 50)], 5).unwrap());
        let spawner = Spawner::new(
            Arc::clone(&registry),
            RoomChooser::uniform(["A"]),
            FixedThinkTime(Duration::from_millis(2)),
            EntryPolicy::Blocking,
            0.5,
            3,
        );
        let limit = Arc::clone(&spawner.limit);
        let cancel = CancellationToken::new();
        let run = tokio::spawn(spawner.run(cancel.clone()));

        for _ in 0..20 {
            let snap = registry.get("A").unwrap().snapshot();
            assert!(snap.occupant_count + snap.visitor_count <= 3);
            tokio::time::sleep(Duration::from_millis(3)).await;
        }

        cancel.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("spawner did not drain")
            .unwrap();

        assert!(stats.spawned > 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.spawned, stats.completed + stats.abandoned);
        assert_eq!(limit.available_permits(), 3);
        assert!(registry.get("A").unwrap().snapshot().is_idle_and_empty());
    }
}
