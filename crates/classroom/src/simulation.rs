//! Wires a registry, session holders, the spawner and the reporter together.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::actor::ActorId;
use crate::config::{EntryPolicyKind, HolderAssignment, SimulationConfig};
use crate::driver::{EntryPolicy, HolderRoute, run_session_holder};
use crate::error::{ConfigError, RoomError};
use crate::registry::RoomRegistry;
use crate::reporter::Reporter;
use crate::snapshot::StatusRecord;
use crate::spawner::{RoomChooser, SpawnStats, Spawner};
use crate::think::RandomThinkTime;

/// Totals collected at shutdown.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub sessions_completed: u64,
    pub holder_failures: u64,
    pub reports: u64,
    pub actors: SpawnStats,
    pub final_state: Vec<StatusRecord>,
}

impl SimulationReport {
    /// No failures and every room empty and idle.
    pub fn is_clean(&self) -> bool {
        self.holder_failures == 0
            && self.actors.failed == 0
            && self.final_state.iter().all(StatusRecord::is_idle_and_empty)
    }
}

pub struct Simulation;

impl Simulation {
    /// Validate `config` and start every task. Must be called inside a tokio
    /// runtime.
    ///
    /// `sink` receives each periodic status report.
    pub fn start<F>(config: SimulationConfig, sink: F) -> Result<SimulationHandle, ConfigError>
    where
        F: FnMut(&[StatusRecord]) + Send + 'static,
    {
        config.validate()?;
        let registry = Arc::new(RoomRegistry::new(config.capacities(), config.visitor_capacity)?);
        let ids: Vec<String> = registry.ids().map(String::from).collect();
        let cancel = CancellationToken::new();
        let think = RandomThinkTime::new(config.timing.clone());

        let holders = config
            .holders
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let route = match config.holder_assignment {
                    HolderAssignment::Random => HolderRoute::Random,
                    HolderAssignment::Pinned => HolderRoute::Pinned(ids[i % ids.len()].clone()),
                };
                tokio::spawn(run_session_holder(
                    Arc::clone(&registry),
                    ActorId::named(name.as_str()),
                    route,
                    think.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        let policy = match config.entry_policy {
            EntryPolicyKind::Blocking => EntryPolicy::Blocking,
            EntryPolicyKind::Polling => EntryPolicy::Polling {
                backoff: config.poll_backoff(),
            },
        };
        let spawner = Spawner::new(
            Arc::clone(&registry),
            RoomChooser::weighted(&config.rooms),
            think,
            policy,
            config.visitor_ratio,
            config.max_actors,
        );
        let spawner = tokio::spawn(spawner.run(cancel.clone()));

        let reporter = Reporter::new(Arc::clone(&registry), config.report_interval());
        let reporter = tokio::spawn(reporter.run(cancel.clone(), sink));

        tracing::info!(
            rooms = registry.len(),
            holders = config.holders.len(),
            max_actors = config.max_actors,
            entry_policy = ?config.entry_policy,
            "Simulation started"
        );

        Ok(SimulationHandle {
            registry,
            cancel,
            holders,
            spawner,
            reporter,
        })
    }
}

/// Handle to a running simulation.
pub struct SimulationHandle {
    registry: Arc<RoomRegistry>,
    cancel: CancellationToken,
    holders: Vec<JoinHandle<Result<u64, RoomError>>>,
    spawner: JoinHandle<SpawnStats>,
    reporter: JoinHandle<u64>,
}

impl SimulationHandle {
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Cancel every task and wait for all of them to finish.
    pub async fn shutdown(self) -> SimulationReport {
        tracing::info!("Shutting down simulation");
        self.cancel.cancel();

        let mut sessions_completed = 0;
        let mut holder_failures = 0;
        for result in futures::future::join_all(self.holders).await {
            match result {
                Ok(Ok(completed)) => sessions_completed += completed,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Session holder failed");
                    holder_failures += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Session holder task panicked");
                    holder_failures += 1;
                }
            }
        }

        let actors = self.spawner.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Spawner task panicked");
            SpawnStats::default()
        });
        let reports = self.reporter.await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Reporter task panicked");
            0
        });

        let final_state = self.registry.snapshot_all();
        for record in final_state.iter().filter(|r| !r.is_idle_and_empty()) {
            tracing::warn!(
                room = %record.id,
                occupants = record.occupant_count,
                visitors = record.visitor_count,
                session_active = record.session_active,
                "Room not empty after shutdown"
            );
        }

        let report = SimulationReport {
            sessions_completed,
            holder_failures,
            reports,
            actors,
            final_state,
        };
        tracing::info!(
            sessions = report.sessions_completed,
            actors = report.actors.spawned,
            clean = report.is_clean(),
            "Simulation stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MillisRange, RoomConfig, TimingConfig};
    use std::time::Duration;

    fn fast_config() -> SimulationConfig {
        let ms = |min, max| MillisRange(min, max);
        SimulationConfig {
            rooms: vec![RoomConfig::new("A", 3, 2), RoomConfig::new("B", 2, 1)],
            holders: vec!["Osama".to_string(), "Barry".to_string()],
            holder_assignment: HolderAssignment::Pinned,
            max_actors: 10,
            visitor_ratio: 0.5,
            report_interval_ms: 20,
            timing: TimingConfig {
                occupant_stay: ms(2, 8),
                visitor_stay: ms(1, 4),
                session_setup: ms(2, 5),
                session_length: ms(5, 10),
                holder_break: ms(2, 5),
                spawn_interval: ms(1, 3),
            },
            ..SimulationConfig::default()
        }
    }

    #[tokio::test]
    async fn runs_and_shuts_down_clean() {
        let handle = Simulation::start(fast_config(), |_records: &[StatusRecord]| {}).unwrap();
        assert_eq!(handle.registry().len(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let report = tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown hung");

        assert!(report.is_clean(), "{report:?}");
        assert!(report.actors.spawned > 0);
        assert!(report.reports > 0);
        assert_eq!(report.final_state.len(), 2);
    }

    #[tokio::test]
    async fn polling_policy_runs_clean() {
        let config = SimulationConfig {
            entry_policy: EntryPolicyKind::Polling,
            poll_backoff_ms: 2,
            holder_assignment: HolderAssignment::Random,
            ..fast_config()
        };
        let handle = Simulation::start(config, |_records: &[StatusRecord]| {}).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let report = tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown hung");
        assert!(report.is_clean(), "{report:?}");
    }

    #[tokio::test]
    async fn rejects_duplicate_rooms() {
        let config = SimulationConfig {
            rooms: vec![RoomConfig::new("A", 3, 1), RoomConfig::new("A", 2, 1)],
            ..SimulationConfig::default()
        };
        let err = Simulation::start(config, |_records: &[StatusRecord]| {}).err().unwrap();
        assert!(matches!(err, ConfigError::Room(RoomError::DuplicateRoom(ref id)) if id == "A"));
    }
}
