//! Periodic status reporting.
//!
//! The reporter only reads: it snapshots every room on a fixed interval and
//! hands the records to a caller-supplied sink.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::registry::RoomRegistry;
use crate::snapshot::StatusRecord;

pub struct Reporter {
    registry: Arc<RoomRegistry>,
    interval: Duration,
}

impl Reporter {
    pub fn new(registry: Arc<RoomRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Report every `interval` until cancelled. The first report comes one
    /// interval after start. Returns the number of reports emitted.
    pub async fn run<F>(self, cancel: CancellationToken, mut sink: F) -> u64
    where
        F: FnMut(&[StatusRecord]) + Send,
    {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reports = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let records = self.registry.snapshot_all();
                    for violation in records.iter().filter_map(StatusRecord::invariant_violation) {
                        tracing::error!(%violation, "Room invariant violated");
                    }
                    sink(&records);
                    reports += 1;
                }
            }
        }

        tracing::debug!(reports, "Reporter stopped");
        reports
    }
}

/// Sink that emits one structured event per room.
pub fn log_records(records: &[StatusRecord]) {
    for record in records {
        tracing::info!(
            room = %record.id,
            holder = record.session_holder.as_deref().unwrap_or("None"),
            in_session = record.session_active,
            occupants = record.occupant_count,
            seats = record.seat_capacity,
            visitors = record.visitor_count,
            "Room status"
        );
    }
}

/// Fixed-width status table.
pub fn render_table(records: &[StatusRecord]) -> String {
    let rule = "=".repeat(51);
    let mut lines = vec![
        rule.clone(),
        table_row("Room", "Holder", "InSession", "Occupants", "Visitors"),
        rule.clone(),
    ];
    for r in records {
        lines.push(table_row(
            &r.id,
            r.session_holder.as_deref().unwrap_or("None"),
            if r.session_active { "true" } else { "false" },
            &format!("{}/{}", r.occupant_count, r.seat_capacity),
            &format!("{}/{}", r.visitor_count, r.visitor_capacity),
        ));
    }
    lines.push(rule);
    lines.join("\n")
}

/// One JSON object per room, newline separated.
pub fn render_json_lines(records: &[StatusRecord]) -> serde_json::Result<String> {
    let lines = records
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

fn table_row(room: &str, holder: &str, session: &str, occupants: &str, visitors: &str) -> String {
    format!("{room:<8} {holder:<10} {session:<9} {occupants:>11} {visitors:>9}")
}
