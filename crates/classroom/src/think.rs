//! Think-time sources for actor drivers.

use std::time::Duration;

use rand::Rng;

use crate::config::{MillisRange, TimingConfig};

/// Pauses an actor takes between coordinator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    OccupantStay,
    VisitorStay,
    SessionSetup,
    SessionLength,
    HolderBreak,
    SpawnInterval,
}

pub trait ThinkTime: Send + 'static {
    fn pause(&mut self, pause: Pause) -> Duration;
}

/// Uniformly random pauses within the configured ranges.
#[derive(Debug, Clone, Default)]
pub struct RandomThinkTime {
    timing: TimingConfig,
}

impl RandomThinkTime {
    pub fn new(timing: TimingConfig) -> Self {
        Self { timing }
    }

    fn range(&self, pause: Pause) -> MillisRange {
        match pause {
            Pause::OccupantStay => self.timing.occupant_stay,
            Pause::VisitorStay => self.timing.visitor_stay,
            Pause::SessionSetup => self.timing.session_setup,
            Pause::SessionLength => self.timing.session_length,
            Pause::HolderBreak => self.timing.holder_break,
            Pause::SpawnInterval => self.timing.spawn_interval,
        }
    }
}

impl ThinkTime for RandomThinkTime {
    fn pause(&mut self, pause: Pause) -> Duration {
        let MillisRange(min, max) = self.range(pause);
        // thread_rng is !Send; never hold it across an await.
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// The same pause for everything. Used by tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedThinkTime(pub Duration);

impl ThinkTime for FixedThinkTime {
    fn pause(&mut self, _pause: Pause) -> Duration {
        self.0
    }
}
