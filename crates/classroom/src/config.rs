//! Simulation configuration.
//!
//! Loaded from TOML; every field has a default so an empty file (or no file)
//! runs the standard four-room catalog.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::registry::{DEFAULT_VISITOR_CAPACITY, MAX_CAPACITY};

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomConfig {
    pub id: String,
    pub seats: usize,
    /// Relative likelihood that a spawned actor picks this room.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl RoomConfig {
    pub fn new(id: impl Into<String>, seats: usize, weight: u32) -> Self {
        Self {
            id: id.into(),
            seats,
            weight,
        }
    }
}

/// How session holders pick rooms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HolderAssignment {
    /// A random room for every session.
    #[default]
    Random,
    /// Holder `i` always uses room `i % rooms`.
    Pinned,
}

/// How occupants and visitors wait for entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPolicyKind {
    #[default]
    Blocking,
    /// Retry non-blocking entry after `poll_backoff_ms`.
    Polling,
}

/// Inclusive millisecond range, written as `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MillisRange(pub u64, pub u64);

impl MillisRange {
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.1)
    }

    fn is_valid(&self) -> bool {
        self.0 <= self.1
    }
}

/// Think-time ranges for every pause an actor takes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub occupant_stay: MillisRange,
    pub visitor_stay: MillisRange,
    pub session_setup: MillisRange,
    pub session_length: MillisRange,
    pub holder_break: MillisRange,
    pub spawn_interval: MillisRange,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            occupant_stay: MillisRange(3_000, 8_000),
            visitor_stay: MillisRange(1_000, 4_000),
            session_setup: MillisRange(1_000, 3_000),
            session_length: MillisRange(5_000, 13_000),
            holder_break: MillisRange(3_000, 8_000),
            spawn_interval: MillisRange(500, 1_500),
        }
    }
}

impl TimingConfig {
    fn ranges(&self) -> [(&'static str, MillisRange); 6] {
        [
            ("occupant_stay", self.occupant_stay),
            ("visitor_stay", self.visitor_stay),
            ("session_setup", self.session_setup),
            ("session_length", self.session_length),
            ("holder_break", self.holder_break),
            ("spawn_interval", self.spawn_interval),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub rooms: Vec<RoomConfig>,
    pub visitor_capacity: usize,
    /// Names of the session holders; one long-lived actor each.
    pub holders: Vec<String>,
    pub holder_assignment: HolderAssignment,
    pub entry_policy: EntryPolicyKind,
    pub poll_backoff_ms: u64,
    /// Cap on concurrently live occupant and visitor actors.
    pub max_actors: usize,
    /// Probability that a spawn tick also spawns a visitor.
    pub visitor_ratio: f64,
    pub report_interval_ms: u64,
    pub timing: TimingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rooms: vec![
                RoomConfig::new("W201", 60, 4),
                RoomConfig::new("W202", 60, 3),
                RoomConfig::new("W101", 20, 1),
                RoomConfig::new("J5101", 30, 2),
            ],
            visitor_capacity: DEFAULT_VISITOR_CAPACITY,
            holders: ["Osama", "Barry", "Faheem", "Alex", "Aqeel", "Waseem"]
                .into_iter()
                .map(String::from)
                .collect(),
            holder_assignment: HolderAssignment::default(),
            entry_policy: EntryPolicyKind::default(),
            poll_backoff_ms: 500,
            max_actors: 200,
            visitor_ratio: 0.3,
            report_interval_ms: 2_000,
            timing: TimingConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rooms.is_empty() {
            return Err(ConfigError::Invalid("at least one room is required".into()));
        }
        if let Some(room) = self.rooms.iter().find(|r| r.seats == 0) {
            return Err(ConfigError::Invalid(format!(
                "room {} must have at least one seat",
                room.id
            )));
        }
        if let Some(room) = self.rooms.iter().find(|r| r.seats > MAX_CAPACITY) {
            return Err(ConfigError::Invalid(format!(
                "room {} has {} seats, more than the maximum {MAX_CAPACITY}",
                room.id, room.seats
            )));
        }
        if self.rooms.iter().all(|r| r.weight == 0) {
            return Err(ConfigError::Invalid("at least one room needs a positive weight".into()));
        }
        if self.visitor_capacity == 0 {
            return Err(ConfigError::Invalid("visitor_capacity must be positive".into()));
        }
        if self.visitor_capacity > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "visitor_capacity {} exceeds the maximum {MAX_CAPACITY}",
                self.visitor_capacity
            )));
        }
        if self.max_actors == 0 {
            return Err(ConfigError::Invalid("max_actors must be positive".into()));
        }
        if self.max_actors > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "max_actors {} exceeds the maximum {MAX_CAPACITY}",
                self.max_actors
            )));
        }
        if self.entry_policy == EntryPolicyKind::Polling && self.poll_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_backoff_ms must be positive with the polling entry policy".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.visitor_ratio) {
            return Err(ConfigError::Invalid(format!(
                "visitor_ratio {} is outside [0, 1]",
                self.visitor_ratio
            )));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::Invalid("report_interval_ms must be positive".into()));
        }
        if let Some((name, range)) = self.timing.ranges().into_iter().find(|(_, r)| !r.is_valid()) {
            return Err(ConfigError::Invalid(format!(
                "timing.{name}: min {} exceeds max {}",
                range.0, range.1
            )));
        }
        Ok(())
    }

    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// `(id, seats)` pairs for `RoomRegistry::new`.
    pub fn capacities(&self) -> impl Iterator<Item = (String, usize)> + '_ {
        self.rooms.iter().map(|r| (r.id.clone(), r.seats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rooms.len(), 4);
        assert_eq!(config.visitor_capacity, 5);
        assert_eq!(config.holders.len(), 6);
        assert_eq!(config.report_interval(), Duration::from_secs(2));
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = SimulationConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn parses_full_config() {
        let config = SimulationConfig::from_toml_str(
            r#"
            visitor_capacity = 3
            holders = ["Ada"]
            holder_assignment = "pinned"
            entry_policy = "polling"
            poll_backoff_ms = 50
            max_actors = 10
            visitor_ratio = 0.5

            [[rooms]]
            id = "LAB1"
            seats = 8

            [[rooms]]
            id = "LAB2"
            seats = 4
            weight = 3

            [timing]
            occupant_stay = [10, 20]
            "#,
        )
        .unwrap();

        assert_eq!(config.rooms, vec![RoomConfig::new("LAB1", 8, 1), RoomConfig::new("LAB2", 4, 3)]);
        assert_eq!(config.holder_assignment, HolderAssignment::Pinned);
        assert_eq!(config.entry_policy, EntryPolicyKind::Polling);
        assert_eq!(config.poll_backoff(), Duration::from_millis(50));
        assert_eq!(config.timing.occupant_stay, MillisRange(10, 20));
        assert_eq!(config.timing.visitor_stay, TimingConfig::default().visitor_stay);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = SimulationConfig::from_toml_str("max_actorz = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            "rooms = []",
            "visitor_capacity = 0",
            "max_actors = 0",
            "visitor_ratio = 1.5",
            "report_interval_ms = 0",
            "[timing]\nsession_length = [10, 5]",
            "[[rooms]]\nid = \"A\"\nseats = 0",
            "[[rooms]]\nid = \"A\"\nseats = 3\nweight = 0",
        ];
        for case in cases {
            let err = SimulationConfig::from_toml_str(case).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{case}: {err}");
        }
    }

    #[test]
    fn rejects_capacities_above_semaphore_limit() {
        let err = SimulationConfig::from_toml_str(
            "[[rooms]]\nid = \"A\"\nseats = 4000000000000000000",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
        assert!(err.to_string().contains("room A"), "{err}");

        let err = SimulationConfig::from_toml_str("visitor_capacity = 4000000000000000000").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");

        let config = SimulationConfig {
            rooms: vec![RoomConfig::new("A", MAX_CAPACITY + 1, 1)],
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn polling_requires_positive_backoff() {
        let err = SimulationConfig::from_toml_str("entry_policy = \"polling\"\npoll_backoff_ms = 0")
            .unwrap_err();
        assert!(err.to_string().contains("poll_backoff_ms"), "{err}");

        let config =
            SimulationConfig::from_toml_str("entry_policy = \"blocking\"\npoll_backoff_ms = 0").unwrap();
        assert_eq!(config.poll_backoff(), Duration::ZERO);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = SimulationConfig::load("/nonexistent/classroom.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/classroom.toml"));
    }
}
