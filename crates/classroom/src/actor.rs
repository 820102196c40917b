//! Actor identities.

use serde::{Deserialize, Serialize};

/// The kind of party entering a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Occupant,
    Visitor,
    SessionHolder,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Occupant => "occupant",
            Self::Visitor => "visitor",
            Self::SessionHolder => "session holder",
        }
    }
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an actor. Session holders carry their name; spawned
/// occupants and visitors get a generated id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Mint a unique id, e.g. `occupant-1b4e28ba`.
    pub fn anonymous(kind: ActorKind) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let prefix = match kind {
            ActorKind::Occupant => "occupant",
            ActorKind::Visitor => "visitor",
            ActorKind::SessionHolder => "holder",
        };
        Self(format!("{prefix}-{}", &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_ids_are_prefixed_and_unique() {
        let a = ActorId::anonymous(ActorKind::Occupant);
        let b = ActorId::anonymous(ActorKind::Occupant);
        assert!(a.as_str().starts_with("occupant-"));
        assert_eq!(a.as_str().len(), "occupant-".len() + 8);
        assert_ne!(a, b);

        let v = ActorId::anonymous(ActorKind::Visitor);
        assert!(v.as_str().starts_with("visitor-"));
    }

    #[test]
    fn named_id_displays_name() {
        let id = ActorId::named("Osama");
        assert_eq!(id.to_string(), "Osama");
    }
}
