//! Immutable room id → coordinator mapping, built once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::actor::ActorKind;
use crate::coordinator::ClassroomCoordinator;
use crate::error::RoomError;
use crate::snapshot::StatusRecord;

/// Default visitor quota per room.
pub const DEFAULT_VISITOR_CAPACITY: usize = 5;

/// Largest seat or visitor capacity a room can have.
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

fn capacity_in_range(capacity: usize) -> bool {
    (1..=MAX_CAPACITY).contains(&capacity)
}

/// Fixed set of rooms. Read-only after construction, so lookups need no lock.
#[derive(Debug)]
pub struct RoomRegistry {
    rooms: BTreeMap<String, Arc<ClassroomCoordinator>>,
}

impl RoomRegistry {
    /// Build one coordinator per `(id, seat_capacity)` entry.
    pub fn new<I, S>(capacities: I, visitor_capacity: usize) -> Result<Self, RoomError>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut rooms = BTreeMap::new();
        for (id, seats) in capacities {
            let id = id.into();
            if !capacity_in_range(seats) {
                return Err(RoomError::InvalidCapacity {
                    room: id,
                    party: ActorKind::Occupant,
                });
            }
            if !capacity_in_range(visitor_capacity) {
                return Err(RoomError::InvalidCapacity {
                    room: id,
                    party: ActorKind::Visitor,
                });
            }
            if rooms.contains_key(&id) {
                return Err(RoomError::DuplicateRoom(id));
            }

            let coordinator = ClassroomCoordinator::new(id.clone(), seats, visitor_capacity);
            rooms.insert(id, Arc::new(coordinator));
        }

        tracing::debug!(rooms = rooms.len(), visitor_capacity, "Room registry built");
        Ok(Self { rooms })
    }

    pub fn get(&self, id: &str) -> Result<&Arc<ClassroomCoordinator>, RoomError> {
        self.rooms
            .get(id)
            .ok_or_else(|| RoomError::UnknownRoom(id.to_string()))
    }

    /// Room ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClassroomCoordinator>> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// One snapshot per room. Each record is consistent on its own; records
    /// of different rooms are taken one after another.
    pub fn snapshot_all(&self) -> Vec<StatusRecord> {
        self.rooms.values().map(|room| room.snapshot()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_rooms_in_id_order() {
        let registry = RoomRegistry::new(
            [("W202", 60), ("J5101", 30), ("W101", 20)],
            DEFAULT_VISITOR_CAPACITY,
        )
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.ids().collect::<Vec<_>>(), ["J5101", "W101", "W202"]);

        let room = registry.get("W101").unwrap();
        assert_eq!(room.seat_capacity(), 20);
        assert_eq!(room.visitor_capacity(), 5);
    }

    #[test]
    fn unknown_room_is_an_error() {
        let registry = RoomRegistry::new([("W101", 20)], 5).unwrap();
        let err = registry.get("X999").unwrap_err();
        assert_eq!(err, RoomError::UnknownRoom("X999".to_string()));
    }

    #[test]
    fn rejects_zero_capacity_and_duplicates() {
        assert!(matches!(
            RoomRegistry::new([("W101", 0)], 5),
            Err(RoomError::InvalidCapacity {
                party: ActorKind::Occupant,
                ..
            })
        ));
        assert!(matches!(
            RoomRegistry::new([("W101", 10)], 0),
            Err(RoomError::InvalidCapacity {
                party: ActorKind::Visitor,
                ..
            })
        ));
        assert_eq!(
            RoomRegistry::new([("W101", 10), ("W101", 12)], 5).unwrap_err(),
            RoomError::DuplicateRoom("W101".to_string())
        );
    }

    #[test]
    fn rejects_capacity_above_semaphore_limit() {
        assert!(matches!(
            RoomRegistry::new([("W101", MAX_CAPACITY + 1)], 5),
            Err(RoomError::InvalidCapacity {
                party: ActorKind::Occupant,
                ..
            })
        ));
        assert!(matches!(
            RoomRegistry::new([("W101", 10)], usize::MAX / 2),
            Err(RoomError::InvalidCapacity {
                party: ActorKind::Visitor,
                ..
            })
        ));

        let registry = RoomRegistry::new([("W101", MAX_CAPACITY)], 5).unwrap();
        assert_eq!(registry.get("W101").unwrap().available_seats(), MAX_CAPACITY);
    }

    #[test]
    fn snapshot_all_covers_every_room() {
        let registry = RoomRegistry::new([("A", 1), ("B", 2)], 5).unwrap();
        let records = registry.snapshot_all();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(StatusRecord::is_idle_and_empty));
        assert_eq!(records[1].seat_capacity, 2);
    }

    #[test]
    fn shared_handles_point_at_same_room() {
        let registry = RoomRegistry::new([("A", 1)], 5).unwrap();
        let a = Arc::clone(registry.get("A").unwrap());
        let b = registry.get("A").unwrap();
        assert!(Arc::ptr_eq(&a, b));
    }
}
