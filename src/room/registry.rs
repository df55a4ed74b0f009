//! Registry of live rooms

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tracing::info;

use crate::store::RoomRecord;

use super::{Room, RoomId, RoomInfo};

/// Bytes of randomness behind a room id (hex-encoded to 8 characters)
const ROOM_ID_BYTES: usize = 4;

/// All live rooms, keyed by id
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create an empty room under a fresh id. A blank name falls back to
    /// the id.
    pub fn create(&self, name: String, password: String) -> Arc<Room> {
        let mut rng = rand::thread_rng();
        loop {
            let id = hex::encode(rng.gen::<[u8; ROOM_ID_BYTES]>());
            if let Entry::Vacant(slot) = self.rooms.entry(id.clone()) {
                let name = if name.trim().is_empty() { id.clone() } else { name };
                let room = Arc::new(Room::new(id, name, password));
                slot.insert(room.clone());
                return room;
            }
        }
    }

    /// Register a persisted room under its saved id
    pub fn restore(&self, record: RoomRecord) -> Arc<Room> {
        let room = Arc::new(Room::restore(record));
        self.rooms.insert(room.id().to_string(), room.clone());
        room
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| r.clone())
    }

    /// Lobby listing, sorted by name then id
    pub fn list(&self) -> Vec<RoomInfo> {
        let rooms: Vec<Arc<Room>> = self.rooms.iter().map(|r| r.value().clone()).collect();
        let mut infos: Vec<RoomInfo> = rooms.iter().map(|room| room.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    /// Remove every room that has been empty for at least `ttl`. Each room
    /// is closed under its own lock before removal, so a concurrent join
    /// either lands first (and the room stays) or fails.
    pub fn evict_idle(&self, ttl: Duration) -> Vec<RoomId> {
        let now = Instant::now();
        let candidates: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|r| r.value().is_empty())
            .map(|r| r.key().clone())
            .collect();

        let evicted: Vec<RoomId> = candidates
            .into_iter()
            .filter(|id| {
                self.rooms
                    .remove_if(id, |_, room| room.close_if_idle(ttl, now))
                    .is_some()
            })
            .collect();

        for room_id in &evicted {
            info!(room_id = %room_id, "Evicted idle room");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::UserRegistry;

    #[test]
    fn created_rooms_get_unique_hex_ids() {
        let registry = RoomRegistry::new();
        let a = registry.create("a".into(), String::new());
        let b = registry.create("b".into(), String::new());

        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().len(), 8);
        assert!(a.id().chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert!(Arc::ptr_eq(&registry.get(a.id()).unwrap(), &a));
    }

    #[test]
    fn blank_name_falls_back_to_id() {
        let registry = RoomRegistry::new();
        let room = registry.create("  ".into(), String::new());
        assert_eq!(room.info().name, room.id());
    }

    #[test]
    fn list_is_sorted_by_name_then_id() {
        let registry = RoomRegistry::new();
        registry.create("zeta".into(), String::new());
        registry.create("alpha".into(), "pw".into());
        registry.create("alpha".into(), String::new());

        let list = registry.list();
        let names: Vec<&str> = list.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["alpha", "alpha", "zeta"]);
        assert!(list[0].id < list[1].id);
        assert_eq!(list.iter().filter(|r| r.has_password).count(), 1);
    }

    #[test]
    fn eviction_skips_occupied_and_fresh_rooms() {
        let registry = RoomRegistry::new();
        let users = UserRegistry::new();
        let occupied = registry.create("busy".into(), String::new());
        occupied.add_user(&users.register()).unwrap();
        let idle = registry.create("idle".into(), String::new());

        assert!(registry.evict_idle(Duration::from_secs(3600)).is_empty());

        let evicted = registry.evict_idle(Duration::ZERO);
        assert_eq!(evicted, vec![idle.id().to_string()]);
        assert!(registry.get(idle.id()).is_none());
        assert!(registry.get(occupied.id()).is_some());
        assert!(idle.add_user(&users.register()).is_err());
    }
}
