//! Room bookkeeping: id allocation, the always-on default room, per-room
//! tick threads and reaping of abandoned rooms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::game::room::{
    Room, DEFAULT_MAP_SIZE, MAX_MAP_SIZE, MAX_ROOM_CAPACITY, MIN_MAP_SIZE, TICK_INTERVAL_MS,
};
use crate::net::status::STATUS_ROOMCREATE_INVALID_PARAMETERS;
use crate::telemetry::logging;

pub const GAME_TYPE_FFA: u8 = 0;
pub const MAX_ROOMS: usize = 100;
const DEFAULT_ROOM_NAME: &str = "FFA";
const DEFAULT_ROOM_CAPACITY: u8 = 30;

pub struct RoomRegistry {
    rooms: Mutex<HashMap<u32, Arc<Room>>>,
    next_room_id: AtomicU32,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: Mutex::new(HashMap::new()),
            next_room_id: AtomicU32::new(1),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Spins up the free-for-all room every fresh session lands in. It is
    /// exempt from reaping and lives until shutdown.
    pub fn start_default_room(self: &Arc<Self>) -> Result<Arc<Room>, String> {
        self.spawn_room(
            GAME_TYPE_FFA,
            DEFAULT_ROOM_NAME.to_string(),
            DEFAULT_ROOM_CAPACITY,
            DEFAULT_MAP_SIZE,
            DEFAULT_MAP_SIZE,
            true,
        )
        .map_err(|status| format!("default room rejected with status {}", status))
    }

    /// Validates parameters and brings a new room online, tick thread
    /// included. The error side is a wire status code.
    pub fn create_room(
        self: &Arc<Self>,
        game_type: u8,
        name: String,
        capacity: u8,
        map_w: f32,
        map_h: f32,
    ) -> Result<Arc<Room>, u8> {
        self.spawn_room(game_type, name, capacity, map_w, map_h, false)
    }

    fn spawn_room(
        self: &Arc<Self>,
        game_type: u8,
        name: String,
        capacity: u8,
        map_w: f32,
        map_h: f32,
        is_default: bool,
    ) -> Result<Arc<Room>, u8> {
        if capacity == 0 || capacity > MAX_ROOM_CAPACITY {
            return Err(STATUS_ROOMCREATE_INVALID_PARAMETERS);
        }
        if !(MIN_MAP_SIZE..=MAX_MAP_SIZE).contains(&map_w)
            || !(MIN_MAP_SIZE..=MAX_MAP_SIZE).contains(&map_h)
        {
            return Err(STATUS_ROOMCREATE_INVALID_PARAMETERS);
        }
        let id = self.next_room_id.fetch_add(1, Ordering::SeqCst);
        let room = Arc::new(Room::new(
            id, game_type, name, capacity, map_w, map_h, is_default,
        ));
        if let Ok(mut rooms) = self.rooms.lock() {
            rooms.insert(id, Arc::clone(&room));
        }
        logging::log_info(&format!(
            "room {} online: \"{}\" capacity {} map {}x{}",
            id, room.name, capacity, map_w, map_h
        ));

        let registry = Arc::clone(self);
        let ticked = Arc::clone(&room);
        let handle = thread::spawn(move || {
            let cadence = Duration::from_millis(TICK_INTERVAL_MS);
            while ticked.is_running() {
                let start = Instant::now();
                if !ticked.tick() {
                    registry.remove(ticked.id);
                    ticked.stop();
                    logging::log_info(&format!("room {} reaped after sitting empty", ticked.id));
                    break;
                }
                let elapsed = start.elapsed();
                if elapsed < cadence {
                    thread::sleep(cadence - elapsed);
                }
            }
        });
        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle);
        }
        Ok(room)
    }

    pub fn get(&self, id: u32) -> Option<Arc<Room>> {
        self.rooms.lock().ok()?.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Room>> {
        match self.rooms.lock() {
            Ok(rooms) => {
                let mut list: Vec<_> = rooms.values().cloned().collect();
                list.sort_by_key(|room| room.id);
                list
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().map(|rooms| rooms.len()).unwrap_or(0)
    }

    fn remove(&self, id: u32) {
        if let Ok(mut rooms) = self.rooms.lock() {
            rooms.remove(&id);
        }
    }

    /// Stops every tick thread and joins them.
    pub fn shutdown(&self) {
        if let Ok(rooms) = self.rooms.lock() {
            for room in rooms.values() {
                room.stop();
            }
        }
        let handles = match self.handles.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::status::STATUS_ROOMCREATE_INVALID_PARAMETERS;

    #[test]
    fn over_capacity_room_is_rejected_and_not_created() {
        let registry = RoomRegistry::new();
        let result = registry.create_room(GAME_TYPE_FFA, "big".to_string(), 51, 500.0, 500.0);
        assert_eq!(result.err(), Some(STATUS_ROOMCREATE_INVALID_PARAMETERS));
        assert_eq!(registry.room_count(), 0);
        registry.shutdown();
    }

    #[test]
    fn map_size_bounds_are_enforced() {
        let registry = RoomRegistry::new();
        assert!(registry
            .create_room(GAME_TYPE_FFA, "tiny".to_string(), 10, 99.0, 500.0)
            .is_err());
        assert!(registry
            .create_room(GAME_TYPE_FFA, "huge".to_string(), 10, 500.0, 2001.0)
            .is_err());
        assert!(registry
            .create_room(GAME_TYPE_FFA, "ok".to_string(), 10, 100.0, 2000.0)
            .is_ok());
        assert_eq!(registry.room_count(), 1);
        registry.shutdown();
    }

    #[test]
    fn default_room_is_listed_and_never_reaps() {
        let registry = RoomRegistry::new();
        let room = registry.start_default_room().expect("default room");
        assert!(room.is_default);
        assert_eq!(registry.room_count(), 1);
        // an empty default room keeps ticking
        assert!(room.tick());
        registry.shutdown();
    }

    #[test]
    fn ids_are_unique_and_ascending() {
        let registry = RoomRegistry::new();
        let a = registry
            .create_room(GAME_TYPE_FFA, "a".to_string(), 5, 200.0, 200.0)
            .expect("room a");
        let b = registry
            .create_room(GAME_TYPE_FFA, "b".to_string(), 5, 200.0, 200.0)
            .expect("room b");
        assert!(b.id > a.id);
        registry.shutdown();
    }
}
