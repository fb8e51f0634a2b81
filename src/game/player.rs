use std::sync::Arc;

use crate::game::grid::CellCoord;
use crate::game::object::Position;
use crate::net::packet::PacketWriter;
use crate::net::server::Connection;

pub const DEFAULT_PLAYER_SIZE: u32 = 10;

/// Movement speed in map units per millisecond. Bigger players crawl.
pub fn speed_for_size(size: u32) -> f32 {
    if size < 20 {
        0.050
    } else if size < 50 {
        0.040
    } else if size < 120 {
        0.030
    } else if size < 300 {
        0.020
    } else {
        0.012
    }
}

/// A player entity inside a room. Dead players keep their list slot (the
/// session may revive them) but are absent from the grid.
pub struct Player {
    pub id: u32,
    pub name: String,
    pub color: u32,
    pub pos: Position,
    pub cell: CellCoord,
    pub size: u32,
    pub moving: bool,
    pub move_angle: f32,
    pub dead: bool,
    /// Set once the client has asked for the world; nothing is broadcast
    /// to a player still loading.
    pub updates_enabled: bool,
    pub conn: Arc<Connection>,
}

impl Player {
    pub fn new(
        id: u32,
        name: String,
        color: u32,
        pos: Position,
        cell: CellCoord,
        conn: Arc<Connection>,
    ) -> Self {
        Self {
            id,
            name,
            color,
            pos,
            cell,
            size: DEFAULT_PLAYER_SIZE,
            moving: false,
            move_angle: 0.0,
            dead: false,
            updates_enabled: false,
            conn,
        }
    }

    pub fn speed(&self) -> f32 {
        speed_for_size(self.size)
    }

    /// Wire create block: `u32 id, f32 x, f32 y, u32 size, u8 moving,
    /// f32 angle, u8 dead, u32 color, string name`.
    pub fn write_create_block(&self, writer: &mut PacketWriter) {
        writer.write_u32(self.id);
        writer.write_f32(self.pos.x);
        writer.write_f32(self.pos.y);
        writer.write_u32(self.size);
        writer.write_u8(u8::from(self.moving));
        writer.write_f32(self.move_angle);
        writer.write_u8(u8::from(self.dead));
        writer.write_u32(self.color);
        writer.write_string(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_non_increasing_across_boundaries() {
        let sizes = [1, 19, 20, 49, 50, 119, 120, 299, 300, 1000, 5000];
        let mut last = f32::MAX;
        for size in sizes {
            let speed = speed_for_size(size);
            assert!(
                speed <= last,
                "speed grew at size {}: {} > {}",
                size,
                speed,
                last
            );
            last = speed;
        }
    }

    #[test]
    fn speed_bands() {
        assert_eq!(speed_for_size(10), 0.050);
        assert_eq!(speed_for_size(12), 0.050);
        assert_eq!(speed_for_size(20), 0.040);
        assert_eq!(speed_for_size(50), 0.030);
        assert_eq!(speed_for_size(120), 0.020);
        assert_eq!(speed_for_size(300), 0.012);
    }

    #[test]
    fn default_size_plus_idle_food_keeps_top_speed() {
        let size = DEFAULT_PLAYER_SIZE + 2;
        assert_eq!(size, 12);
        assert_eq!(speed_for_size(size), 0.050);
    }
}
