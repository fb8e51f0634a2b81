use crate::net::packet::PacketWriter;

/// Target tag carried in eat/destroy packets.
pub const TARGET_PLAYER: u8 = 0;
pub const TARGET_OBJECT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_exact(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Cheap prefilter used by the nearest-target searchers.
    pub fn distance_manhattan(&self, other: &Position) -> f32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Player = 1,
    IdleFood = 2,
    BonusFood = 3,
    Trap = 4,
}

impl ObjectType {
    pub fn wire_id(self) -> u8 {
        self as u8
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Player),
            2 => Some(Self::IdleFood),
            3 => Some(Self::BonusFood),
            4 => Some(Self::Trap),
            _ => None,
        }
    }
}

/// A non-player entity on the map. Consumed food keeps its record with
/// `respawn_at` set until the room tick brings it back at the same spot.
#[derive(Debug, Clone)]
pub struct WorldObject {
    pub id: u32,
    pub object_type: ObjectType,
    pub pos: Position,
    pub respawn_at: Option<u64>,
}

impl WorldObject {
    pub fn new(id: u32, object_type: ObjectType, pos: Position) -> Self {
        Self {
            id,
            object_type,
            pos,
            respawn_at: None,
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.respawn_at.is_some()
    }

    /// Wire create block: `u32 id, f32 x, f32 y, u8 type, u32 param`.
    pub fn write_create_block(&self, writer: &mut PacketWriter) {
        writer.write_u32(self.id);
        writer.write_f32(self.pos.x);
        writer.write_f32(self.pos.y);
        writer.write_u8(self.object_type.wire_id());
        writer.write_u32(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packet::PacketReader;

    #[test]
    fn distances() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(a.distance_exact(&b), 5.0);
        assert_eq!(a.distance_manhattan(&b), 7.0);
    }

    #[test]
    fn object_type_wire_ids_round_trip() {
        for ty in [
            ObjectType::Player,
            ObjectType::IdleFood,
            ObjectType::BonusFood,
            ObjectType::Trap,
        ] {
            assert_eq!(ObjectType::from_wire(ty.wire_id()), Some(ty));
        }
        assert_eq!(ObjectType::from_wire(0), None);
        assert_eq!(ObjectType::from_wire(5), None);
    }

    #[test]
    fn create_block_layout() {
        let obj = WorldObject::new(7, ObjectType::BonusFood, Position::new(12.5, -3.0));
        let mut writer = PacketWriter::new(0x1c);
        obj.write_create_block(&mut writer);
        let mut reader = PacketReader::new(writer.payload());
        assert_eq!(reader.read_u32(), Ok(7));
        assert_eq!(reader.read_f32().expect("x"), 12.5);
        assert_eq!(reader.read_f32().expect("y"), -3.0);
        assert_eq!(reader.read_u8(), Ok(3));
        assert_eq!(reader.read_u32(), Ok(0));
        assert_eq!(reader.remaining(), 0);
    }
}
