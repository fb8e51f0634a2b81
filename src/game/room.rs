//! A room is one independent arena: its own map, grid, entities and tick
//! thread. All state sits behind a single mutex; every public operation
//! locks it exactly once and the searchers/visitors below never re-acquire
//! it.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::Rng;

use crate::game::grid::{CellCoord, Grid, VisitIntent, CELL_SIZE};
use crate::game::object::{ObjectType, Position, WorldObject, TARGET_OBJECT, TARGET_PLAYER};
use crate::game::player::{Player, DEFAULT_PLAYER_SIZE};
use crate::net::opcodes::{
    SP_CHAT_MSG, SP_DESTROY_OBJECT, SP_MOVE_DIRECTION, SP_MOVE_HEARTBEAT, SP_MOVE_START,
    SP_MOVE_STOP, SP_NEW_OBJECT, SP_NEW_PLAYER, SP_NEW_WORLD, SP_OBJECT_EATEN, SP_PLAYER_EATEN,
    SP_PLAYER_EXIT, SP_STATS_RESPONSE, SP_UPDATE_WORLD,
};
use crate::net::packet::PacketWriter;
use crate::net::server::Connection;
use crate::net::status::{
    STATUS_ROOMJOIN_FAILED_ALREADY_IN_ROOM, STATUS_ROOMJOIN_FAILED_CAPACITY,
    STATUS_ROOMJOIN_FAILED_NO_SUCH_ROOM, STATUS_ROOMJOIN_OK,
};

pub const TICK_INTERVAL_MS: u64 = 100;
pub const RESPAWN_DELAY_MS: u64 = 20_000;
pub const IDLE_REAP_MS: u64 = 60_000;
pub const MAX_ROOM_CAPACITY: u8 = 50;
pub const MIN_MAP_SIZE: f32 = 100.0;
pub const MAX_MAP_SIZE: f32 = 2000.0;
pub const DEFAULT_MAP_SIZE: f32 = 500.0;

const IDLE_FOOD_INCOME: i32 = 2;
const BONUS_FOOD_INCOME: i32 = 5;
const REDUCED_INCOME_SIZE: u32 = 400;
const INCOME_CAP_SIZE: u32 = 1000;

pub struct Room {
    pub id: u32,
    pub game_type: u8,
    pub name: String,
    pub is_default: bool,
    running: AtomicBool,
    state: Mutex<RoomState>,
}

struct RoomState {
    capacity: u8,
    map_w: f32,
    map_h: f32,
    grid: Grid,
    players: Vec<Player>,
    objects: HashMap<u32, WorldObject>,
    respawns: BinaryHeap<Reverse<(u64, u32)>>,
    next_object_id: u32,
    started: Instant,
    last_tick_ms: u64,
    empty_since_ms: Option<u64>,
}

impl RoomState {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn find_player(&self, id: u32) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    fn random_spawn(&self) -> Position {
        let mut rng = rand::thread_rng();
        Position::new(
            rng.gen_range(0.0..=self.map_w),
            rng.gen_range(0.0..=self.map_h),
        )
    }
}

/// Positive gains shrink as the eater grows; losses pass through untouched.
fn tapered_income(size: u32, gain: i32) -> i32 {
    if gain <= 0 {
        return gain;
    }
    if size >= INCOME_CAP_SIZE {
        0
    } else if size >= REDUCED_INCOME_SIZE {
        gain / 2
    } else {
        gain
    }
}

fn apply_size_delta(player: &mut Player, delta: i32) {
    let next = player.size as i64 + delta as i64;
    player.size = next.max(1) as u32;
}

fn should_reap(now_ms: u64, empty_since_ms: Option<u64>, is_default: bool) -> bool {
    if is_default {
        return false;
    }
    match empty_since_ms {
        Some(since) => now_ms.saturating_sub(since) >= IDLE_REAP_MS,
        None => false,
    }
}

/// Sends one prebuilt frame to every update-enabled player within the
/// visibility square of `center`, skipping `skip` (0 skips nobody; player
/// ids start at 1).
fn send_near(grid: &Grid, players: &[Player], center: CellCoord, frame: &[u8], skip: u32) {
    grid.visit_near(center, |cell| {
        for &pid in &cell.player_ids {
            if pid == skip {
                continue;
            }
            if let Some(p) = players.iter().find(|p| p.id == pid) {
                if p.updates_enabled {
                    p.conn.send_frame(frame);
                }
            }
        }
    });
}

fn spawn_object(state: &mut RoomState, object_type: ObjectType, pos: Position) {
    state.next_object_id += 1;
    let id = state.next_object_id;
    let coord = state.grid.cell_of(pos);
    state.grid.add_object(id, coord);
    state.objects.insert(id, WorldObject::new(id, object_type, pos));
}

fn generate_content(state: &mut RoomState) {
    let mut rng = rand::thread_rng();
    for cy in 0..state.grid.height() {
        for cx in 0..state.grid.width() {
            let base_x = cx as f32 * CELL_SIZE;
            let base_y = cy as f32 * CELL_SIZE;
            let roll = |state: &mut RoomState, ty: ObjectType, rng: &mut rand::rngs::ThreadRng| {
                let pos = Position::new(
                    (base_x + rng.gen_range(0.0..CELL_SIZE)).min(state.map_w),
                    (base_y + rng.gen_range(0.0..CELL_SIZE)).min(state.map_h),
                );
                spawn_object(state, ty, pos);
            };
            for _ in 0..rng.gen_range(0..=2) {
                roll(state, ObjectType::IdleFood, &mut rng);
            }
            if rng.gen_range(0..100) < 10 {
                roll(state, ObjectType::BonusFood, &mut rng);
            }
            if rng.gen_range(0..100) < 6 {
                roll(state, ObjectType::Trap, &mut rng);
            }
        }
    }
}

/// Keeps grid membership in sync with the player's position and runs the
/// relocation broadcasts when a cell boundary was crossed: destroy to cells
/// that lost sight, create to cells that gained it, and a world update to
/// the mover for the newly visible strip.
fn relocate_player(state: &mut RoomState, idx: usize) {
    let pid = state.players[idx].id;
    let old = state.players[idx].cell;
    let new = state.grid.cell_of(state.players[idx].pos);
    if new == old {
        return;
    }
    state.grid.remove_player(pid, old);
    state.grid.add_player(pid, new);
    state.players[idx].cell = new;

    let mut destroy = PacketWriter::new(SP_DESTROY_OBJECT);
    destroy.write_u8(TARGET_PLAYER);
    destroy.write_u32(pid);
    let destroy_frame = destroy.frame();

    let mut create = PacketWriter::new(SP_NEW_PLAYER);
    state.players[idx].write_create_block(&mut create);
    let create_frame = create.frame();

    let grid = &state.grid;
    let players = &state.players;
    let objects = &state.objects;

    grid.visit_visibility_change(old, new, |cell, intent| {
        let frame = match intent {
            VisitIntent::Leave => &destroy_frame,
            VisitIntent::Enter => &create_frame,
        };
        for &other in &cell.player_ids {
            if other == pid {
                continue;
            }
            if let Some(p) = players.iter().find(|p| p.id == other) {
                if p.updates_enabled {
                    p.conn.send_frame(frame);
                }
            }
        }
    });

    let mut update = PacketWriter::new(SP_UPDATE_WORLD);
    let pcount_at = update.reserve_u32();
    let mut pcount = 0u32;
    grid.visit_discovery(old, new, |cell| {
        for &other in &cell.player_ids {
            if other == pid {
                continue;
            }
            if let Some(p) = players.iter().find(|p| p.id == other) {
                p.write_create_block(&mut update);
                pcount += 1;
            }
        }
    });
    update.write_u32_at(pcount, pcount_at);
    let ocount_at = update.reserve_u32();
    let mut ocount = 0u32;
    grid.visit_discovery(old, new, |cell| {
        for &oid in &cell.object_ids {
            if let Some(obj) = objects.get(&oid) {
                if !obj.is_consumed() {
                    obj.write_create_block(&mut update);
                    ocount += 1;
                }
            }
        }
    });
    update.write_u32_at(ocount, ocount_at);

    let mover = &players[idx];
    if mover.updates_enabled && (pcount > 0 || ocount > 0) {
        mover.conn.send(&update);
    }
}

fn respawn_object(state: &mut RoomState, oid: u32) {
    let pos = match state.objects.get_mut(&oid) {
        Some(obj) => {
            obj.respawn_at = None;
            obj.pos
        }
        None => return,
    };
    let coord = state.grid.cell_of(pos);
    state.grid.add_object(oid, coord);
    let mut pkt = PacketWriter::new(SP_NEW_OBJECT);
    if let Some(obj) = state.objects.get(&oid) {
        obj.write_create_block(&mut pkt);
    }
    let frame = pkt.frame();
    send_near(&state.grid, &state.players, coord, &frame, 0);
}

fn eat_object(state: &mut RoomState, eater_idx: usize, target_id: u32) {
    let eater_cell = state.players[eater_idx].cell;
    let oid = if target_id == 0 {
        let eater_pos = state.players[eater_idx].pos;
        let grid = &state.grid;
        let objects = &state.objects;
        let mut best: Option<(f32, u32)> = None;
        grid.visit_near(eater_cell, |cell| {
            for &oid in &cell.object_ids {
                if let Some(obj) = objects.get(&oid) {
                    if obj.is_consumed() {
                        continue;
                    }
                    let d = eater_pos.distance_manhattan(&obj.pos);
                    if best.map_or(true, |(bd, _)| d < bd) {
                        best = Some((d, oid));
                    }
                }
            }
        });
        match best {
            Some((_, id)) => id,
            None => return,
        }
    } else {
        target_id
    };

    let (obj_type, obj_cell) = match state.objects.get(&oid) {
        Some(obj) if !obj.is_consumed() => (obj.object_type, state.grid.cell_of(obj.pos)),
        _ => return,
    };
    if !eater_cell.sees(obj_cell) {
        return;
    }

    let raw = match obj_type {
        ObjectType::IdleFood => IDLE_FOOD_INCOME,
        ObjectType::BonusFood => BONUS_FOOD_INCOME,
        ObjectType::Trap => -((state.players[eater_idx].size / 2) as i32),
        ObjectType::Player => return,
    };
    let delta = tapered_income(state.players[eater_idx].size, raw);
    apply_size_delta(&mut state.players[eater_idx], delta);

    let now = state.now_ms();
    if let Some(obj) = state.objects.get_mut(&oid) {
        obj.respawn_at = Some(now + RESPAWN_DELAY_MS);
    }
    state.grid.remove_object(oid, obj_cell);
    state.respawns.push(Reverse((now + RESPAWN_DELAY_MS, oid)));

    let mut pkt = PacketWriter::new(SP_OBJECT_EATEN);
    pkt.write_u32(oid);
    pkt.write_u32(state.players[eater_idx].id);
    pkt.write_i32(delta);
    let frame = pkt.frame();
    send_near(&state.grid, &state.players, obj_cell, &frame, 0);
}

fn eat_player(state: &mut RoomState, eater_idx: usize, target_id: u32) {
    let eater_id = state.players[eater_idx].id;
    let eater_cell = state.players[eater_idx].cell;
    let victim_idx = if target_id == 0 {
        let eater_pos = state.players[eater_idx].pos;
        let grid = &state.grid;
        let players = &state.players;
        // exact distance, the bigger candidate winning a tie
        let mut best: Option<(f32, u32, usize)> = None;
        grid.visit_near(eater_cell, |cell| {
            for &pid in &cell.player_ids {
                if pid == eater_id {
                    continue;
                }
                if let Some((i, p)) = players.iter().enumerate().find(|(_, p)| p.id == pid) {
                    if p.dead {
                        continue;
                    }
                    let d = eater_pos.distance_exact(&p.pos);
                    let better = match best {
                        None => true,
                        Some((bd, bsize, _)) => d < bd || (d == bd && p.size > bsize),
                    };
                    if better {
                        best = Some((d, p.size, i));
                    }
                }
            }
        });
        match best {
            Some((_, _, i)) => i,
            None => return,
        }
    } else {
        match state.find_player(target_id) {
            Some(i) if i != eater_idx => i,
            _ => return,
        }
    };
    if state.players[victim_idx].dead {
        return;
    }
    if !eater_cell.sees(state.players[victim_idx].cell) {
        return;
    }

    // The larger party eats regardless of who asked, and only past a 5/4
    // size advantage.
    let esize = state.players[eater_idx].size as u64;
    let vsize = state.players[victim_idx].size as u64;
    let (winner_idx, loser_idx) = if esize * 4 > vsize * 5 {
        (eater_idx, victim_idx)
    } else if vsize * 4 > esize * 5 {
        (victim_idx, eater_idx)
    } else {
        return;
    };

    let gain = (state.players[loser_idx].size as f32 * 0.66).floor() as i32;
    let delta = tapered_income(state.players[winner_idx].size, gain);
    apply_size_delta(&mut state.players[winner_idx], delta);

    let loser_id = state.players[loser_idx].id;
    let loser_cell = state.players[loser_idx].cell;
    state.players[loser_idx].dead = true;
    state.players[loser_idx].moving = false;
    state.grid.remove_player(loser_id, loser_cell);

    let mut pkt = PacketWriter::new(SP_PLAYER_EATEN);
    pkt.write_u32(loser_id);
    pkt.write_u32(state.players[winner_idx].id);
    pkt.write_i32(delta);
    let frame = pkt.frame();
    send_near(&state.grid, &state.players, loser_cell, &frame, 0);
    // the loser just left the grid, deliver the verdict directly
    if state.players[loser_idx].updates_enabled {
        state.players[loser_idx].conn.send_frame(&frame);
    }
}

impl Room {
    pub fn new(
        id: u32,
        game_type: u8,
        name: String,
        capacity: u8,
        map_w: f32,
        map_h: f32,
        is_default: bool,
    ) -> Self {
        let mut state = RoomState {
            capacity,
            map_w,
            map_h,
            grid: Grid::new(map_w, map_h),
            players: Vec::new(),
            objects: HashMap::new(),
            respawns: BinaryHeap::new(),
            next_object_id: 0,
            started: Instant::now(),
            last_tick_ms: 0,
            empty_since_ms: Some(0),
        };
        generate_content(&mut state);
        Self {
            id,
            game_type,
            name,
            is_default,
            running: AtomicBool::new(true),
            state: Mutex::new(state),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// (players, capacity) snapshot for the room list.
    pub fn occupancy(&self) -> (u8, u8) {
        match self.state.lock() {
            Ok(state) => (state.players.len() as u8, state.capacity),
            Err(_) => (0, 0),
        }
    }

    pub fn join(&self, player_id: u32, name: &str, color: u32, conn: Arc<Connection>) -> u8 {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return STATUS_ROOMJOIN_FAILED_NO_SUCH_ROOM,
        };
        if state.find_player(player_id).is_some() {
            return STATUS_ROOMJOIN_FAILED_ALREADY_IN_ROOM;
        }
        if state.players.len() >= state.capacity as usize {
            return STATUS_ROOMJOIN_FAILED_CAPACITY;
        }
        let pos = state.random_spawn();
        let cell = state.grid.cell_of(pos);
        let player = Player::new(player_id, name.to_string(), color, pos, cell, conn);

        // announce before inserting so the newcomer is not a recipient
        let mut pkt = PacketWriter::new(SP_NEW_PLAYER);
        player.write_create_block(&mut pkt);
        let frame = pkt.frame();
        send_near(&state.grid, &state.players, cell, &frame, player_id);

        state.grid.add_player(player_id, cell);
        state.players.push(player);
        state.empty_since_ms = None;
        STATUS_ROOMJOIN_OK
    }

    /// Removes a player and broadcasts the exit to its last neighborhood.
    /// Returns false when the player was not in this room.
    pub fn remove_player(&self, player_id: u32, reason: u8) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        let Some(idx) = state.find_player(player_id) else {
            return false;
        };
        let cell = state.players[idx].cell;
        if !state.players[idx].dead {
            state.grid.remove_player(player_id, cell);
        }
        state.players.remove(idx);

        let mut pkt = PacketWriter::new(SP_PLAYER_EXIT);
        pkt.write_u32(player_id);
        pkt.write_u8(reason);
        let frame = pkt.frame();
        send_near(&state.grid, &state.players, cell, &frame, player_id);

        if state.players.is_empty() {
            let now = state.now_ms();
            state.empty_since_ms = Some(now);
        }
        true
    }

    /// Builds and sends the full world snapshot to one player. A dead
    /// player is revived at a fresh spawn first when `reinit` is set,
    /// otherwise it gets nothing.
    pub fn send_new_world(&self, player_id: u32, reinit: bool) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(idx) = state.find_player(player_id) else {
            return;
        };
        if state.players[idx].dead {
            if !reinit {
                return;
            }
            let pos = state.random_spawn();
            let cell = state.grid.cell_of(pos);
            {
                let p = &mut state.players[idx];
                p.dead = false;
                p.size = DEFAULT_PLAYER_SIZE;
                p.pos = pos;
                p.cell = cell;
                p.moving = false;
            }
            let mut pkt = PacketWriter::new(SP_NEW_PLAYER);
            state.players[idx].write_create_block(&mut pkt);
            let frame = pkt.frame();
            send_near(&state.grid, &state.players, cell, &frame, player_id);
            state.grid.add_player(player_id, cell);
        }
        state.players[idx].updates_enabled = true;

        let mut w = PacketWriter::new(SP_NEW_WORLD);
        w.write_f32(state.map_w);
        w.write_f32(state.map_h);
        state.players[idx].write_create_block(&mut w);
        let center = state.players[idx].cell;
        let grid = &state.grid;
        let players = &state.players;
        let objects = &state.objects;

        let pcount_at = w.reserve_u32();
        let mut pcount = 0u32;
        grid.visit_near(center, |cell| {
            for &other in &cell.player_ids {
                if other == player_id {
                    continue;
                }
                if let Some(p) = players.iter().find(|p| p.id == other) {
                    p.write_create_block(&mut w);
                    pcount += 1;
                }
            }
        });
        w.write_u32_at(pcount, pcount_at);

        let ocount_at = w.reserve_u32();
        let mut ocount = 0u32;
        grid.visit_near(center, |cell| {
            for &oid in &cell.object_ids {
                if let Some(obj) = objects.get(&oid) {
                    if !obj.is_consumed() {
                        obj.write_create_block(&mut w);
                        ocount += 1;
                    }
                }
            }
        });
        w.write_u32_at(ocount, ocount_at);

        players[idx].conn.send(&w);
    }

    pub fn move_start(&self, player_id: u32, pos: Position, angle: f32) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(idx) = state.find_player(player_id) else {
            return;
        };
        if state.players[idx].dead {
            return;
        }
        let clamped = Position::new(pos.x.clamp(0.0, state.map_w), pos.y.clamp(0.0, state.map_h));
        state.players[idx].pos = clamped;
        state.players[idx].move_angle = angle;
        state.players[idx].moving = true;
        relocate_player(&mut state, idx);

        let mut pkt = PacketWriter::new(SP_MOVE_START);
        pkt.write_u32(player_id);
        pkt.write_f32(clamped.x);
        pkt.write_f32(clamped.y);
        pkt.write_f32(angle);
        let frame = pkt.frame();
        let center = state.players[idx].cell;
        send_near(&state.grid, &state.players, center, &frame, player_id);
    }

    pub fn move_stop(&self, player_id: u32, pos: Position) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(idx) = state.find_player(player_id) else {
            return;
        };
        if state.players[idx].dead {
            return;
        }
        let clamped = Position::new(pos.x.clamp(0.0, state.map_w), pos.y.clamp(0.0, state.map_h));
        state.players[idx].pos = clamped;
        state.players[idx].moving = false;
        relocate_player(&mut state, idx);

        let mut pkt = PacketWriter::new(SP_MOVE_STOP);
        pkt.write_u32(player_id);
        pkt.write_f32(clamped.x);
        pkt.write_f32(clamped.y);
        let frame = pkt.frame();
        let center = state.players[idx].cell;
        send_near(&state.grid, &state.players, center, &frame, player_id);
    }

    /// Position report from a moving client. Broadcast to the near cells
    /// whether or not a boundary was crossed.
    pub fn move_heartbeat(&self, player_id: u32, pos: Position) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(idx) = state.find_player(player_id) else {
            return;
        };
        if state.players[idx].dead {
            return;
        }
        let clamped = Position::new(pos.x.clamp(0.0, state.map_w), pos.y.clamp(0.0, state.map_h));
        state.players[idx].pos = clamped;
        relocate_player(&mut state, idx);

        let mut pkt = PacketWriter::new(SP_MOVE_HEARTBEAT);
        pkt.write_u32(player_id);
        pkt.write_f32(clamped.x);
        pkt.write_f32(clamped.y);
        let frame = pkt.frame();
        let center = state.players[idx].cell;
        send_near(&state.grid, &state.players, center, &frame, player_id);
    }

    pub fn move_direction(&self, player_id: u32, pos: Position, angle: f32) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(idx) = state.find_player(player_id) else {
            return;
        };
        if state.players[idx].dead {
            return;
        }
        let clamped = Position::new(pos.x.clamp(0.0, state.map_w), pos.y.clamp(0.0, state.map_h));
        state.players[idx].pos = clamped;
        state.players[idx].move_angle = angle;
        relocate_player(&mut state, idx);

        let mut pkt = PacketWriter::new(SP_MOVE_DIRECTION);
        pkt.write_u32(player_id);
        pkt.write_f32(clamped.x);
        pkt.write_f32(clamped.y);
        pkt.write_f32(angle);
        let frame = pkt.frame();
        let center = state.players[idx].cell;
        send_near(&state.grid, &state.players, center, &frame, player_id);
    }

    pub fn eat_attempt(&self, player_id: u32, target_type: u8, target_id: u32) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(idx) = state.find_player(player_id) else {
            return;
        };
        if state.players[idx].dead {
            return;
        }
        match target_type {
            TARGET_OBJECT => eat_object(&mut state, idx, target_id),
            TARGET_PLAYER => eat_player(&mut state, idx, target_id),
            _ => {}
        }
    }

    pub fn chat(&self, player_id: u32, message: &str) {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let Some(idx) = state.find_player(player_id) else {
            return;
        };
        let mut pkt = PacketWriter::new(SP_CHAT_MSG);
        pkt.write_u32(player_id);
        pkt.write_string(&state.players[idx].name);
        pkt.write_string(message);
        let frame = pkt.frame();
        for p in &state.players {
            if p.updates_enabled {
                p.conn.send_frame(&frame);
            }
        }
    }

    pub fn stats_packet(&self) -> PacketWriter {
        let mut w = PacketWriter::new(SP_STATS_RESPONSE);
        w.write_u32(self.id);
        w.write_u8(self.game_type);
        match self.state.lock() {
            Ok(state) => {
                w.write_u8(state.players.len() as u8);
                w.write_u8(state.capacity);
                w.write_u32(state.objects.len() as u32);
                match state.players.iter().filter(|p| !p.dead).max_by_key(|p| p.size) {
                    Some(top) => {
                        w.write_u32(top.size);
                        w.write_string(&top.name);
                    }
                    None => {
                        w.write_u32(0);
                        w.write_string("");
                    }
                }
            }
            Err(_) => {
                w.write_u8(0);
                w.write_u8(0);
                w.write_u32(0);
                w.write_u32(0);
                w.write_string("");
            }
        }
        w
    }

    /// Re-points a player's outbound connection after a session restore
    /// and clears its movement so the new client starts from a known state.
    pub fn rebind_connection(&self, player_id: u32, conn: Arc<Connection>) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        let Some(idx) = state.find_player(player_id) else {
            return false;
        };
        state.players[idx].conn = conn;
        state.players[idx].moving = false;
        true
    }

    /// One simulation step. Returns false once the room is empty long
    /// enough to be reaped (never for the default room).
    pub fn tick(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        let now = state.now_ms();
        let diff = now.saturating_sub(state.last_tick_ms);
        state.last_tick_ms = now;

        for i in 0..state.players.len() {
            let (x, y, skip) = {
                let p = &state.players[i];
                if p.dead || !p.moving {
                    (0.0, 0.0, true)
                } else {
                    let step = p.speed() * diff as f32;
                    (
                        (p.pos.x + p.move_angle.cos() * step).clamp(0.0, state.map_w),
                        (p.pos.y + p.move_angle.sin() * step).clamp(0.0, state.map_h),
                        false,
                    )
                }
            };
            if skip {
                continue;
            }
            state.players[i].pos = Position::new(x, y);
            relocate_player(&mut state, i);

            // keep the neighborhood current between client packets
            let pid = state.players[i].id;
            let mut pkt = PacketWriter::new(SP_MOVE_HEARTBEAT);
            pkt.write_u32(pid);
            pkt.write_f32(x);
            pkt.write_f32(y);
            let frame = pkt.frame();
            let center = state.players[i].cell;
            send_near(&state.grid, &state.players, center, &frame, pid);
        }

        while let Some(&Reverse((due, oid))) = state.respawns.peek() {
            if due > now {
                break;
            }
            state.respawns.pop();
            respawn_object(&mut state, oid);
        }

        if state.players.is_empty() && state.empty_since_ms.is_none() {
            state.empty_since_ms = Some(now);
        }
        !should_reap(now, state.empty_since_ms, self.is_default)
    }
}
