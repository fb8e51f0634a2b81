//! Opcode numbering and the dispatch table.
//!
//! Opcodes are wire-visible: new ones go at the end, existing numbers never
//! change. The table below doubles as the permission matrix - each entry
//! names the handler and the connection states in which the opcode is legal.
//! Server-to-client opcodes carry an empty mask so a client sending them
//! back earns a violation.

use crate::net::handlers;
use crate::net::packet::{PacketReader, ReadError};
use crate::net::server::Network;
use crate::net::session::{STATE_ANY, STATE_AUTH, STATE_GAME, STATE_LOBBY, STATE_NONE};

pub const OPCODE_NONE: u16 = 0x00;
pub const CP_LOGIN: u16 = 0x01;
pub const SP_LOGIN_RESPONSE: u16 = 0x02;
pub const CP_REGISTER: u16 = 0x03;
pub const SP_REGISTER_RESPONSE: u16 = 0x04;
pub const CP_ROOM_LIST: u16 = 0x05;
pub const SP_ROOM_LIST_RESPONSE: u16 = 0x06;
pub const CP_JOIN_ROOM: u16 = 0x07;
pub const SP_JOIN_ROOM_RESPONSE: u16 = 0x08;
pub const CP_CREATE_ROOM: u16 = 0x09;
pub const SP_CREATE_ROOM_RESPONSE: u16 = 0x0a;
pub const CP_WORLD_REQUEST: u16 = 0x0b;
pub const SP_NEW_PLAYER: u16 = 0x0c;
pub const SP_NEW_WORLD: u16 = 0x0d;
pub const CP_MOVE_DIRECTION: u16 = 0x0e;
pub const CP_MOVE_START: u16 = 0x0f;
pub const CP_MOVE_STOP: u16 = 0x10;
pub const CP_MOVE_HEARTBEAT: u16 = 0x11;
pub const SP_MOVE_DIRECTION: u16 = 0x12;
pub const SP_MOVE_START: u16 = 0x13;
pub const SP_MOVE_STOP: u16 = 0x14;
pub const SP_MOVE_HEARTBEAT: u16 = 0x15;
pub const SP_OBJECT_EATEN: u16 = 0x16;
pub const SP_PLAYER_EATEN: u16 = 0x17;
pub const CP_USE_BONUS: u16 = 0x18;
pub const SP_USE_BONUS_FAILED: u16 = 0x19;
pub const SP_USE_BONUS: u16 = 0x1a;
pub const SP_CANCEL_BONUS: u16 = 0x1b;
pub const SP_NEW_OBJECT: u16 = 0x1c;
pub const CP_PLAYER_EXIT: u16 = 0x1d;
pub const SP_PLAYER_EXIT: u16 = 0x1e;
pub const CP_STATS: u16 = 0x1f;
pub const SP_STATS_RESPONSE: u16 = 0x20;
pub const CP_CHAT_MSG: u16 = 0x21;
pub const SP_CHAT_MSG: u16 = 0x22;
pub const SP_DESTROY_OBJECT: u16 = 0x23;
pub const SP_UPDATE_WORLD: u16 = 0x24;
pub const CP_EAT_REQUEST: u16 = 0x25;
pub const SP_PING: u16 = 0x26;
pub const CP_PONG: u16 = 0x27;
pub const SP_PING_PONG: u16 = 0x28;
pub const CP_RESTORE_SESSION: u16 = 0x29;
pub const SP_RESTORE_SESSION_RESPONSE: u16 = 0x2a;
pub const SP_KICK: u16 = 0x2b;

pub const OPCODE_MAX: u16 = 0x2c;

pub type HandlerFn =
    fn(&mut Network, usize, &mut PacketReader<'_>) -> Result<(), ReadError>;

pub struct HandlerEntry {
    pub handler: HandlerFn,
    pub states: u8,
}

const fn entry(handler: HandlerFn, states: u8) -> HandlerEntry {
    HandlerEntry { handler, states }
}

/// Opcode is the index; keep this table in lockstep with the constants.
pub static HANDLER_TABLE: [HandlerEntry; OPCODE_MAX as usize] = [
    entry(handlers::handle_null, STATE_ANY),            // OPCODE_NONE
    entry(handlers::handle_login, STATE_AUTH),          // CP_LOGIN
    entry(handlers::handle_server_side, STATE_NONE),    // SP_LOGIN_RESPONSE
    entry(handlers::handle_register, STATE_AUTH),       // CP_REGISTER
    entry(handlers::handle_server_side, STATE_NONE),    // SP_REGISTER_RESPONSE
    entry(handlers::handle_room_list, STATE_LOBBY),     // CP_ROOM_LIST
    entry(handlers::handle_server_side, STATE_NONE),    // SP_ROOM_LIST_RESPONSE
    entry(handlers::handle_join_room, STATE_LOBBY),     // CP_JOIN_ROOM
    entry(handlers::handle_server_side, STATE_NONE),    // SP_JOIN_ROOM_RESPONSE
    entry(handlers::handle_create_room, STATE_LOBBY),   // CP_CREATE_ROOM
    entry(handlers::handle_server_side, STATE_NONE),    // SP_CREATE_ROOM_RESPONSE
    entry(handlers::handle_world_request, STATE_GAME),  // CP_WORLD_REQUEST
    entry(handlers::handle_server_side, STATE_NONE),    // SP_NEW_PLAYER
    entry(handlers::handle_server_side, STATE_NONE),    // SP_NEW_WORLD
    entry(handlers::handle_move_direction, STATE_GAME), // CP_MOVE_DIRECTION
    entry(handlers::handle_move_start, STATE_GAME),     // CP_MOVE_START
    entry(handlers::handle_move_stop, STATE_GAME),      // CP_MOVE_STOP
    entry(handlers::handle_move_heartbeat, STATE_GAME), // CP_MOVE_HEARTBEAT
    entry(handlers::handle_server_side, STATE_NONE),    // SP_MOVE_DIRECTION
    entry(handlers::handle_server_side, STATE_NONE),    // SP_MOVE_START
    entry(handlers::handle_server_side, STATE_NONE),    // SP_MOVE_STOP
    entry(handlers::handle_server_side, STATE_NONE),    // SP_MOVE_HEARTBEAT
    entry(handlers::handle_server_side, STATE_NONE),    // SP_OBJECT_EATEN
    entry(handlers::handle_server_side, STATE_NONE),    // SP_PLAYER_EATEN
    entry(handlers::handle_null, STATE_GAME),           // CP_USE_BONUS
    entry(handlers::handle_server_side, STATE_NONE),    // SP_USE_BONUS_FAILED
    entry(handlers::handle_server_side, STATE_NONE),    // SP_USE_BONUS
    entry(handlers::handle_server_side, STATE_NONE),    // SP_CANCEL_BONUS
    entry(handlers::handle_server_side, STATE_NONE),    // SP_NEW_OBJECT
    entry(handlers::handle_player_exit, STATE_GAME),    // CP_PLAYER_EXIT
    entry(handlers::handle_server_side, STATE_NONE),    // SP_PLAYER_EXIT
    entry(handlers::handle_stats, STATE_GAME),          // CP_STATS
    entry(handlers::handle_server_side, STATE_NONE),    // SP_STATS_RESPONSE
    entry(handlers::handle_chat_message, STATE_GAME),   // CP_CHAT_MSG
    entry(handlers::handle_server_side, STATE_NONE),    // SP_CHAT_MSG
    entry(handlers::handle_server_side, STATE_NONE),    // SP_DESTROY_OBJECT
    entry(handlers::handle_server_side, STATE_NONE),    // SP_UPDATE_WORLD
    entry(handlers::handle_eat_request, STATE_GAME),    // CP_EAT_REQUEST
    entry(handlers::handle_server_side, STATE_NONE),    // SP_PING
    entry(handlers::handle_pong, STATE_ANY),            // CP_PONG
    entry(handlers::handle_server_side, STATE_NONE),    // SP_PING_PONG
    entry(handlers::handle_restore_session, STATE_AUTH),// CP_RESTORE_SESSION
    entry(handlers::handle_server_side, STATE_NONE),    // SP_RESTORE_SESSION_RESPONSE
    entry(handlers::handle_server_side, STATE_NONE),    // SP_KICK
];
