//! Per-opcode packet handlers. A handler returns `Err` only for malformed
//! payloads (which costs the sender a violation); domain failures travel
//! back as status codes in the response packet.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use rand::Rng;

use crate::game::registry::{GAME_TYPE_FFA, MAX_ROOMS};
use crate::game::room::Room;
use crate::game::object::Position;
use crate::net::opcodes::{
    SP_CREATE_ROOM_RESPONSE, SP_JOIN_ROOM_RESPONSE, SP_KICK, SP_LOGIN_RESPONSE, SP_PING_PONG,
    SP_REGISTER_RESPONSE, SP_RESTORE_SESSION_RESPONSE, SP_ROOM_LIST_RESPONSE,
};
use crate::net::packet::{PacketReader, PacketWriter, ReadError};
use crate::net::server::Network;
use crate::net::session::SessionState;
use crate::net::status::{
    STATUS_LOGIN_INVALID_USER, STATUS_LOGIN_OK, STATUS_LOGIN_VERSION_MISMATCH,
    STATUS_LOGIN_WRONG_PASSWORD, STATUS_PLAYEREXIT_LEAVE, STATUS_PLAYEREXIT_REPEATED_LOGIN,
    STATUS_REGISTER_INVALID_NAME, STATUS_REGISTER_NAME_IS_TAKEN, STATUS_REGISTER_NAME_TOO_LONG,
    STATUS_REGISTER_NAME_TOO_SHORT, STATUS_REGISTER_OK, STATUS_REGISTER_PASSWORD_TOO_LONG,
    STATUS_REGISTER_PASSWORD_TOO_SHORT, STATUS_REGISTER_VERSION_MISMATCH,
    STATUS_ROOMCREATE_OK, STATUS_ROOMCREATE_SERVER_LIMIT, STATUS_ROOMJOIN_FAILED_ALREADY_IN_ROOM,
    STATUS_ROOMJOIN_FAILED_NO_SUCH_ROOM, STATUS_ROOMJOIN_NO_SPECTATORS, STATUS_ROOMJOIN_OK,
    STATUS_SESSIONREST_FAILED_NOTFOUND, STATUS_SESSIONREST_OK,
};
use crate::persistence::users::UserStore;
use crate::telemetry::logging;

pub const GAME_VERSION: u32 = 1;

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 20;
const MIN_PASSWORD_LEN: usize = 5;
const MAX_PASSWORD_LEN: usize = 32;

fn is_valid_username(name: &str) -> bool {
    name.chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_' | '+'))
}

pub(crate) fn new_session_key() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn random_color() -> u32 {
    rand::thread_rng().gen::<u32>() & 0x00ff_ffff
}

fn game_room(net: &Network, idx: usize) -> Option<Arc<Room>> {
    let room_id = net.clients[idx].session.room_id;
    if room_id == 0 {
        return None;
    }
    net.registry.get(room_id)
}

/// Accepted and ignored (keepalive opcode and features with no server
/// side effect).
pub fn handle_null(
    _net: &mut Network,
    _idx: usize,
    _reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    Ok(())
}

/// Placeholder for server-to-client opcodes; their empty state mask means
/// the dispatcher never gets here.
pub fn handle_server_side(
    _net: &mut Network,
    _idx: usize,
    _reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    Ok(())
}

pub fn handle_login(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let username = reader.read_string()?;
    let password = reader.read_string()?;
    let version = reader.read_u32()?;

    let mut response = PacketWriter::new(SP_LOGIN_RESPONSE);
    if version != GAME_VERSION {
        response.write_u8(STATUS_LOGIN_VERSION_MISMATCH);
        net.clients[idx].conn.send(&response);
        return Ok(());
    }
    let Some(user) = net.users.get_by_name(&username) else {
        response.write_u8(STATUS_LOGIN_INVALID_USER);
        net.clients[idx].conn.send(&response);
        return Ok(());
    };
    if !UserStore::verify_password(&user.password_hash, &password) {
        response.write_u8(STATUS_LOGIN_WRONG_PASSWORD);
        net.clients[idx].conn.send(&response);
        return Ok(());
    }

    let key = new_session_key();
    let session = &mut net.clients[idx].session;
    session.player_id = user.id;
    session.player_name = user.username.clone();
    session.session_key = Some(key.clone());
    session.state = SessionState::Lobby;

    response.write_u8(STATUS_LOGIN_OK);
    response.write_u32(user.id);
    response.write_string(&key);
    net.clients[idx].conn.send(&response);
    logging::log_info(&format!(
        "{} logged in as \"{}\" (player {})",
        net.clients[idx].conn.peer, user.username, user.id
    ));
    Ok(())
}

pub fn handle_register(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let username = reader.read_string()?;
    let password = reader.read_string()?;
    let version = reader.read_u32()?;

    let mut response = PacketWriter::new(SP_REGISTER_RESPONSE);
    let status = if version != GAME_VERSION {
        Some(STATUS_REGISTER_VERSION_MISMATCH)
    } else if !is_valid_username(&username) {
        Some(STATUS_REGISTER_INVALID_NAME)
    } else if username.len() < MIN_NAME_LEN {
        Some(STATUS_REGISTER_NAME_TOO_SHORT)
    } else if username.len() > MAX_NAME_LEN {
        Some(STATUS_REGISTER_NAME_TOO_LONG)
    } else if password.len() < MIN_PASSWORD_LEN {
        Some(STATUS_REGISTER_PASSWORD_TOO_SHORT)
    } else if password.len() > MAX_PASSWORD_LEN {
        Some(STATUS_REGISTER_PASSWORD_TOO_LONG)
    } else {
        None
    };
    if let Some(status) = status {
        response.write_u8(status);
        net.clients[idx].conn.send(&response);
        return Ok(());
    }

    let Some(user) = net.users.store_user(&username, &password) else {
        response.write_u8(STATUS_REGISTER_NAME_IS_TAKEN);
        net.clients[idx].conn.send(&response);
        return Ok(());
    };

    // a fresh account logs straight in
    let key = new_session_key();
    let session = &mut net.clients[idx].session;
    session.player_id = user.id;
    session.player_name = user.username.clone();
    session.session_key = Some(key.clone());
    session.state = SessionState::Lobby;

    response.write_u8(STATUS_REGISTER_OK);
    response.write_u32(user.id);
    response.write_string(&key);
    net.clients[idx].conn.send(&response);
    logging::log_info(&format!(
        "{} registered \"{}\" (player {})",
        net.clients[idx].conn.peer, user.username, user.id
    ));
    Ok(())
}

pub fn handle_room_list(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    // negative filter lists every game type
    let filter = reader.read_i8()?;
    let rooms: Vec<_> = net
        .registry
        .list()
        .into_iter()
        .filter(|room| filter < 0 || room.game_type == filter as u8)
        .collect();
    let mut response = PacketWriter::new(SP_ROOM_LIST_RESPONSE);
    response.write_u32(rooms.len() as u32);
    for room in rooms {
        let (players, capacity) = room.occupancy();
        response.write_u32(room.id);
        response.write_u8(room.game_type);
        response.write_u8(players);
        response.write_u8(capacity);
        response.write_string(&room.name);
    }
    net.clients[idx].conn.send(&response);
    Ok(())
}

pub fn handle_join_room(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let room_id = reader.read_u32()?;
    let spectator = reader.read_u8()?;
    let mut response = PacketWriter::new(SP_JOIN_ROOM_RESPONSE);

    if spectator != 0 {
        response.write_u8(STATUS_ROOMJOIN_NO_SPECTATORS);
        response.write_u32(0);
        net.clients[idx].conn.send(&response);
        return Ok(());
    }
    if net.clients[idx].session.room_id != 0 {
        response.write_u8(STATUS_ROOMJOIN_FAILED_ALREADY_IN_ROOM);
        response.write_u32(0);
        net.clients[idx].conn.send(&response);
        return Ok(());
    }
    let Some(room) = net.registry.get(room_id) else {
        response.write_u8(STATUS_ROOMJOIN_FAILED_NO_SUCH_ROOM);
        response.write_u32(0);
        net.clients[idx].conn.send(&response);
        return Ok(());
    };

    let player_id = net.clients[idx].session.player_id;
    let name = net.clients[idx].session.player_name.clone();
    let status = room.join(
        player_id,
        &name,
        random_color(),
        Arc::clone(&net.clients[idx].conn),
    );
    response.write_u8(status);
    if status == STATUS_ROOMJOIN_OK {
        let session = &mut net.clients[idx].session;
        session.room_id = room_id;
        session.state = SessionState::Game;
        response.write_u32(room_id); // chat channel
    } else {
        response.write_u32(0);
    }
    net.clients[idx].conn.send(&response);
    Ok(())
}

pub fn handle_create_room(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let name = reader.read_string()?;
    let capacity = reader.read_u32()?;
    let size = reader.read_u32()?;

    let mut response = PacketWriter::new(SP_CREATE_ROOM_RESPONSE);
    if net.registry.room_count() >= MAX_ROOMS {
        response.write_u8(STATUS_ROOMCREATE_SERVER_LIMIT);
        response.write_u32(0);
        net.clients[idx].conn.send(&response);
        return Ok(());
    }
    // out-of-range capacities fail the registry's bounds check
    let capacity = u8::try_from(capacity).unwrap_or(u8::MAX);
    let side = size as f32;
    match net
        .registry
        .create_room(GAME_TYPE_FFA, name, capacity, side, side)
    {
        Ok(room) => {
            let player_id = net.clients[idx].session.player_id;
            let player_name = net.clients[idx].session.player_name.clone();
            room.join(
                player_id,
                &player_name,
                random_color(),
                Arc::clone(&net.clients[idx].conn),
            );
            let session = &mut net.clients[idx].session;
            session.room_id = room.id;
            session.state = SessionState::Game;
            response.write_u8(STATUS_ROOMCREATE_OK);
            response.write_u32(room.id); // chat channel
        }
        Err(status) => {
            response.write_u8(status);
            response.write_u32(0);
        }
    }
    net.clients[idx].conn.send(&response);
    Ok(())
}

pub fn handle_world_request(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let reinit = reader.read_u8()?;
    if let Some(room) = game_room(net, idx) {
        room.send_new_world(net.clients[idx].session.player_id, reinit != 0);
    }
    Ok(())
}

pub fn handle_move_direction(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let x = reader.read_f32()?;
    let y = reader.read_f32()?;
    let angle = reader.read_f32()?;
    if let Some(room) = game_room(net, idx) {
        room.move_direction(net.clients[idx].session.player_id, Position::new(x, y), angle);
    }
    Ok(())
}

pub fn handle_move_start(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let x = reader.read_f32()?;
    let y = reader.read_f32()?;
    let angle = reader.read_f32()?;
    if let Some(room) = game_room(net, idx) {
        room.move_start(net.clients[idx].session.player_id, Position::new(x, y), angle);
    }
    Ok(())
}

pub fn handle_move_stop(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let x = reader.read_f32()?;
    let y = reader.read_f32()?;
    if let Some(room) = game_room(net, idx) {
        room.move_stop(net.clients[idx].session.player_id, Position::new(x, y));
    }
    Ok(())
}

pub fn handle_move_heartbeat(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let x = reader.read_f32()?;
    let y = reader.read_f32()?;
    if let Some(room) = game_room(net, idx) {
        room.move_heartbeat(net.clients[idx].session.player_id, Position::new(x, y));
    }
    Ok(())
}

pub fn handle_eat_request(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let target_type = reader.read_u8()?;
    let target_id = reader.read_u32()?;
    if let Some(room) = game_room(net, idx) {
        room.eat_attempt(net.clients[idx].session.player_id, target_type, target_id);
    }
    Ok(())
}

pub fn handle_player_exit(
    net: &mut Network,
    idx: usize,
    _reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    if let Some(room) = game_room(net, idx) {
        room.remove_player(net.clients[idx].session.player_id, STATUS_PLAYEREXIT_LEAVE);
    }
    let session = &mut net.clients[idx].session;
    session.room_id = 0;
    session.state = SessionState::Lobby;
    Ok(())
}

pub fn handle_stats(
    net: &mut Network,
    idx: usize,
    _reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    if let Some(room) = game_room(net, idx) {
        let response = room.stats_packet();
        net.clients[idx].conn.send(&response);
    }
    Ok(())
}

pub fn handle_chat_message(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let message = reader.read_string()?;
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if let Some(room) = game_room(net, idx) {
        room.chat(net.clients[idx].session.player_id, trimmed);
    }
    Ok(())
}

/// The pong payload is empty; latency is measured against the instant the
/// ping went out.
pub fn handle_pong(
    net: &mut Network,
    idx: usize,
    _reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let now = Instant::now();
    let session = &mut net.clients[idx].session;
    if let Some(at) = session.last_ping_at {
        session.latency_ms = now.duration_since(at).as_millis() as u32;
    }
    session.awaiting_pong = false;
    session.clear_timeout();
    let latency = session.latency_ms;

    let mut response = PacketWriter::new(SP_PING_PONG);
    response.write_u32(latency);
    net.clients[idx].conn.send(&response);
    Ok(())
}

pub fn handle_restore_session(
    net: &mut Network,
    idx: usize,
    reader: &mut PacketReader<'_>,
) -> Result<(), ReadError> {
    let session_key = reader.read_string()?;
    let player_id = reader.read_u32()?;

    let mut response = PacketWriter::new(SP_RESTORE_SESSION_RESPONSE);
    match net.find_restorable(idx, player_id, &session_key) {
        Some(stale_idx) => {
            let mut kick = PacketWriter::new(SP_KICK);
            kick.write_u8(STATUS_PLAYEREXIT_REPEATED_LOGIN);
            net.clients[stale_idx].conn.send(&kick);
            net.clients[stale_idx].conn.mark_closed();

            {
                let (low, high) = if idx < stale_idx {
                    (idx, stale_idx)
                } else {
                    (stale_idx, idx)
                };
                let (left, right) = net.clients.split_at_mut(high);
                let (fresh, stale) = if idx < stale_idx {
                    (&mut left[low].session, &mut right[0].session)
                } else {
                    (&mut right[0].session, &mut left[low].session)
                };
                fresh.adopt(stale);
            }

            let room_id = net.clients[idx].session.room_id;
            if room_id != 0 {
                if let Some(room) = net.registry.get(room_id) {
                    room.rebind_connection(player_id, Arc::clone(&net.clients[idx].conn));
                }
            }
            response.write_u8(STATUS_SESSIONREST_OK);
            response.write_u32(room_id);
            response.write_u32(room_id); // chat channel
            logging::log_info(&format!(
                "{} restored session of player {}",
                net.clients[idx].conn.peer, player_id
            ));
        }
        None => response.write_u8(STATUS_SESSIONREST_FAILED_NOTFOUND),
    }
    net.clients[idx].conn.send(&response);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::game::registry::RoomRegistry;
    use crate::net::opcodes::{
        CP_CREATE_ROOM, CP_JOIN_ROOM, CP_LOGIN, CP_MOVE_DIRECTION, CP_REGISTER, CP_ROOM_LIST,
    };
    use crate::net::server::{Client, Connection, FrameBuffer, Network, ServerControl};
    use crate::net::session::Session;
    use crate::net::status::{
        STATUS_PLAYEREXIT_KICKED_AFK, STATUS_ROOMCREATE_INVALID_PARAMETERS,
    };

    /// One network with a single loopback client; the returned stream is
    /// the client's end, for reading what the server sent.
    fn test_net(tag: &str) -> (Network, TcpStream) {
        let dir = std::env::temp_dir().join(format!(
            "petri-handlers-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let _ = std::fs::remove_file(dir.join("users.yaml"));
        let users = Arc::new(UserStore::load(&dir).expect("store"));
        let registry = RoomRegistry::new();
        let control = Arc::new(ServerControl::new());
        let count = Arc::new(AtomicUsize::new(0));
        let mut net =
            Network::bind("127.0.0.1:0", registry, users, control, count).expect("bind");
        let (client, peer) = client_pair();
        net.clients.push(client);
        (net, peer)
    }

    fn client_pair() -> (Client, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let stream = TcpStream::connect(addr).expect("connect");
        let (peer, _) = listener.accept().expect("accept");
        peer.set_read_timeout(Some(Duration::from_millis(500)))
            .expect("timeout");
        let writer = stream.try_clone().expect("clone");
        let client = Client {
            conn: Arc::new(Connection::new(writer, addr)),
            reader: stream,
            frame: FrameBuffer::new(),
            session: Session::new(),
        };
        (client, peer)
    }

    fn recv_frame(peer: &mut TcpStream) -> (u16, Vec<u8>) {
        let mut header = [0u8; 4];
        peer.read_exact(&mut header).expect("frame header");
        let opcode = u16::from_be_bytes([header[0], header[1]]);
        let len = u16::from_be_bytes([header[2], header[3]]) as usize;
        let mut payload = vec![0u8; len];
        peer.read_exact(&mut payload).expect("frame payload");
        (opcode, payload)
    }

    #[test]
    fn username_charset() {
        assert!(is_valid_username("kenny"));
        assert!(is_valid_username("z.u-z_k+a42"));
        assert!(!is_valid_username("no spaces"));
        assert!(!is_valid_username("ünïcode"));
        assert!(!is_valid_username("semi;colon"));
    }

    #[test]
    fn session_keys_decode_to_twenty_bytes() {
        let key = new_session_key();
        assert_eq!(key.len(), 28);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&key)
            .expect("base64");
        assert_eq!(decoded.len(), 20);
    }

    #[test]
    fn session_keys_are_unique_enough() {
        let a = new_session_key();
        let b = new_session_key();
        assert_ne!(a, b);
    }

    #[test]
    fn colors_fit_in_rgb() {
        for _ in 0..32 {
            assert_eq!(random_color() & 0xff00_0000, 0);
        }
    }

    #[test]
    fn login_reads_credentials_before_version() {
        let (mut net, mut peer) = test_net("login-order");
        net.users.store_user("kenny", "hunter22").expect("stored");

        let mut pkt = PacketWriter::new(CP_LOGIN);
        pkt.write_string("kenny");
        pkt.write_string("hunter22");
        pkt.write_u32(GAME_VERSION);
        let mut reader = PacketReader::new(pkt.payload());
        handle_login(&mut net, 0, &mut reader).expect("handled");

        let (opcode, payload) = recv_frame(&mut peer);
        assert_eq!(opcode, SP_LOGIN_RESPONSE);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u8(), Ok(STATUS_LOGIN_OK));
        assert_eq!(r.read_u32(), Ok(1)); // player id
        assert_eq!(net.clients[0].session.state, SessionState::Lobby);
    }

    #[test]
    fn register_reads_credentials_before_version() {
        let (mut net, mut peer) = test_net("register-order");

        let mut pkt = PacketWriter::new(CP_REGISTER);
        pkt.write_string("zuzka");
        pkt.write_string("secret99");
        pkt.write_u32(GAME_VERSION);
        let mut reader = PacketReader::new(pkt.payload());
        handle_register(&mut net, 0, &mut reader).expect("handled");

        let (opcode, payload) = recv_frame(&mut peer);
        assert_eq!(opcode, SP_REGISTER_RESPONSE);
        assert_eq!(payload[0], STATUS_REGISTER_OK);
        assert!(net.users.get_by_name("zuzka").is_some());
        assert_eq!(net.clients[0].session.state, SessionState::Lobby);
    }

    #[test]
    fn create_room_payload_is_name_capacity_size() {
        let (mut net, mut peer) = test_net("create-shape");
        net.clients[0].session.state = SessionState::Lobby;
        net.clients[0].session.player_id = 1;
        net.clients[0].session.player_name = "kenny".to_string();

        let mut pkt = PacketWriter::new(CP_CREATE_ROOM);
        pkt.write_string("my arena");
        pkt.write_u32(20);
        pkt.write_u32(500);
        let mut reader = PacketReader::new(pkt.payload());
        handle_create_room(&mut net, 0, &mut reader).expect("handled");

        let (opcode, payload) = recv_frame(&mut peer);
        assert_eq!(opcode, SP_CREATE_ROOM_RESPONSE);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u8(), Ok(STATUS_ROOMCREATE_OK));
        let channel = r.read_u32().expect("chat channel");
        let room = net.registry.get(channel).expect("room exists");
        assert_eq!(room.name, "my arena");
        assert_eq!(room.occupancy(), (1, 20));
        assert_eq!(net.clients[0].session.room_id, room.id);
        net.registry.shutdown();
    }

    #[test]
    fn join_room_consumes_the_spectator_flag() {
        let (mut net, mut peer) = test_net("join-spectator");
        let room = net.registry.start_default_room().expect("default room");
        net.clients[0].session.state = SessionState::Lobby;
        net.clients[0].session.player_id = 7;
        net.clients[0].session.player_name = "ada".to_string();

        let mut pkt = PacketWriter::new(CP_JOIN_ROOM);
        pkt.write_u32(room.id);
        pkt.write_u8(1); // spectate
        let mut reader = PacketReader::new(pkt.payload());
        handle_join_room(&mut net, 0, &mut reader).expect("handled");
        let (_, payload) = recv_frame(&mut peer);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u8(), Ok(STATUS_ROOMJOIN_NO_SPECTATORS));
        assert_eq!(r.read_u32(), Ok(0));
        assert_eq!(net.clients[0].session.room_id, 0);

        let mut pkt = PacketWriter::new(CP_JOIN_ROOM);
        pkt.write_u32(room.id);
        pkt.write_u8(0);
        let mut reader = PacketReader::new(pkt.payload());
        handle_join_room(&mut net, 0, &mut reader).expect("handled");
        let (_, payload) = recv_frame(&mut peer);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u8(), Ok(STATUS_ROOMJOIN_OK));
        assert_eq!(r.read_u32(), Ok(room.id));
        net.registry.shutdown();
    }

    #[test]
    fn room_list_honors_the_game_type_filter() {
        let (mut net, mut peer) = test_net("list-filter");
        net.clients[0].session.state = SessionState::Lobby;
        net.registry
            .create_room(0, "ffa".to_string(), 10, 300.0, 300.0)
            .expect("ffa room");
        net.registry
            .create_room(1, "teams".to_string(), 10, 300.0, 300.0)
            .expect("teams room");

        let mut pkt = PacketWriter::new(CP_ROOM_LIST);
        pkt.write_i8(-1);
        let mut reader = PacketReader::new(pkt.payload());
        handle_room_list(&mut net, 0, &mut reader).expect("handled");
        let (_, payload) = recv_frame(&mut peer);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u32(), Ok(2));

        let mut pkt = PacketWriter::new(CP_ROOM_LIST);
        pkt.write_i8(1);
        let mut reader = PacketReader::new(pkt.payload());
        handle_room_list(&mut net, 0, &mut reader).expect("handled");
        let (_, payload) = recv_frame(&mut peer);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u32(), Ok(1));
        r.read_u32().expect("room id");
        assert_eq!(r.read_u8(), Ok(1)); // game type
        net.registry.shutdown();
    }

    #[test]
    fn failed_join_and_create_still_carry_a_chat_channel() {
        let (mut net, mut peer) = test_net("channel-on-failure");
        net.clients[0].session.state = SessionState::Lobby;

        let mut pkt = PacketWriter::new(CP_JOIN_ROOM);
        pkt.write_u32(999);
        pkt.write_u8(0);
        let mut reader = PacketReader::new(pkt.payload());
        handle_join_room(&mut net, 0, &mut reader).expect("handled");
        let (_, payload) = recv_frame(&mut peer);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u8(), Ok(STATUS_ROOMJOIN_FAILED_NO_SUCH_ROOM));
        assert_eq!(r.read_u32(), Ok(0));
        assert_eq!(r.remaining(), 0);

        let mut pkt = PacketWriter::new(CP_CREATE_ROOM);
        pkt.write_string("bogus");
        pkt.write_u32(300); // capacity past any room limit
        pkt.write_u32(500);
        let mut reader = PacketReader::new(pkt.payload());
        handle_create_room(&mut net, 0, &mut reader).expect("handled");
        let (_, payload) = recv_frame(&mut peer);
        let mut r = PacketReader::new(&payload);
        assert_eq!(r.read_u8(), Ok(STATUS_ROOMCREATE_INVALID_PARAMETERS));
        assert_eq!(r.read_u32(), Ok(0));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn move_direction_requires_position_and_angle() {
        let (mut net, _peer) = test_net("direction-shape");
        let mut pkt = PacketWriter::new(CP_MOVE_DIRECTION);
        pkt.write_f32(30.0);
        pkt.write_f32(40.0);
        let mut reader = PacketReader::new(pkt.payload());
        assert!(handle_move_direction(&mut net, 0, &mut reader).is_err());

        pkt.write_f32(0.75);
        let mut reader = PacketReader::new(pkt.payload());
        assert!(handle_move_direction(&mut net, 0, &mut reader).is_ok());
    }

    #[test]
    fn pong_with_an_empty_payload_clears_the_heartbeat() {
        let (mut net, mut peer) = test_net("pong-empty");
        {
            let session = &mut net.clients[0].session;
            session.last_ping_at = Some(Instant::now());
            session.awaiting_pong = true;
            session.arm_timeout(STATUS_PLAYEREXIT_KICKED_AFK);
        }
        let mut reader = PacketReader::new(&[]);
        handle_pong(&mut net, 0, &mut reader).expect("handled");

        let session = &net.clients[0].session;
        assert!(!session.awaiting_pong);
        assert!(session.timeout_at.is_none());
        let (opcode, payload) = recv_frame(&mut peer);
        assert_eq!(opcode, SP_PING_PONG);
        assert_eq!(payload.len(), 4);
    }
}
