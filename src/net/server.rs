//! Connection management: the non-blocking accept/scan loop, stream
//! reassembly into protocol frames, heartbeats and session expiry.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::game::registry::RoomRegistry;
use crate::net::opcodes::{HANDLER_TABLE, OPCODE_MAX, SP_KICK, SP_PING};
use crate::net::packet::{PacketReader, PacketWriter, HEADER_SIZE, MAX_PACKET_SIZE};
use crate::net::session::{Session, PING_INTERVAL, PONG_WINDOW};
use crate::net::status::{
    STATUS_PLAYEREXIT_CONNECTION_ERROR, STATUS_PLAYEREXIT_KICKED_AFK,
    STATUS_PLAYEREXIT_KICKED_SUSPICIOUS,
};
use crate::persistence::users::UserStore;
use crate::telemetry::logging;

const SCAN_INTERVAL_MS: u64 = 10;
const READ_CHUNK: usize = 2048;
const MAX_WRITE_STALLS: u32 = 50;

#[derive(Debug)]
pub struct ServerControl {
    running: AtomicBool,
}

impl ServerControl {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
        }
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Shared write half of a client socket. Rooms hold one of these per
/// player, so broadcasts never touch the network thread.
pub struct Connection {
    writer: Mutex<TcpStream>,
    pub peer: SocketAddr,
    closed: AtomicBool,
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            writer: Mutex::new(stream),
            peer,
            closed: AtomicBool::new(false),
            bytes_sent: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
        }
    }

    pub fn send(&self, packet: &PacketWriter) {
        self.send_frame(&packet.frame());
    }

    /// Writes a prebuilt frame, riding out short non-blocking stalls. A
    /// hard error or a persistent stall marks the connection closed; the
    /// scan loop reaps it on the next pass.
    pub fn send_frame(&self, frame: &[u8]) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let Ok(mut stream) = self.writer.lock() else {
            return;
        };
        let mut written = 0;
        let mut stalls = 0u32;
        while written < frame.len() {
            match stream.write(&frame[written..]) {
                Ok(0) => {
                    self.closed.store(true, Ordering::Relaxed);
                    return;
                }
                Ok(n) => written += n,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    stalls += 1;
                    if stalls > MAX_WRITE_STALLS {
                        self.closed.store(true, Ordering::Relaxed);
                        return;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => {
                    self.closed.store(true, Ordering::Relaxed);
                    return;
                }
            }
        }
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(frame.len() as u64, Ordering::Relaxed);
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Accumulates raw reads and cuts complete `header + payload` frames out
/// of them. Frames split across reads and several frames in one read both
/// come out the same way.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_frame(&mut self) -> Result<Option<(u16, Vec<u8>)>, String> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        let opcode = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        let len = u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize;
        if len > MAX_PACKET_SIZE {
            return Err(format!(
                "declared payload {} exceeds cap {}",
                len, MAX_PACKET_SIZE
            ));
        }
        if self.buf.len() < HEADER_SIZE + len {
            return Ok(None);
        }
        let payload = self.buf[HEADER_SIZE..HEADER_SIZE + len].to_vec();
        self.buf.drain(..HEADER_SIZE + len);
        Ok(Some((opcode, payload)))
    }
}

pub(crate) struct Client {
    pub(crate) conn: Arc<Connection>,
    pub(crate) reader: TcpStream,
    pub(crate) frame: FrameBuffer,
    pub(crate) session: Session,
}

enum ReadOutcome {
    Keep,
    Grace,
    Drop,
}

pub struct Network {
    listener: TcpListener,
    pub(crate) clients: Vec<Client>,
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) users: Arc<UserStore>,
    control: Arc<ServerControl>,
    started: Instant,
    client_count: Arc<AtomicUsize>,
}

impl Network {
    pub fn bind(
        bind_addr: &str,
        registry: Arc<RoomRegistry>,
        users: Arc<UserStore>,
        control: Arc<ServerControl>,
        client_count: Arc<AtomicUsize>,
    ) -> Result<Self, String> {
        let listener = TcpListener::bind(bind_addr)
            .map_err(|err| format!("bind {} failed: {}", bind_addr, err))?;
        listener
            .set_nonblocking(true)
            .map_err(|err| format!("listener nonblocking failed: {}", err))?;
        Ok(Self {
            listener,
            clients: Vec::new(),
            registry,
            users,
            control,
            started: Instant::now(),
            client_count,
        })
    }

    pub(crate) fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn run(mut self) -> Result<(), String> {
        let addr = self
            .listener
            .local_addr()
            .map_err(|err| format!("listener address lookup failed: {}", err))?;
        logging::log_info(&format!("listening on {}", addr));
        println!("petri: listening on {}", addr);

        while self.control.is_running() {
            self.accept_ready();
            self.scan();
            self.heartbeats();
            self.sweep();
            thread::sleep(Duration::from_millis(SCAN_INTERVAL_MS));
        }
        logging::log_info("network loop stopped");
        Ok(())
    }

    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(err) = self.admit(stream, addr) {
                        logging::log_error(&format!("admit {} failed: {}", addr, err));
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    logging::log_error(&format!("accept error: {}", err));
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) -> Result<(), String> {
        stream
            .set_nonblocking(true)
            .map_err(|err| format!("client nonblocking failed: {}", err))?;
        let _ = stream.set_nodelay(true);
        let writer = stream
            .try_clone()
            .map_err(|err| format!("stream clone failed: {}", err))?;
        self.clients.push(Client {
            conn: Arc::new(Connection::new(writer, addr)),
            reader: stream,
            frame: FrameBuffer::new(),
            session: Session::new(),
        });
        self.client_count.store(self.clients.len(), Ordering::SeqCst);
        logging::log_net(&format!("{} connected", addr));
        Ok(())
    }

    fn scan(&mut self) {
        let mut i = 0;
        while i < self.clients.len() {
            if self.clients[i].conn.is_closed() {
                // a logged-in session gets the reconnect window first
                if self.clients[i].session.session_key.is_some() {
                    self.clients[i].session.arm_timeout(STATUS_PLAYEREXIT_CONNECTION_ERROR);
                    i += 1;
                } else {
                    self.drop_client(i, STATUS_PLAYEREXIT_CONNECTION_ERROR, false);
                }
                continue;
            }
            match self.read_client(i) {
                ReadOutcome::Drop => {
                    self.drop_client(i, STATUS_PLAYEREXIT_CONNECTION_ERROR, false);
                    continue;
                }
                ReadOutcome::Grace => {
                    // the socket died but the session may come back
                    self.clients[i].session.arm_timeout(STATUS_PLAYEREXIT_CONNECTION_ERROR);
                    i += 1;
                    continue;
                }
                ReadOutcome::Keep => {}
            }
            self.dispatch_pending(i);
            if self.clients[i].session.expired {
                self.drop_client(i, STATUS_PLAYEREXIT_KICKED_SUSPICIOUS, true);
                continue;
            }
            i += 1;
        }
    }

    fn read_client(&mut self, idx: usize) -> ReadOutcome {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match self.clients[idx].reader.read(&mut buf) {
                Ok(0) => return ReadOutcome::Drop,
                Ok(n) => self.clients[idx].frame.extend(&buf[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::ConnectionReset
                            | std::io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    return ReadOutcome::Grace;
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => {
                    logging::log_net(&format!(
                        "{} read error: {}",
                        self.clients[idx].conn.peer, err
                    ));
                    return ReadOutcome::Drop;
                }
            }
        }
        ReadOutcome::Keep
    }

    fn dispatch_pending(&mut self, idx: usize) {
        loop {
            if self.clients[idx].session.expired {
                break;
            }
            match self.clients[idx].frame.next_frame() {
                Ok(Some((opcode, payload))) => self.dispatch(idx, opcode, &payload),
                Ok(None) => break,
                Err(err) => {
                    logging::log_net(&format!(
                        "{} framing error: {}",
                        self.clients[idx].conn.peer, err
                    ));
                    self.clients[idx].session.expired = true;
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, idx: usize, opcode: u16, payload: &[u8]) {
        if opcode >= OPCODE_MAX {
            logging::log_debug(&format!(
                "{} sent unknown opcode 0x{:02x}",
                self.clients[idx].conn.peer, opcode
            ));
            self.clients[idx].session.violation();
            return;
        }
        let entry = &HANDLER_TABLE[opcode as usize];
        if !self.clients[idx].session.allows(entry.states) {
            logging::log_debug(&format!(
                "{} sent 0x{:02x} in the wrong state",
                self.clients[idx].conn.peer, opcode
            ));
            self.clients[idx].session.violation();
            return;
        }
        let mut reader = PacketReader::new(payload);
        match (entry.handler)(self, idx, &mut reader) {
            Ok(()) => self.clients[idx].session.absolve(),
            Err(err) => {
                logging::log_net(&format!(
                    "{} malformed packet 0x{:02x}: {}",
                    self.clients[idx].conn.peer, opcode, err
                ));
                self.clients[idx].session.violation();
            }
        }
    }

    fn heartbeats(&mut self) {
        let now = Instant::now();
        let uptime = self.uptime_ms();
        for client in &mut self.clients {
            let session = &mut client.session;
            if session.awaiting_pong {
                if let Some(at) = session.last_ping_at {
                    if now.duration_since(at) >= PONG_WINDOW {
                        session.awaiting_pong = false;
                        session.arm_timeout(STATUS_PLAYEREXIT_KICKED_AFK);
                    }
                }
            } else if session
                .last_ping_at
                .map_or(true, |at| now.duration_since(at) >= PING_INTERVAL)
            {
                session.last_ping_at = Some(now);
                session.awaiting_pong = true;
                let mut ping = PacketWriter::new(SP_PING);
                ping.write_u32(uptime as u32);
                client.conn.send(&ping);
            }
        }
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        let mut i = 0;
        while i < self.clients.len() {
            if self.clients[i].session.timed_out(now) {
                let reason = self.clients[i].session.timeout_reason;
                self.drop_client(i, reason, true);
            } else {
                i += 1;
            }
        }
    }

    fn drop_client(&mut self, idx: usize, reason: u8, send_kick: bool) {
        let client = self.clients.remove(idx);
        if send_kick {
            let mut kick = PacketWriter::new(SP_KICK);
            kick.write_u8(reason);
            client.conn.send(&kick);
        }
        if client.session.player_id != 0 && client.session.room_id != 0 {
            if let Some(room) = self.registry.get(client.session.room_id) {
                room.remove_player(client.session.player_id, reason);
            }
        }
        client.conn.mark_closed();
        self.client_count.store(self.clients.len(), Ordering::SeqCst);
        logging::log_net(&format!(
            "{} disconnected (reason {}): {} packets / {} bytes out",
            client.conn.peer,
            reason,
            client.conn.packets_sent(),
            client.conn.bytes_sent()
        ));
    }

    /// Looks for an abandoned session another client may take over.
    pub(crate) fn find_restorable(
        &self,
        requester: usize,
        player_id: u32,
        session_key: &str,
    ) -> Option<usize> {
        self.clients
            .iter()
            .enumerate()
            .find(|(i, client)| *i != requester && client.session.restorable(player_id, session_key))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_split_across_reads_is_reassembled() {
        let mut writer = PacketWriter::new(0x11);
        writer.write_f32(12.0);
        writer.write_f32(7.5);
        let frame = writer.frame();

        let mut buffer = FrameBuffer::new();
        buffer.extend(&frame[..3]);
        assert_eq!(buffer.next_frame(), Ok(None));
        buffer.extend(&frame[3..6]);
        assert_eq!(buffer.next_frame(), Ok(None));
        buffer.extend(&frame[6..]);
        let (opcode, payload) = buffer.next_frame().expect("ok").expect("frame");
        assert_eq!(opcode, 0x11);
        assert_eq!(payload.len(), 8);
        assert_eq!(buffer.next_frame(), Ok(None));
    }

    #[test]
    fn several_frames_in_one_read_come_out_in_order() {
        let mut bytes = Vec::new();
        for opcode in [0x05u16, 0x1f, 0x27] {
            let mut writer = PacketWriter::new(opcode);
            writer.write_u32(opcode as u32);
            bytes.extend_from_slice(&writer.frame());
        }
        let mut buffer = FrameBuffer::new();
        buffer.extend(&bytes);
        for expected in [0x05u16, 0x1f, 0x27] {
            let (opcode, payload) = buffer.next_frame().expect("ok").expect("frame");
            assert_eq!(opcode, expected);
            assert_eq!(payload.len(), 4);
        }
        assert_eq!(buffer.next_frame(), Ok(None));
    }

    #[test]
    fn zero_length_payload_is_a_valid_frame() {
        let writer = PacketWriter::new(0x05);
        let mut buffer = FrameBuffer::new();
        buffer.extend(&writer.frame());
        let (opcode, payload) = buffer.next_frame().expect("ok").expect("frame");
        assert_eq!(opcode, 0x05);
        assert!(payload.is_empty());
    }

    #[test]
    fn oversized_declared_length_is_fatal() {
        let mut buffer = FrameBuffer::new();
        // opcode 0x01, declared length 0x0500 (1280 > 1024)
        buffer.extend(&[0x00, 0x01, 0x05, 0x00]);
        assert!(buffer.next_frame().is_err());
    }

    #[test]
    fn control_flag_flips_once() {
        let control = ServerControl::new();
        assert!(control.is_running());
        control.request_shutdown();
        assert!(!control.is_running());
    }
}
