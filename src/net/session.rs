//! Per-connection protocol state: the auth/lobby/game progression, the
//! violation counter that expires abusive clients, heartbeat bookkeeping
//! and the reconnect identity used by session restore.

use std::time::{Duration, Instant};

pub const STATE_NONE: u8 = 0;
pub const STATE_AUTH: u8 = 1;
pub const STATE_LOBBY: u8 = 2;
pub const STATE_GAME: u8 = 4;
pub const STATE_ANY: u8 = STATE_AUTH | STATE_LOBBY | STATE_GAME;

pub const MAX_SESSION_VIOLATIONS: u8 = 3;
pub const PING_INTERVAL: Duration = Duration::from_secs(60);
pub const PONG_WINDOW: Duration = Duration::from_secs(20);
pub const RECONNECT_GRACE: Duration = Duration::from_secs(40);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Auth,
    Lobby,
    Game,
}

impl SessionState {
    pub fn mask(self) -> u8 {
        match self {
            Self::Auth => STATE_AUTH,
            Self::Lobby => STATE_LOBBY,
            Self::Game => STATE_GAME,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub state: SessionState,
    violations: u8,
    pub expired: bool,
    pub session_key: Option<String>,
    pub player_id: u32,
    pub player_name: String,
    pub room_id: u32,
    pub latency_ms: u32,
    pub last_ping_at: Option<Instant>,
    pub awaiting_pong: bool,
    pub timeout_at: Option<Instant>,
    pub timeout_reason: u8,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Auth,
            violations: 0,
            expired: false,
            session_key: None,
            player_id: 0,
            player_name: String::new(),
            room_id: 0,
            latency_ms: 0,
            last_ping_at: None,
            awaiting_pong: false,
            timeout_at: None,
            timeout_reason: 0,
        }
    }

    pub fn allows(&self, mask: u8) -> bool {
        mask & self.state.mask() != 0
    }

    /// One strike. Three strikes without an intervening well-formed packet
    /// expire the session.
    pub fn violation(&mut self) {
        self.violations = self.violations.saturating_add(1);
        if self.violations >= MAX_SESSION_VIOLATIONS {
            self.expired = true;
        }
    }

    /// A well-formed, legal packet walks the counter back down.
    pub fn absolve(&mut self) {
        self.violations = self.violations.saturating_sub(1);
    }

    pub fn arm_timeout(&mut self, reason: u8) {
        if self.timeout_at.is_none() {
            self.timeout_at = Some(Instant::now() + RECONNECT_GRACE);
            self.timeout_reason = reason;
        }
    }

    pub fn clear_timeout(&mut self) {
        self.timeout_at = None;
    }

    pub fn timed_out(&self, now: Instant) -> bool {
        matches!(self.timeout_at, Some(at) if now >= at)
    }

    /// True when this session is eligible to be restored onto another
    /// connection: its socket is gone but the grace window is still open.
    pub fn restorable(&self, player_id: u32, session_key: &str) -> bool {
        !self.expired
            && self.timeout_at.is_some()
            && self.player_id == player_id
            && self.player_id != 0
            && self.session_key.as_deref() == Some(session_key)
    }

    /// Moves the abandoned session's identity onto `self` and strips the
    /// stale one so its eventual removal touches no room state.
    pub fn adopt(&mut self, stale: &mut Session) {
        self.player_id = stale.player_id;
        self.player_name = std::mem::take(&mut stale.player_name);
        self.session_key = stale.session_key.take();
        self.room_id = stale.room_id;
        self.latency_ms = stale.latency_ms;
        self.state = if self.room_id != 0 {
            SessionState::Game
        } else {
            SessionState::Lobby
        };
        self.timeout_at = None;
        stale.player_id = 0;
        stale.room_id = 0;
        stale.expired = true;
    }
}
