//! Connection state machine
//!
//! The state and its flags are shared between the public API, the
//! connection driver task and the shutdown path. Every transition is a
//! single compare-and-set on one packed word, checked against the
//! generation of the driver that requests it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Why the connection went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local `disconnect()` or shutdown
    ClientClose,
    /// Remote sent a socket-level disconnect
    ServerClose,
    /// Remote refused the credential
    Rejected,
    /// Transport ended without a disconnect packet
    TransportClose,
    /// Read or write failed
    TransportError,
    /// No ping from the remote within its advertised window
    PingTimeout,
    /// Connect watchdog expired
    ConnectTimeout,
    /// Transport could not be opened
    ConnectFailed,
    /// Reconnection loop hit the attempt cap
    GaveUp,
}

impl DisconnectReason {
    const ALL: [DisconnectReason; 9] = [
        Self::ClientClose,
        Self::ServerClose,
        Self::Rejected,
        Self::TransportClose,
        Self::TransportError,
        Self::PingTimeout,
        Self::ConnectTimeout,
        Self::ConnectFailed,
        Self::GaveUp,
    ];

    /// Forced disconnects suppress automatic reconnection.
    pub fn is_forced(self) -> bool {
        matches!(self, Self::ClientClose | Self::ServerClose | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClose => "io client disconnect",
            Self::ServerClose => "io server disconnect",
            Self::Rejected => "connect rejected",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::PingTimeout => "ping timeout",
            Self::ConnectTimeout => "connect timeout",
            Self::ConnectFailed => "connect error",
            Self::GaveUp => "reconnect failed",
        }
    }

    fn index(self) -> u8 {
        Self::ALL.iter().position(|r| *r == self).unwrap_or(0) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected(DisconnectReason),
}

const IDLE: u8 = 0;
const CONNECTING: u8 = 1;
const CONNECTED: u8 = 2;
const DISCONNECTED_BASE: u8 = 16;

impl ConnectionState {
    fn encode(self) -> u8 {
        match self {
            Self::Idle => IDLE,
            Self::Connecting => CONNECTING,
            Self::Connected => CONNECTED,
            Self::Disconnected(reason) => DISCONNECTED_BASE + reason.index(),
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            CONNECTING => Self::Connecting,
            CONNECTED => Self::Connected,
            other => Self::Disconnected(
                DisconnectReason::ALL
                    .get(other.saturating_sub(DISCONNECTED_BASE) as usize)
                    .copied()
                    .unwrap_or(DisconnectReason::TransportClose),
            ),
        }
    }

    /// `connect()` / `reconnect()` are no-ops in these states.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

/// Bit layout of the packed state word
const STATE_MASK: u64 = 0xff;
const FORCED_BIT: u64 = 1 << 8;
const AUTO_BIT: u64 = 1 << 9;
const GENERATION_SHIFT: u32 = 16;

/// One consistent view of the packed state word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Word {
    state: ConnectionState,
    forced: bool,
    auto: bool,
    generation: u64,
}

impl Word {
    fn unpack(raw: u64) -> Self {
        Self {
            state: ConnectionState::decode((raw & STATE_MASK) as u8),
            forced: raw & FORCED_BIT != 0,
            auto: raw & AUTO_BIT != 0,
            generation: raw >> GENERATION_SHIFT,
        }
    }

    fn pack(self) -> u64 {
        let mut raw = u64::from(self.state.encode()) | (self.generation << GENERATION_SHIFT);
        if self.forced {
            raw |= FORCED_BIT;
        }
        if self.auto {
            raw |= AUTO_BIT;
        }
        raw
    }

    fn next_generation(self) -> u64 {
        self.generation.wrapping_add(1) & (u64::MAX >> GENERATION_SHIFT)
    }
}

/// Shared connection state.
///
/// State, the forced-disconnect and auto-reconnect flags and the
/// connection generation share one atomic word. Driver-side transitions
/// name the generation they were started under and fail once a newer
/// connect or an operator disconnect has moved it on.
#[derive(Debug)]
pub struct StateCell {
    word: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl Default for StateCell {
    fn default() -> Self {
        let initial = Word {
            state: ConnectionState::Idle,
            forced: false,
            auto: true,
            generation: 0,
        };
        Self {
            word: AtomicU64::new(initial.pack()),
            reconnect_attempts: AtomicU32::new(0),
        }
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self) -> Word {
        Word::unpack(self.word.load(Ordering::SeqCst))
    }

    /// Apply `f` as one compare-and-set. Returns the word written.
    fn update(&self, f: impl Fn(Word) -> Option<Word>) -> Option<Word> {
        let mut written = None;
        self.word
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |raw| {
                written = f(Word::unpack(raw));
                written.map(Word::pack)
            })
            .ok()
            .and(written)
    }

    pub fn get(&self) -> ConnectionState {
        self.load().state
    }

    pub fn generation(&self) -> u64 {
        self.load().generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Idle/Disconnected → Connecting under a new generation, which is
    /// returned. `None` if already connecting or connected.
    pub fn begin_connect(&self) -> Option<u64> {
        self.update(|w| {
            (!w.state.is_active()).then(|| Word {
                state: ConnectionState::Connecting,
                generation: w.next_generation(),
                ..w
            })
        })
        .map(|w| w.generation)
    }

    /// Operator reconnect: like [`begin_connect`](Self::begin_connect) but
    /// also clears the forced flag, re-enables auto-reconnect and resets
    /// the attempt counter.
    pub fn restart(&self) -> Option<u64> {
        let generation = self
            .update(|w| {
                (!w.state.is_active()).then(|| Word {
                    state: ConnectionState::Connecting,
                    forced: false,
                    auto: true,
                    generation: w.next_generation(),
                })
            })?
            .generation;
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        Some(generation)
    }

    /// Connecting → Connected for `generation`; resets the attempt counter
    /// and flags.
    pub fn mark_connected(&self, generation: u64) -> bool {
        let moved = self.update(|w| {
            (w.generation == generation && w.state == ConnectionState::Connecting).then_some(Word {
                state: ConnectionState::Connected,
                forced: false,
                auto: true,
                ..w
            })
        });
        if moved.is_none() {
            return false;
        }
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        true
    }

    /// Connecting/Connected → Disconnected(reason) for `generation`.
    /// Forced reasons set the flag in the same step.
    pub fn mark_disconnected(&self, generation: u64, reason: DisconnectReason) -> bool {
        self.update(|w| {
            (w.generation == generation && w.state.is_active()).then_some(Word {
                state: ConnectionState::Disconnected(reason),
                forced: w.forced || reason.is_forced(),
                ..w
            })
        })
        .is_some()
    }

    /// Disconnected → Connecting for a retry of `generation`, only while
    /// automatic reconnection is allowed.
    pub fn retry(&self, generation: u64) -> bool {
        self.update(|w| {
            let allowed = w.generation == generation
                && matches!(w.state, ConnectionState::Disconnected(_))
                && w.auto
                && !w.forced;
            allowed.then_some(Word {
                state: ConnectionState::Connecting,
                ..w
            })
        })
        .is_some()
    }

    /// Disconnected → Disconnected(GaveUp) for `generation`.
    pub fn give_up(&self, generation: u64) -> bool {
        self.update(|w| {
            (w.generation == generation && matches!(w.state, ConnectionState::Disconnected(_)))
                .then_some(Word {
                    state: ConnectionState::Disconnected(DisconnectReason::GaveUp),
                    ..w
                })
        })
        .is_some()
    }

    /// Operator disconnect: every driver becomes stale, the state is
    /// `Disconnected(ClientClose)` and automatic reconnection is off.
    pub fn close(&self) -> u64 {
        self.update(|w| {
            Some(Word {
                state: ConnectionState::Disconnected(DisconnectReason::ClientClose),
                forced: true,
                auto: false,
                generation: w.next_generation(),
            })
        })
        .map_or(0, |w| w.generation)
    }

    pub fn is_forced_disconnect(&self) -> bool {
        self.load().forced
    }

    pub fn auto_reconnect(&self) -> bool {
        self.load().auto
    }

    /// Automatic reconnection is allowed right now.
    pub fn may_reconnect(&self) -> bool {
        let w = self.load();
        w.auto && !w.forced
    }

    /// Increment and return the attempt number (1-based).
    pub fn next_attempt(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }
}
