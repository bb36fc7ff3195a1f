//! Game sessions.
//!
//! A [`GameSession`] owns one match from the first start notification to the
//! moment its seats are released. It runs on a dedicated thread and is the only
//! code that ever touches its [`GameEngine`]: human moves reach it through the
//! session's [`EventQueue`], computer moves are searched synchronously on the
//! same thread.
//!
//! ```text
//! CREATED -> STARTING -> RUNNING -> ENDED -> TERMINATED
//!               ^                     |
//!               +------ rematch ------+
//! ```

pub mod manager;
mod queue;
mod relay;

use std::fmt::Display;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, trace, warn, Span};

use crate::ai::{AiKind, RandomChoice, SearchState, Strategy};
use crate::configuration::Configuration;
use crate::connection::{Connection, InboundRoute};
use crate::game::{Color, GameEngine, GameOutcome, Move, Piece};
use crate::protocol::ServerMessage;

pub use manager::SessionManager;
pub use queue::{event_queue, EventQueue, EventSender, SeatIndex, SessionEvent};
pub use relay::{ChatRelay, ChatSender};

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Multiplayer,
    Singleplayer(AiKind),
}

impl Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Multiplayer => write!(f, "multiplayer"),
            SessionKind::Singleplayer(ai) => write!(f, "singleplayer({ai:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Starting,
    Running,
    Ended,
    Terminated,
}

/// Observable lifecycle state of a session, written by its loop thread only.
#[derive(Debug)]
pub struct SessionStatus {
    state: Mutex<SessionState>,
    changed: Condvar,
}

impl SessionStatus {
    fn new() -> Self {
        SessionStatus {
            state: Mutex::new(SessionState::Created),
            changed: Condvar::new(),
        }
    }

    pub fn get(&self) -> SessionState {
        *self.state.lock().expect("poisoned")
    }

    fn set(&self, state: SessionState) {
        *self.state.lock().expect("poisoned") = state;
        self.changed.notify_all();
    }

    /// Block until `reached` holds for the current state. Returns `false` on
    /// timeout.
    pub fn wait_until(&self, reached: impl Fn(SessionState) -> bool, timeout: Duration) -> bool {
        let guard = self.state.lock().expect("poisoned");
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| !reached(*state))
            .expect("poisoned");
        reached(*guard)
    }
}

#[derive(Debug)]
enum Player {
    Human(Arc<Connection>),
    Computer(Strategy),
}

#[derive(Debug)]
struct Seat {
    player: Player,
    color: Color,
    wins: u32,
}

impl Seat {
    fn connection(&self) -> Option<&Arc<Connection>> {
        match &self.player {
            Player::Human(conn) => Some(conn),
            Player::Computer(_) => None,
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// Declined or expired rematch, or a leave after the game was over.
    Finished,
    /// The seat left or lost its connection while it still mattered.
    Forfeit(SeatIndex),
    /// Server-wide stop.
    Shutdown,
}

type Release = Box<dyn FnOnce(SessionId) + Send>;

pub struct GameSession {
    id: SessionId,
    kind: SessionKind,
    config: Configuration,
    engine: GameEngine,
    seats: [Seat; 2],
    queue: EventQueue,
    events: EventSender,
    status: Arc<SessionStatus>,
    relays: Vec<ChatRelay>,
    fallback: RandomChoice,
    release: Option<Release>,
    span: Span,
}

impl GameSession {
    /// Two humans. `first` plays RED in the first game.
    pub fn multiplayer(
        id: SessionId,
        first: Arc<Connection>,
        second: Arc<Connection>,
        config: Configuration,
    ) -> io::Result<GameSession> {
        let span = info_span!("session", id, kind = %SessionKind::Multiplayer);
        let relays = vec![
            ChatRelay::spawn(
                format!("relay-{id}-0"),
                second.clone(),
                config.chat_queue_len,
                span.clone(),
            )?,
            ChatRelay::spawn(
                format!("relay-{id}-1"),
                first.clone(),
                config.chat_queue_len,
                span.clone(),
            )?,
        ];
        let seats = [
            Seat {
                player: Player::Human(first),
                color: Color::Red,
                wins: 0,
            },
            Seat {
                player: Player::Human(second),
                color: Color::Yellow,
                wins: 0,
            },
        ];
        Ok(Self::assemble(id, SessionKind::Multiplayer, seats, relays, config, span))
    }

    /// A human against a computer strategy. The human plays RED first.
    pub fn singleplayer(id: SessionId, human: Arc<Connection>, ai: AiKind, config: Configuration) -> GameSession {
        let kind = SessionKind::Singleplayer(ai);
        let span = info_span!("session", id, kind = %kind);
        let seats = [
            Seat {
                player: Player::Human(human),
                color: Color::Red,
                wins: 0,
            },
            Seat {
                player: Player::Computer(Strategy::from_kind(ai, &config)),
                color: Color::Yellow,
                wins: 0,
            },
        ];
        Self::assemble(id, kind, seats, Vec::new(), config, span)
    }

    fn assemble(
        id: SessionId,
        kind: SessionKind,
        seats: [Seat; 2],
        relays: Vec<ChatRelay>,
        config: Configuration,
        span: Span,
    ) -> GameSession {
        let (events, queue) = event_queue();
        let session = GameSession {
            id,
            kind,
            config,
            engine: GameEngine::new(),
            seats,
            queue,
            events,
            status: Arc::new(SessionStatus::new()),
            relays,
            fallback: RandomChoice::new(),
            release: None,
            span,
        };
        for (seat, slot) in session.seats.iter().enumerate() {
            if let Some(conn) = slot.connection() {
                conn.set_route(InboundRoute {
                    session: id,
                    seat,
                    events: session.events.clone(),
                    chat: session.relays.get(seat).map(ChatRelay::sender),
                });
            }
        }
        session
    }

    /// Called once with the session id after routes are cleared and before
    /// the final notifications go out.
    pub fn on_release(mut self, release: impl FnOnce(SessionId) + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.seats
            .iter()
            .filter_map(|s| s.connection().cloned())
            .collect()
    }

    /// Run the session on its own thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("session-{}", self.id))
            .spawn(move || self.run())
    }

    /// Play games until the session ends, then release everything.
    pub fn run(mut self) {
        let span = self.span.clone();
        let _entered = span.enter();
        let ending = loop {
            if let Err(ending) = self.round() {
                break ending;
            }
            for seat in &mut self.seats {
                seat.color = seat.color.other();
            }
        };
        self.terminate(ending);
    }

    fn round(&mut self) -> Result<(), Ending> {
        self.start()?;
        self.play()?;
        self.await_rematch()
    }

    fn start(&mut self) -> Result<(), Ending> {
        self.status.set(SessionState::Starting);
        self.engine.reset();

        let scores = ServerMessage::Scores {
            red: self.seats[self.seat_of(Color::Red)].wins,
            yellow: self.seats[self.seat_of(Color::Yellow)].wins,
        };
        for (seat, slot) in self.seats.iter().enumerate() {
            let Some(conn) = slot.connection() else {
                continue;
            };
            let ack = conn
                .send(&ServerMessage::GameStarted)
                .and_then(|()| conn.send(&ServerMessage::Color { color: slot.color }))
                .and_then(|()| conn.send(&scores));
            if let Err(e) = ack {
                warn!(seat, error = %e, "start notification not delivered");
                return Err(Ending::Forfeit(seat));
            }
        }

        self.status.set(SessionState::Running);
        info!(red = self.seat_of(Color::Red), "game started");
        Ok(())
    }

    fn play(&mut self) -> Result<(), Ending> {
        while !self.engine.is_terminal() {
            let turn = self.engine.turn();
            self.broadcast(&ServerMessage::YourTurn { color: turn })?;
            let piece = self.take_turn(self.seat_of(turn))?;
            trace!(?piece, "move applied");
            self.broadcast(&ServerMessage::Move {
                column: piece.position.col,
            })?;
        }

        let winner = self.engine.outcome().and_then(GameOutcome::winner);
        if let Some(color) = winner {
            let seat = self.seat_of(color);
            self.seats[seat].wins += 1;
        }
        self.status.set(SessionState::Ended);
        info!(?winner, "game over");
        self.broadcast(&ServerMessage::GameOver { winner })
    }

    /// Next legal move of `seat`, applied to the engine.
    fn take_turn(&mut self, seat: SeatIndex) -> Result<Piece, Ending> {
        if let Player::Computer(strategy) = &mut self.seats[seat].player {
            let state = SearchState::from_engine(&self.engine);
            let mv = match strategy.next_move(&state) {
                Some(mv) => Some(mv),
                None => self.fallback.choose(self.engine.board()),
            };
            return match mv.map(|mv| self.engine.apply(mv)) {
                Some(Ok(piece)) => Ok(piece),
                other => {
                    error!(?other, "computer seat produced no legal move");
                    Err(Ending::Finished)
                }
            };
        }

        loop {
            match self.queue.take() {
                SessionEvent::Move { seat: from, column } if from == seat => {
                    match Move::from_wire(column).and_then(|mv| self.engine.apply(mv)) {
                        Ok(piece) => return Ok(piece),
                        Err(e) => debug!(seat, column, error = %e, "discarding move"),
                    }
                }
                SessionEvent::Move { seat: from, column } => {
                    debug!(seat = from, column, "discarding move out of turn")
                }
                SessionEvent::Rematch { seat, .. } => trace!(seat, "rematch answer during a game"),
                SessionEvent::Left { seat } | SessionEvent::Disconnected { seat } => {
                    return Err(Ending::Forfeit(seat))
                }
                SessionEvent::Shutdown => return Err(Ending::Shutdown),
            }
        }
    }

    /// Wait until every human accepts a rematch.
    fn await_rematch(&mut self) -> Result<(), Ending> {
        let mut accepted = self.seats.each_ref().map(|s| s.connection().is_none());
        let deadline = Instant::now() + self.config.rematch_timeout;

        while !accepted.iter().all(|a| *a) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.queue.take_timeout(remaining) {
                None => {
                    debug!("rematch window expired");
                    return Err(Ending::Finished);
                }
                Some(SessionEvent::Rematch { seat, accept: true }) => {
                    debug!(seat, "rematch accepted");
                    accepted[seat] = true;
                }
                Some(SessionEvent::Rematch { seat, accept: false }) | Some(SessionEvent::Left { seat }) => {
                    debug!(seat, "no rematch");
                    return Err(Ending::Finished);
                }
                Some(SessionEvent::Disconnected { seat }) => return Err(Ending::Forfeit(seat)),
                Some(SessionEvent::Shutdown) => return Err(Ending::Shutdown),
                Some(SessionEvent::Move { seat, column }) => {
                    debug!(seat, column, "discarding move after game over")
                }
            }
        }
        info!("rematch");
        Ok(())
    }

    fn terminate(mut self, ending: Ending) {
        if self.status.get() != SessionState::Ended {
            self.status.set(SessionState::Ended);
        }
        for relay in &mut self.relays {
            relay.stop();
        }
        for conn in self.connections() {
            conn.clear_route(self.id);
        }
        if let Some(release) = self.release.take() {
            release(self.id);
        }

        match ending {
            Ending::Shutdown => {
                for conn in self.connections() {
                    conn.close();
                }
            }
            Ending::Forfeit(seat) => {
                info!(seat, "forfeit");
                if let Some(opponent) = self.seats[1 - seat].connection() {
                    let _ = opponent.send(&ServerMessage::OpponentDisconnected);
                }
                self.notify_ended();
            }
            Ending::Finished => self.notify_ended(),
        }

        self.status.set(SessionState::Terminated);
        info!(?ending, "session terminated");
    }

    fn notify_ended(&self) {
        for conn in self.connections() {
            if conn.is_alive() {
                let _ = conn.send(&ServerMessage::SessionEnded);
            }
        }
    }

    /// Send to every human. The first seat whose delivery fails forfeits.
    fn broadcast(&self, message: &ServerMessage) -> Result<(), Ending> {
        let mut failed = None;
        for (seat, slot) in self.seats.iter().enumerate() {
            if let Some(conn) = slot.connection() {
                if let Err(e) = conn.send(message) {
                    debug!(seat, error = %e, "broadcast failed");
                    failed.get_or_insert(seat);
                }
            }
        }
        match failed {
            Some(seat) => Err(Ending::Forfeit(seat)),
            None => Ok(()),
        }
    }

    fn seat_of(&self, color: Color) -> SeatIndex {
        if self.seats[0].color == color {
            0
        } else {
            1
        }
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("seats", &self.seats)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}
