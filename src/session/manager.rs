use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, info_span, instrument, warn, Span};

use super::{EventSender, GameSession, SessionEvent, SessionId, SessionKind, SessionState, SessionStatus};
use crate::ai::AiKind;
use crate::configuration::Configuration;
use crate::connection::{Connection, ConnectionId};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::ClientRegistry;

/// What the manager keeps of a running session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    kind: SessionKind,
    events: EventSender,
    status: Arc<SessionStatus>,
    connections: Vec<Arc<Connection>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn new(session: &GameSession) -> Self {
        SessionHandle {
            id: session.id(),
            kind: session.kind(),
            events: session.events(),
            status: session.status(),
            connections: session.connections(),
            thread: Mutex::new(None),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn state(&self) -> SessionState {
        self.status.get()
    }

    pub fn wait_until(&self, reached: impl Fn(SessionState) -> bool, timeout: Duration) -> bool {
        self.status.wait_until(reached, timeout)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.id()).collect()
    }

    fn join(&self) {
        let thread = self.thread.lock().expect("poisoned").take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!(session = self.id, "session thread panicked");
            }
        }
    }
}

/// Live sessions by id. A session removes itself when it terminates.
///
/// Once [`close`](Self::close)d the registry refuses new sessions, so every
/// session that made it in is seen by the shutdown that closed it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<Sessions>,
}

#[derive(Debug, Default)]
struct Sessions {
    live: HashMap<SessionId, Arc<SessionHandle>>,
    closed: bool,
}

impl SessionRegistry {
    /// `false` if the registry is closed and `handle` was not added.
    fn insert(&self, handle: Arc<SessionHandle>) -> bool {
        let mut inner = self.inner.lock().expect("poisoned");
        if inner.closed {
            return false;
        }
        inner.live.insert(handle.id, handle);
        true
    }

    fn release(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.inner.lock().expect("poisoned").live.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.inner.lock().expect("poisoned").live.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("poisoned").live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further sessions and return the ones still live.
    fn close(&self) -> Vec<Arc<SessionHandle>> {
        let mut inner = self.inner.lock().expect("poisoned");
        inner.closed = true;
        inner.live.values().cloned().collect()
    }
}

/// Creates sessions, routes control messages to them and tears them down.
#[derive(Debug)]
pub struct SessionManager {
    config: Configuration,
    clients: ClientRegistry,
    sessions: Arc<SessionRegistry>,
    next_id: AtomicU64,
    stopping: AtomicBool,
    span: Span,
}

impl SessionManager {
    pub fn new(config: Configuration) -> Self {
        SessionManager {
            config,
            clients: ClientRegistry::new(),
            sessions: Arc::new(SessionRegistry::default()),
            next_id: AtomicU64::new(1),
            stopping: AtomicBool::new(false),
            span: info_span!("manager"),
        }
    }

    /// Entry point for join / leave / disconnect / rematch messages.
    pub fn handle_control(&self, conn: &Arc<Connection>, message: ClientMessage) {
        match message {
            ClientMessage::MultiplayerRequest => self.request_multiplayer(conn),
            ClientMessage::SingleplayerRequest { ai } => self.request_singleplayer(conn, ai),
            ClientMessage::Leave => self.leave(conn),
            ClientMessage::Disconnect => self.disconnect(conn),
            ClientMessage::RematchResponse { accept } => self.rematch(conn, accept),
            other => warn!(parent: &self.span, ?other, "not a control message"),
        }
    }

    #[instrument(parent = &self.span, skip_all, fields(conn = conn.id()))]
    pub fn request_multiplayer(&self, conn: &Arc<Connection>) {
        if !self.accepting(conn) {
            return;
        }
        if conn.send(&ServerMessage::Waiting).is_err() {
            return;
        }
        if let Some((first, second)) = self.clients.add_waiting(conn.clone()) {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            info!(session = id, first = first.id(), second = second.id(), "paired");
            match GameSession::multiplayer(id, first.clone(), second.clone(), self.config) {
                Ok(session) => self.start(session),
                Err(e) => {
                    error!(error = %e, "could not open multiplayer session");
                    for conn in [first, second] {
                        let _ = conn.send(&ServerMessage::SessionEnded);
                    }
                }
            }
        }
    }

    /// Open a session against the computer right away. Leaves the waiting
    /// room if the client was in it.
    #[instrument(parent = &self.span, skip_all, fields(conn = conn.id(), ai = ?ai))]
    pub fn request_singleplayer(&self, conn: &Arc<Connection>, ai: AiKind) {
        if !self.accepting(conn) {
            return;
        }
        self.clients.remove(conn.id());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(session = id, "singleplayer");
        self.start(GameSession::singleplayer(id, conn.clone(), ai, self.config));
    }

    pub fn leave(&self, conn: &Arc<Connection>) {
        if self.clients.remove(conn.id()) {
            debug!(parent: conn.span(), "left the waiting room");
            let _ = conn.send(&ServerMessage::SessionEnded);
        } else if let Some(route) = conn.route() {
            route.events.send(SessionEvent::Left { seat: route.seat });
        } else {
            debug!(parent: conn.span(), "nothing to leave");
        }
    }

    /// Forget `conn` everywhere and close it. Also the path taken when a
    /// connection is lost.
    pub fn disconnect(&self, conn: &Arc<Connection>) {
        self.clients.remove(conn.id());
        if let Some(route) = conn.route() {
            route.events.send(SessionEvent::Disconnected { seat: route.seat });
        }
        conn.close();
    }

    pub fn rematch(&self, conn: &Arc<Connection>, accept: bool) {
        match conn.route() {
            Some(route) => {
                route.events.send(SessionEvent::Rematch {
                    seat: route.seat,
                    accept,
                });
            }
            None => debug!(parent: conn.span(), "rematch answer outside of a session"),
        }
    }

    pub fn session_of(&self, conn: &Connection) -> Option<SessionId> {
        conn.route().map(|route| route.session)
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.clients.waiting_count()
    }

    /// Interrupt every session and wait for their threads. Sessions close
    /// their connections on the way out.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::Release);
        let handles = self.sessions.close();
        info!(parent: &self.span, sessions = handles.len(), "shutting sessions down");
        for handle in &handles {
            handle.events.send(SessionEvent::Shutdown);
        }
        for handle in &handles {
            handle.join();
        }
    }

    fn accepting(&self, conn: &Connection) -> bool {
        if self.stopping.load(Ordering::Acquire) {
            debug!("stopping, request ignored");
            return false;
        }
        if let Some(session) = self.session_of(conn) {
            debug!(session, "already seated, request ignored");
            return false;
        }
        true
    }

    fn start(&self, session: GameSession) {
        let id = session.id();
        let sessions = self.sessions.clone();
        let session = session.on_release(move |id| {
            sessions.release(id);
        });
        let handle = Arc::new(SessionHandle::new(&session));
        // a request that passed `accepting` just before shutdown lands here
        if !self.sessions.insert(handle.clone()) {
            debug!(session = id, "stopping, session discarded");
            for conn in &handle.connections {
                conn.clear_route(id);
            }
            return;
        }

        match session.spawn() {
            Ok(thread) => *handle.thread.lock().expect("poisoned") = Some(thread),
            Err(e) => {
                error!(session = id, error = %e, "could not spawn session thread");
                self.sessions.release(id);
                for conn in &handle.connections {
                    conn.clear_route(id);
                    let _ = conn.send(&ServerMessage::SessionEnded);
                }
            }
        }
    }
}
