use std::sync::Arc;

use tracing::{debug, trace};

use crate::connection::Connection;
use crate::protocol::{ClientMessage, MessageKind};
use crate::session::{SessionEvent, SessionManager};
use crate::worker_pool::WorkerPool;

/// Routes what a reader thread receives.
///
/// Moves go straight into the seat's session queue and text into the chat
/// relay toward the opponent, both without leaving the reader thread. Control
/// messages run on the worker pool, keyed by connection so one client's
/// requests are handled in the order it sent them.
#[derive(Debug)]
pub struct MessageDispatcher {
    manager: Arc<SessionManager>,
    pool: WorkerPool,
}

impl MessageDispatcher {
    pub fn new(manager: Arc<SessionManager>, workers: usize) -> anyhow::Result<MessageDispatcher> {
        Ok(MessageDispatcher {
            manager,
            pool: WorkerPool::new(workers)?,
        })
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    pub fn dispatch(&self, conn: &Arc<Connection>, message: ClientMessage) {
        trace!(parent: conn.span(), kind = ?message.kind(), "dispatching");
        match message {
            ClientMessage::Move { column } => match conn.route() {
                Some(route) => {
                    route.events.send(SessionEvent::Move {
                        seat: route.seat,
                        column,
                    });
                }
                None => debug!(parent: conn.span(), column, "move outside of a session"),
            },
            ClientMessage::Text { text } => match conn.route().and_then(|route| route.chat) {
                Some(chat) => {
                    chat.relay(text);
                }
                None => debug!(parent: conn.span(), "no one to relay text to"),
            },
            control => {
                debug_assert_eq!(control.kind(), MessageKind::Control);
                let manager = self.manager.clone();
                let conn = conn.clone();
                self.pool
                    .execute(conn.id(), move || manager.handle_control(&conn, control));
            }
        }
    }

    /// The reader saw the end of the stream or a transport failure.
    pub fn connection_lost(&self, conn: &Arc<Connection>) {
        conn.close();
        let manager = self.manager.clone();
        let lost = conn.clone();
        if !self.pool.execute(conn.id(), move || manager.disconnect(&lost)) {
            self.manager.disconnect(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;
    use std::time::Duration;

    use super::*;
    use crate::configuration::Configuration;
    use crate::connection::tests::pair;
    use crate::game::Color;
    use crate::protocol::{self, ServerMessage};
    use crate::session::SessionState;

    const WAIT: Duration = Duration::from_secs(5);

    /// Skip ahead to `until`.
    fn read(client: &mut TcpStream, until: ServerMessage) {
        loop {
            let msg: ServerMessage = protocol::read_message(client, 1 << 16).unwrap().unwrap();
            if msg == until {
                break;
            }
        }
    }

    #[test]
    fn routes_control_moves_and_text() {
        let manager = Arc::new(SessionManager::new(Configuration::new()));
        let dispatcher = MessageDispatcher::new(manager.clone(), 2).unwrap();
        let (a, mut ca) = pair(1);
        let (b, mut cb) = pair(2);
        let (a, b) = (Arc::new(a), Arc::new(b));
        for c in [&ca, &cb] {
            c.set_read_timeout(Some(WAIT)).unwrap();
        }

        dispatcher.dispatch(&a, ClientMessage::MultiplayerRequest);
        dispatcher.dispatch(&b, ClientMessage::MultiplayerRequest);
        read(&mut ca, ServerMessage::YourTurn { color: Color::Red });
        read(&mut cb, ServerMessage::YourTurn { color: Color::Red });

        dispatcher.dispatch(&a, ClientMessage::Text { text: "gl".into() });
        read(&mut cb, ServerMessage::Text { text: "gl".into() });

        dispatcher.dispatch(&a, ClientMessage::Move { column: 2 });
        read(&mut cb, ServerMessage::Move { column: 2 });

        let session = manager.session(manager.session_of(&a).unwrap()).unwrap();
        dispatcher.connection_lost(&b);
        assert!(session.wait_until(|s| s == SessionState::Terminated, WAIT));
        read(&mut ca, ServerMessage::OpponentDisconnected);
        assert!(!b.is_alive());
    }

    #[test]
    fn move_without_session_is_dropped() {
        let manager = Arc::new(SessionManager::new(Configuration::new()));
        let dispatcher = MessageDispatcher::new(manager.clone(), 1).unwrap();
        let (a, _ca) = pair(1);
        let a = Arc::new(a);
        dispatcher.dispatch(&a, ClientMessage::Move { column: 3 });
        dispatcher.dispatch(&a, ClientMessage::Text { text: "anyone?".into() });
        assert_eq!(manager.session_count(), 0);
        assert!(a.is_alive());
    }
}
