//! One client socket.
//!
//! A [`Connection`] is shared (`Arc`) between its reader thread, the registry
//! and whatever session seats it. Writes are serialized by an internal lock so
//! a session broadcast and a chat relay never interleave bytes of two frames.
//! Reading happens through a separate [`MessageReader`] owned by the reader
//! thread alone.
//!
//! Every write is bounded by a timeout. A client that stops reading fills its
//! socket buffer, the next write times out and the connection is closed like
//! any other transport failure.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info_span, trace, warn, Span};

use crate::error::{ReceiveError, TransportError};
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::session::{ChatSender, EventSender, SeatIndex, SessionId};

pub type ConnectionId = u64;

/// Where the inbound move and text traffic of a seated connection goes.
#[derive(Debug, Clone)]
pub struct InboundRoute {
    pub session: SessionId,
    pub seat: SeatIndex,
    pub events: EventSender,
    /// `None` when the opponent is a computer.
    pub chat: Option<ChatSender>,
}

#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Mutex<BufWriter<TcpStream>>,
    control: TcpStream,
    alive: AtomicBool,
    max_frame_len: usize,
    route: Mutex<Option<InboundRoute>>,
    span: Span,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        max_frame_len: usize,
        write_timeout: Duration,
    ) -> std::io::Result<Connection> {
        let peer = stream.peer_addr()?;
        // accepted sockets may inherit the listener's non-blocking mode
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(write_timeout))?;
        let control = stream.try_clone()?;
        Ok(Connection {
            id,
            peer,
            writer: Mutex::new(BufWriter::new(stream)),
            control,
            alive: AtomicBool::new(true),
            max_frame_len,
            route: Mutex::new(None),
            span: info_span!("connection", id, %peer),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Send one message. A failed or timed out write closes the connection,
    /// a frame may have been cut in half.
    pub fn send(&self, message: &ServerMessage) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().expect("poisoned");
        // another writer may have failed while this one waited for the lock
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let result = protocol::write_message(&mut *writer, message, self.max_frame_len);
        match &result {
            Ok(()) => trace!(parent: &self.span, ?message, "sent"),
            Err(TransportError::Io(e)) => {
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) {
                    warn!(parent: &self.span, "client stopped reading, dropping it");
                } else {
                    debug!(parent: &self.span, error = %e, "write failed");
                }
                self.close();
            }
            Err(e) => debug!(parent: &self.span, error = %e, "message not sent"),
        }
        result
    }

    /// Independent read half for the connection's reader thread.
    pub fn reader(&self) -> std::io::Result<MessageReader> {
        Ok(MessageReader {
            stream: BufReader::new(self.control.try_clone()?),
            max_frame_len: self.max_frame_len,
        })
    }

    /// Mark dead and shut the socket down, which wakes a blocked reader.
    /// Idempotent.
    pub fn close(&self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            debug!(parent: &self.span, "closing");
        }
        let _ = self.control.shutdown(Shutdown::Both);
    }

    pub fn route(&self) -> Option<InboundRoute> {
        self.route.lock().expect("poisoned").clone()
    }

    pub fn set_route(&self, route: InboundRoute) {
        *self.route.lock().expect("poisoned") = Some(route);
    }

    /// Drop the route, but only if it still points at `session`.
    pub fn clear_route(&self, session: SessionId) {
        let mut guard = self.route.lock().expect("poisoned");
        if guard.as_ref().is_some_and(|r| r.session == session) {
            *guard = None;
        }
    }
}

/// Read half of a [`Connection`].
#[derive(Debug)]
pub struct MessageReader {
    stream: BufReader<TcpStream>,
    max_frame_len: usize,
}

impl MessageReader {
    /// Next message, `Ok(None)` once the peer closed the stream.
    ///
    /// A [`ReceiveError::Protocol`] only spoils the current frame and the
    /// reader can go on; a [`ReceiveError::Transport`] is final.
    pub fn receive(&mut self) -> Result<Option<ClientMessage>, ReceiveError> {
        protocol::read_message(&mut self.stream, self.max_frame_len)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::TcpListener;

    use super::*;
    use crate::session::event_queue;

    /// A server side connection and the raw client socket talking to it.
    pub(crate) fn pair(id: ConnectionId) -> (Connection, TcpStream) {
        pair_with_write_timeout(id, Duration::from_secs(5))
    }

    pub(crate) fn pair_with_write_timeout(id: ConnectionId, timeout: Duration) -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (Connection::new(id, server, 64 * 1024, timeout).unwrap(), client)
    }

    #[test]
    fn send_reaches_peer() {
        let (conn, mut client) = pair(1);
        conn.send(&ServerMessage::Waiting).unwrap();
        let msg: Option<ServerMessage> = protocol::read_message(&mut client, 1024).unwrap();
        assert_eq!(msg, Some(ServerMessage::Waiting));
    }

    #[test]
    fn receive_reads_client_frames() {
        let (conn, mut client) = pair(2);
        let mut reader = conn.reader().unwrap();
        protocol::write_message(&mut client, &ClientMessage::Move { column: 4 }, 1024).unwrap();
        drop(client);
        assert_eq!(reader.receive().unwrap(), Some(ClientMessage::Move { column: 4 }));
        assert_eq!(reader.receive().unwrap(), None);
    }

    #[test]
    fn close_wakes_reader_and_refuses_sends() {
        let (conn, _client) = pair(3);
        let mut reader = conn.reader().unwrap();
        let handle = std::thread::spawn(move || reader.receive());
        std::thread::sleep(std::time::Duration::from_millis(20));
        conn.close();
        let result = handle.join().unwrap();
        assert!(matches!(result, Ok(None) | Err(ReceiveError::Transport(_))));
        assert!(!conn.is_alive());
        assert!(matches!(
            conn.send(&ServerMessage::Waiting),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn client_that_stops_reading_is_closed() {
        let (conn, _client) = pair_with_write_timeout(5, Duration::from_millis(100));
        let mut reader = conn.reader().unwrap();
        let text = "x".repeat(60_000);

        let failed = (0..2000).find_map(|_| conn.send(&ServerMessage::Text { text: text.clone() }).err());
        assert!(matches!(failed, Some(TransportError::Io(_))));
        assert!(!conn.is_alive());
        // the socket is shut down, so the reader thread would wake up too
        assert!(matches!(reader.receive(), Ok(None) | Err(ReceiveError::Transport(_))));
        assert!(matches!(
            conn.send(&ServerMessage::Waiting),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn clear_route_ignores_other_sessions() {
        let (conn, _client) = pair(4);
        let (events, _queue) = event_queue();
        conn.set_route(InboundRoute {
            session: 7,
            seat: 0,
            events,
            chat: None,
        });
        conn.clear_route(8);
        assert_eq!(conn.route().map(|r| r.session), Some(7));
        conn.clear_route(7);
        assert!(conn.route().is_none());
    }
}
