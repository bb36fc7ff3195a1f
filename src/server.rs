//! Listener and connection lifecycle.
//!
//! The [`Server`] owns the listening socket. It polls for new clients, gives
//! each one a [`Connection`] and a reader thread, and hands everything the
//! readers receive to the [`MessageDispatcher`]. Stopping is cooperative: the
//! accept loop checks a flag between polls, then tells every client the server
//! is going away, shuts all sessions down and closes every socket.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};
use tracing::{debug, info, info_span, instrument, trace, warn, Span};

use crate::configuration::Configuration;
use crate::connection::{Connection, ConnectionId, MessageReader};
use crate::dispatcher::MessageDispatcher;
use crate::error::ReceiveError;
use crate::protocol::ServerMessage;
use crate::session::SessionManager;

#[derive(Debug)]
pub struct Server {
    config: Configuration,
    listener: TcpListener,
    local_addr: SocketAddr,
    manager: Arc<SessionManager>,
    dispatcher: Arc<MessageDispatcher>,
    running: Arc<AtomicBool>,
    span: Span,
}

struct Peer {
    conn: Arc<Connection>,
    reader: JoinHandle<()>,
}

impl Server {
    /// Validate `config` and bind the listener.
    #[instrument(skip_all, fields(addr = %config.bind_addr()))]
    pub fn bind(config: Configuration) -> anyhow::Result<Server> {
        config.validate().context("invalid configuration")?;
        let listener = TcpListener::bind(config.bind_addr())
            .with_context(|| format!("could not bind {}", config.bind_addr()))?;
        listener
            .set_nonblocking(true)
            .context("server error: setting non-blocking to true")?;
        let local_addr = listener.local_addr()?;

        let manager = Arc::new(SessionManager::new(config));
        let dispatcher = Arc::new(MessageDispatcher::new(manager.clone(), config.control_workers)?);
        trace!(?config);
        Ok(Server {
            config,
            listener,
            local_addr,
            manager,
            dispatcher,
            running: Arc::new(AtomicBool::new(true)),
            span: info_span!("server", addr = %local_addr),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Accept clients until stopped, then tear everything down.
    pub fn run(self) -> anyhow::Result<()> {
        let span = self.span.clone();
        let _entered = span.enter();
        info!("listening");

        let mut peers: HashMap<ConnectionId, Peer> = HashMap::new();
        let mut next_id: ConnectionId = 1;
        while self.running.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let id = next_id;
                    next_id += 1;
                    match self.admit(id, stream) {
                        Ok(peer) => {
                            peers.insert(id, peer);
                        }
                        Err(e) => warn!(%addr, error = %e, "could not admit client"),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    peers.retain(|_, peer| !peer.reader.is_finished());
                    thread::sleep(self.config.accept_poll_interval);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    thread::sleep(self.config.accept_poll_interval);
                }
            }
        }

        self.shutdown(peers);
        Ok(())
    }

    /// Run on a background thread.
    pub fn spawn(self) -> anyhow::Result<RunningServer> {
        let addr = self.local_addr;
        let manager = self.manager.clone();
        let running = self.running.clone();
        let thread = thread::Builder::new()
            .name("listener".into())
            .spawn(move || self.run())
            .context("could not spawn listener thread")?;
        Ok(RunningServer {
            addr,
            manager,
            running,
            thread: Some(thread),
        })
    }

    fn admit(&self, id: ConnectionId, stream: TcpStream) -> anyhow::Result<Peer> {
        let conn = Arc::new(Connection::new(
            id,
            stream,
            self.config.max_frame_len,
            self.config.write_timeout,
        )?);
        let reader = conn.reader()?;
        let dispatcher = self.dispatcher.clone();
        let handle = conn.clone();
        let reader = thread::Builder::new()
            .name(format!("reader-{id}"))
            .spawn(move || read_loop(handle, reader, dispatcher))?;
        info!(id, peer = %conn.peer(), "client connected");
        Ok(Peer { conn, reader })
    }

    fn shutdown(&self, peers: HashMap<ConnectionId, Peer>) {
        info!(clients = peers.len(), "stopping");
        // a client that stopped reading costs one write timeout, not one per client
        thread::scope(|scope| {
            for peer in peers.values() {
                scope.spawn(move || {
                    let _ = peer.conn.send(&ServerMessage::ServerStopped);
                });
            }
        });
        self.manager.shutdown();
        for peer in peers.values() {
            peer.conn.close();
        }
        for (id, peer) in peers {
            if peer.reader.join().is_err() {
                warn!(id, "reader thread panicked");
            }
        }
        info!("stopped");
    }
}

fn read_loop(conn: Arc<Connection>, mut reader: MessageReader, dispatcher: Arc<MessageDispatcher>) {
    let span = conn.span().clone();
    let _entered = span.enter();
    loop {
        match reader.receive() {
            Ok(Some(message)) => {
                trace!(?message, "received");
                dispatcher.dispatch(&conn, message);
            }
            Ok(None) => {
                debug!("peer closed the stream");
                break;
            }
            Err(ReceiveError::Protocol(e)) => warn!(error = %e, "discarding frame"),
            Err(ReceiveError::Transport(e)) => {
                if conn.is_alive() {
                    warn!(error = %e, "transport failure");
                }
                break;
            }
        }
    }
    dispatcher.connection_lost(&conn);
}

/// A [`Server`] running on its own thread.
#[derive(Debug)]
pub struct RunningServer {
    addr: SocketAddr,
    manager: Arc<SessionManager>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Notify every client with `server-stopped`, end every session and wait
    /// for the listener to finish.
    pub fn stop(mut self) -> anyhow::Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow!("listener thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!(error = %e, "server did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::Client;
    use crate::protocol::ClientMessage;

    fn config() -> Configuration {
        Configuration::new()
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
            .with_control_workers(2)
    }

    #[test]
    fn binds_an_ephemeral_port() {
        let server = Server::bind(config()).unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[test]
    fn invalid_configuration_is_refused() {
        let err = Server::bind(config().with_control_workers(0)).unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn garbage_frame_does_not_drop_the_client() {
        let server = Server::bind(config()).unwrap().spawn().unwrap();
        let mut client = Client::connect(server.local_addr()).unwrap();
        client.send_raw(b"{not json").unwrap();
        client.send(&ClientMessage::MultiplayerRequest).unwrap();
        let reply = client.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply, Some(ServerMessage::Waiting));
        server.stop().unwrap();
    }
}
