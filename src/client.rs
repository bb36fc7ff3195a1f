//! Blocking client for the wire protocol.
//!
//! Enough to drive the server from a terminal front-end or from tests:
//!
//! ```no_run
//! use connect_four_server::client::Client;
//! use connect_four_server::protocol::{ClientMessage, ServerMessage};
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut client = Client::connect("127.0.0.1:4444")?;
//!     client.send(&ClientMessage::MultiplayerRequest)?;
//!     let started = client.wait_for(
//!         |msg| matches!(msg, ServerMessage::GameStarted),
//!         Duration::from_secs(60),
//!     )?;
//!     println!("{started:?}");
//!     Ok(())
//! }
//! ```

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use crate::error::{ReceiveError, TransportError};
use crate::protocol::{self, ClientMessage, ServerMessage};

const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug)]
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    local_addr: SocketAddr,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> anyhow::Result<Client> {
        let stream = TcpStream::connect(addr).context("could not connect to server")?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Client {
            reader,
            writer: BufWriter::new(stream),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        protocol::write_message(&mut self.writer, message, MAX_FRAME_LEN)
    }

    /// Send an arbitrary frame body, valid or not.
    pub fn send_raw(&mut self, body: &[u8]) -> Result<(), TransportError> {
        protocol::write_frame(&mut self.writer, body, MAX_FRAME_LEN)
    }

    /// Block for the next message. `Ok(None)` once the server closed the
    /// stream.
    pub fn recv(&mut self) -> Result<Option<ServerMessage>, ReceiveError> {
        self.reader.get_ref().set_read_timeout(None).map_err(TransportError::from)?;
        protocol::read_message(&mut self.reader, MAX_FRAME_LEN)
    }

    /// Like [`recv`](Self::recv) but fails with a timed out I/O error after
    /// `timeout`. A timeout in the middle of a frame leaves the stream out of
    /// sync, so only use it with generous timeouts.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ServerMessage>, ReceiveError> {
        self.reader
            .get_ref()
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
            .map_err(TransportError::from)?;
        protocol::read_message(&mut self.reader, MAX_FRAME_LEN)
    }

    /// Skip messages until one satisfies `wanted`.
    pub fn wait_for(
        &mut self,
        mut wanted: impl FnMut(&ServerMessage) -> bool,
        timeout: Duration,
    ) -> anyhow::Result<ServerMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("timed out waiting for a message");
            }
            match self.recv_timeout(remaining)? {
                Some(msg) if wanted(&msg) => return Ok(msg),
                Some(_) => continue,
                None => bail!("server closed the connection"),
            }
        }
    }

    pub fn close(self) -> io::Result<()> {
        self.writer.get_ref().shutdown(Shutdown::Both)
    }
}

/// `true` when `err` is the read timeout of [`Client::recv_timeout`].
pub fn is_timeout(err: &ReceiveError) -> bool {
    matches!(
        err,
        ReceiveError::Transport(TransportError::Io(e))
            if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    )
}
