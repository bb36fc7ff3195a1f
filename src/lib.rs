//! # Connect Four Server
//!
//! A threaded TCP server hosting Connect Four matches between remote players, or between a
//! player and a computer opponent.
//!
//! It provides:
//! - FIFO pairing of clients asking for a multiplayer match
//! - Single-player matches against a random, minimax or alpha-beta opponent
//! - One authoritative game loop per session, fed by a single ordered event queue
//! - Chat relayed between the two players of a session
//! - Rematches with alternating colors and a running score
//!
//! Every client gets one reader thread. Moves go to the session queue, chat goes to a relay
//! thread toward the opponent and control messages (join, leave, disconnect, rematch) are
//! handled by a small worker pool so a slow handler never stalls a reader.
//!
//! # Documentation Overview
//!
//! - For the listener and connection lifecycle, see the [`server`] module.
//! - For the rules, see [`game`]; for the computer opponents, see [`ai`].
//! - For the session state machine and the rematch flow, see [`session`].
//! - For the wire format, see [`protocol`]; a blocking [`client`] speaks it.
//! - For tuning the server, see [`Configuration`](crate::configuration::Configuration).
//!
//! # Usage Example
//!
//! ```no_run
//! use connect_four_server::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new().with_bind_addr("0.0.0.0:4444".parse()?);
//!     let server = Server::bind(config)?;
//!     println!("listening on {}", server.local_addr());
//!     server.run()
//! }
//! ```
//!
//! # Protocol
//!
//! - Client -> Server : `multiplayer-request`, `singleplayer-request`, `move`, `text`, `leave`,
//!   `disconnect`, `rematch-response`
//! - Server -> Client : `waiting`, `game-started`, `color`, `scores`, `move`, `text`,
//!   `your-turn`, `game-over`, `session-ended`, `opponent-disconnected`, `server-stopped`

pub use anyhow;
pub mod ai;
pub mod client;
pub mod configuration;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod logger;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
mod worker_pool;

/// Commonly used types for quick access.
///
/// ```rust
/// use connect_four_server::prelude::*;
/// ```
pub mod prelude {
    pub use crate::ai::{AiKind, Strategy};
    pub use crate::client::Client;
    pub use crate::configuration::Configuration;
    pub use crate::game::{Color, GameEngine, Move};
    pub use crate::protocol::{ClientMessage, ServerMessage};
    pub use crate::server::{RunningServer, Server};
}
