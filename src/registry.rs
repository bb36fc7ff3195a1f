use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::connection::{Connection, ConnectionId};

/// Clients waiting for a multiplayer opponent, first come first served.
///
/// Pairing happens under the same lock as insertion, so two concurrent
/// requests can never both take the same waiting client.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    waiting: Mutex<VecDeque<Arc<Connection>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `conn`. If that makes two live clients available, the two oldest
    /// are removed and returned as `(first, second)`.
    ///
    /// A connection already waiting is not queued twice.
    pub fn add_waiting(&self, conn: Arc<Connection>) -> Option<(Arc<Connection>, Arc<Connection>)> {
        let mut waiting = self.waiting.lock().expect("poisoned");
        waiting.retain(|c| c.is_alive());
        if waiting.iter().any(|c| c.id() == conn.id()) {
            return None;
        }
        debug!(parent: conn.span(), queued = waiting.len(), "waiting for an opponent");
        waiting.push_back(conn);
        if waiting.len() < 2 {
            return None;
        }
        let first = waiting.pop_front()?;
        let second = waiting.pop_front()?;
        Some((first, second))
    }

    /// Drop `id` from the queue. Returns whether it was waiting.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut waiting = self.waiting.lock().expect("poisoned");
        let before = waiting.len();
        waiting.retain(|c| c.id() != id);
        before != waiting.len()
    }

    pub fn is_waiting(&self, id: ConnectionId) -> bool {
        self.waiting
            .lock()
            .expect("poisoned")
            .iter()
            .any(|c| c.id() == id)
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.lock().expect("poisoned").len()
    }
}
