use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{trace, warn, Span};

use crate::connection::Connection;
use crate::protocol::ServerMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
enum RelayItem {
    Text(String),
    Stop,
}

/// Producer side of a [`ChatRelay`], handed to the reader of the talking player.
#[derive(Debug, Clone)]
pub struct ChatSender {
    tx: SyncSender<RelayItem>,
}

impl ChatSender {
    /// Queue `text` for delivery without blocking. Returns `false` if the text
    /// was dropped, either because the listener is too far behind or because
    /// the relay stopped.
    pub fn relay(&self, text: String) -> bool {
        match self.tx.try_send(RelayItem::Text(text)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("chat queue full, dropping text");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Forwards one player's chat to the other, in order, on its own thread.
///
/// At most `capacity` texts wait for delivery. Senders never block on a slow
/// listener; the overflow is dropped.
#[derive(Debug)]
pub struct ChatRelay {
    tx: SyncSender<RelayItem>,
    thread: Option<JoinHandle<()>>,
}

impl ChatRelay {
    pub fn spawn(
        name: String,
        target: Arc<Connection>,
        capacity: usize,
        span: Span,
    ) -> std::io::Result<ChatRelay> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let thread = thread::Builder::new().name(name).spawn(move || {
            let _entered = span.enter();
            for item in rx {
                match item {
                    RelayItem::Text(text) => {
                        trace!(to = target.id(), "relaying text");
                        if target.send(&ServerMessage::Text { text }).is_err() {
                            break;
                        }
                    }
                    RelayItem::Stop => break,
                }
            }
        })?;
        Ok(ChatRelay {
            tx,
            thread: Some(thread),
        })
    }

    pub fn sender(&self) -> ChatSender {
        ChatSender { tx: self.tx.clone() }
    }

    /// Stop and wait for the relay thread. Texts queued before the stop are
    /// still delivered.
    pub fn stop(&mut self) {
        let _ = self.tx.send(RelayItem::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ChatRelay {
    fn drop(&mut self) {
        self.stop();
    }
}
