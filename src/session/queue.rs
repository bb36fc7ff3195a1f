use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Index of a seat inside its session (0 or 1). Stays fixed across rematches
/// while the seat's color rotates.
pub type SeatIndex = usize;

/// Everything that can change a session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Move { seat: SeatIndex, column: i64 },
    Rematch { seat: SeatIndex, accept: bool },
    Left { seat: SeatIndex },
    Disconnected { seat: SeatIndex },
    /// Wakes a blocked [`EventQueue::take`] so the session can tear down.
    Shutdown,
}

/// Producer half of a session queue. Cloned into every seat's route.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<SessionEvent>,
}

impl EventSender {
    /// `false` once the session has gone away.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Blocking FIFO consumed by the session loop only. All producers feed the
/// same channel, so events are handled strictly in the order they arrived.
#[derive(Debug)]
pub struct EventQueue {
    rx: Receiver<SessionEvent>,
}

impl EventQueue {
    /// Block until the next event. A queue without producers left reads as
    /// [`SessionEvent::Shutdown`].
    pub fn take(&self) -> SessionEvent {
        self.rx.recv().unwrap_or(SessionEvent::Shutdown)
    }

    /// Like [`take`](Self::take) but gives up after `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(SessionEvent::Shutdown),
        }
    }
}

pub fn event_queue() -> (EventSender, EventQueue) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventQueue { rx })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn preserves_order_per_producer_under_concurrency() {
        const PER_SEAT: i64 = 500;
        let (tx, queue) = event_queue();
        let barrier = Arc::new(Barrier::new(2));

        let producers: Vec<_> = (0..2)
            .map(|seat| {
                let tx = tx.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for column in 0..PER_SEAT {
                        assert!(tx.send(SessionEvent::Move { seat, column }));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut next = [0i64; 2];
        for _ in 0..2 * PER_SEAT {
            match queue.take() {
                SessionEvent::Move { seat, column } => {
                    assert_eq!(column, next[seat], "seat {seat} reordered");
                    next[seat] += 1;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(next, [PER_SEAT, PER_SEAT]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn consumer_sees_strict_arrival_order(
            producers in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 1..40), 2..5)
        ) {
            // every producer stamps its event from a shared counter and sends
            // it under the same lock, so the stamps are the arrival order
            let (tx, queue) = event_queue();
            let clock = Arc::new(Mutex::new(0i64));
            let total: usize = producers.iter().map(Vec::len).sum();

            let handles: Vec<_> = producers
                .into_iter()
                .enumerate()
                .map(|(seat, pauses)| {
                    let tx = tx.clone();
                    let clock = clock.clone();
                    thread::spawn(move || {
                        for pause in pauses {
                            if pause {
                                thread::yield_now();
                            }
                            let mut now = clock.lock().unwrap();
                            tx.send(SessionEvent::Move { seat, column: *now });
                            *now += 1;
                        }
                    })
                })
                .collect();

            for expected in 0..total as i64 {
                match queue.take() {
                    SessionEvent::Move { column, .. } => prop_assert_eq!(column, expected),
                    other => prop_assert!(false, "unexpected {:?}", other),
                }
            }
            for h in handles {
                h.join().unwrap();
            }
            prop_assert_eq!(queue.take_timeout(Duration::from_millis(1)), None);
        }
    }

    #[test]
    fn shutdown_wakes_blocked_take() {
        let (tx, queue) = event_queue();
        let consumer = thread::spawn(move || queue.take());
        thread::sleep(Duration::from_millis(20));
        tx.send(SessionEvent::Shutdown);
        assert_eq!(consumer.join().unwrap(), SessionEvent::Shutdown);
    }

    #[test]
    fn dropped_producers_read_as_shutdown() {
        let (tx, queue) = event_queue();
        drop(tx);
        assert_eq!(queue.take(), SessionEvent::Shutdown);
        assert_eq!(
            queue.take_timeout(Duration::from_millis(5)),
            Some(SessionEvent::Shutdown)
        );
    }

    #[test]
    fn take_timeout_expires() {
        let (_tx, queue) = event_queue();
        assert_eq!(queue.take_timeout(Duration::from_millis(5)), None);
    }
}
