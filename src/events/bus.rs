//! # Event bus connecting workers to the coordinator.
//!
//! [`Bus`] is a thin wrapper around an unbounded [`tokio::sync::mpsc`] channel:
//! many workers publish, exactly one coordinator consumes through [`EventStream`].
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Consumer (one):
//!   Worker p1 ──┐
//!   Worker p2 ──┼──────► Bus ───────► EventStream ───► Consumer::consume_until(N)
//!   Worker pN ──┤   (unbounded mpsc)                        │
//!   Runner    ──┘                                           ▼
//!                                                  ListenerRegistry::dispatch
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: the queue is unbounded, so producers never wait on the
//!   consumer (which may itself be busy running listeners).
//! - **Per-producer FIFO**: events from one worker arrive in emission order.
//! - **Paired copies**: [`Bus::publish_both`] enqueues the generic event and its
//!   specific copy as one item, so the consumer never sees one without the other.
//! - **No replay**: the stream only yields events published after it was created.
//! - **Close detection**: once every [`Bus`] handle is dropped the stream ends.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use super::event::Event;

/// Producer side of the event channel.
///
/// Cheap to clone; every worker gets its own handle.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: mpsc::UnboundedSender<Batch>,
}

/// One queue item: a lone event or a generic/specific pair.
#[derive(Debug)]
enum Batch {
    One(Event),
    Both(Event, Event),
}

impl Bus {
    /// Creates a bus and its single consumer stream.
    pub fn new() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel::<Batch>();
        (
            Self { tx },
            EventStream {
                rx,
                pending: VecDeque::new(),
            },
        )
    }

    /// Publishes one event.
    ///
    /// If the consumer is gone the event is dropped (this function still returns immediately).
    pub fn publish(&self, ev: Event) {
        self.send(Batch::One(ev));
    }

    /// Publishes the generic event followed by its owner-specific copy.
    pub fn publish_both(&self, ev: Event) {
        let specific = ev.to_specific();
        self.send(Batch::Both(ev, specific));
    }

    fn send(&self, batch: Batch) {
        if let Err(err) = self.tx.send(batch) {
            let (Batch::One(ev) | Batch::Both(ev, _)) = err.0;
            tracing::trace!(kind = %ev.kind, "event dropped: consumer closed");
        }
    }

    /// True once the consumer stream was dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the event channel.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Batch>,
    pending: VecDeque<Event>,
}

impl EventStream {
    /// Waits for the next event; `None` once every [`Bus`] handle is dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        if let Some(ev) = self.pending.pop_front() {
            return Some(ev);
        }
        let batch = self.rx.recv().await?;
        Some(self.unpack(batch))
    }

    /// Returns an already queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        if let Some(ev) = self.pending.pop_front() {
            return Some(ev);
        }
        let batch = self.rx.try_recv().ok()?;
        Some(self.unpack(batch))
    }

    fn unpack(&mut self, batch: Batch) -> Event {
        match batch {
            Batch::One(ev) => ev,
            Batch::Both(generic, specific) => {
                self.pending.push_back(specific);
                generic
            }
        }
    }
}
