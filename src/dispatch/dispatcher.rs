//! Callback dispatcher.
//!
//! Events are queued in order by the connection and drained by whichever
//! thread calls [`Dispatcher::dispatch`] first. The callback lock is only
//! ever try-locked: a second caller (another worker, or the callback itself
//! re-entering through the engine) returns immediately instead of blocking,
//! and the current holder picks up anything queued in the meantime.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::event::{Event, RxCallback, TxCallback};

pub(crate) enum Handler {
    Tx(TxCallback),
    Rx(RxCallback),
}

impl Handler {
    fn invoke(&mut self, event: Event) {
        match (self, event) {
            (Handler::Tx(cb), Event::Tx(completion)) => cb(completion),
            (Handler::Rx(cb), Event::Rx(delivery)) => cb(delivery),
            (_, event) => {
                tracing::error!(?event, "event does not match connection role, dropped");
            }
        }
    }
}

/// Per-connection ordered event queue plus its callback.
pub(crate) struct Dispatcher {
    handler: Mutex<Handler>,
    ready: Mutex<VecDeque<Event>>,
    dispatching: Mutex<Option<ThreadId>>,
    delivered: AtomicU64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .field("delivered", &self.delivered())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(handler: Handler) -> Self {
        Self {
            handler: Mutex::new(handler),
            ready: Mutex::new(VecDeque::new()),
            dispatching: Mutex::new(None),
            delivered: AtomicU64::new(0),
        }
    }

    /// Queue an event behind everything already queued.
    pub fn push(&self, event: Event) {
        self.ready.lock().push_back(event);
    }

    /// Events queued but not yet delivered.
    pub fn pending(&self) -> usize {
        self.ready.lock().len()
    }

    /// Events delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// No event queued and no callback running.
    ///
    /// Events are only popped with the handler held, so the queue must be
    /// read before the handler: an empty queue followed by an unlocked
    /// handler means the last pop's callback has returned.
    pub fn is_idle(&self) -> bool {
        self.ready.lock().is_empty() && !self.handler.is_locked()
    }

    /// Whether the calling thread is inside this dispatcher's callback.
    pub fn is_dispatching_on_current_thread(&self) -> bool {
        *self.dispatching.lock() == Some(thread::current().id())
    }

    /// Deliver queued events in order. Returns how many this call delivered.
    pub fn dispatch(&self) -> usize {
        let mut delivered = 0;
        loop {
            let Some(mut handler) = self.handler.try_lock() else {
                return delivered;
            };
            *self.dispatching.lock() = Some(thread::current().id());

            loop {
                let event = self.ready.lock().pop_front();
                let Some(event) = event else { break };
                handler.invoke(event);
                self.delivered.fetch_add(1, Ordering::AcqRel);
                delivered += 1;
            }

            *self.dispatching.lock() = None;
            drop(handler);

            // An event pushed after the drain but before the unlock would
            // otherwise wait for the next wakeup.
            if self.ready.lock().is_empty() {
                return delivered;
            }
        }
    }
}
