use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard};

use crate::ERR_POISONED_LOCK;

/// The single-slot unblock signal of one gate direction.
///
/// The sending side never blocks: delivery is a best-effort `try_send` into a
/// slot of one, and a token that cannot be accepted is dropped. That is safe
/// because the gate's readiness flag is authoritative - a waiter re-checks it
/// before suspending again, so at most one pending token is ever needed.
///
/// The receiving side lives behind a mutex, and holding that mutex is the
/// direction's exclusivity lock: the second of two concurrent waiters blocks
/// there, before it can touch the direction's state.
#[derive(Debug)]
pub(crate) struct Signal {
    tx: SyncSender<()>,
    rx: Mutex<Receiver<()>>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::sync_channel(1);

        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Best-effort delivery of one wake-up token. Never blocks.
    pub(crate) fn notify(&self) {
        // A full slot means a wake-up is already pending, and the receiver
        // cannot disconnect while `self` is alive. Either way the token is
        // simply dropped.
        drop(self.tx.try_send(()));
    }

    /// Claims the waiter slot for this direction, blocking while another
    /// waiter holds it.
    pub(crate) fn listen(&self) -> MutexGuard<'_, Receiver<()>> {
        self.rx.lock().expect(ERR_POISONED_LOCK)
    }
}
