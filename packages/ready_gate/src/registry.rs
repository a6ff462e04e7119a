use std::sync::{Arc, Mutex};

use foldhash::{HashMap, HashMapExt};

use crate::{Dir, ERR_POISONED_LOCK, Gate};

/// Identity of one connection, as known to the transport layer.
///
/// The value is whatever handle the native transport uses for the connection
/// (a socket or descriptor number); the registry only needs it to be unique
/// among live connections.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Token(pub u64);

/// The registration table the external event multiplexer delivers into.
///
/// Gates register on pool-acquire and deregister on close. The multiplexer
/// never owns a gate and a gate never owns the registry (it keeps a weak
/// back-reference), so teardown order cannot leak a reference cycle.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use ready_gate::{Dir, GatePool, Registry, Token};
///
/// let registry = Arc::new(Registry::new());
/// let pool = GatePool::new();
/// let gate = pool.acquire(Token(3), &registry);
///
/// // The multiplexer observed readable data for connection 3.
/// assert!(registry.notify(Token(3), Dir::Read, false, true));
///
/// // Nobody is registered under an unknown token.
/// assert!(!registry.notify(Token(9), Dir::Read, false, true));
/// # gate.close();
/// # pool.release(gate);
/// ```
#[derive(Debug)]
pub struct Registry {
    // We use foldhash for better performance with small hash tables.
    gates: Mutex<HashMap<Token, Arc<Gate>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, gate: Arc<Gate>) {
        let token = gate
            .token()
            .expect("only a gate bound to a connection can be registered");

        let previous = self
            .gates
            .lock()
            .expect(ERR_POISONED_LOCK)
            .insert(token, gate);

        debug_assert!(
            previous.is_none(),
            "two live gates claimed the same connection token"
        );
    }

    pub(crate) fn deregister(&self, token: Token) {
        self.gates.lock().expect(ERR_POISONED_LOCK).remove(&token);
    }

    /// Inbound notification path for the event multiplexer.
    ///
    /// `fault` records a sticky transport fault on the connection's gate;
    /// `ready` marks `dir` as ready for I/O. Either way, a waiter suspended
    /// on `dir` wakes up.
    ///
    /// Returns whether a registered gate received the event. An unknown token
    /// (for example a connection that closed while the event was in flight)
    /// is ignored.
    ///
    /// This call never blocks on gate activity, so it is safe to issue from a
    /// single dispatch thread serving many connections.
    pub fn notify(&self, token: Token, dir: Dir, fault: bool, ready: bool) -> bool {
        // The table lock is dropped before the gate is touched so gate
        // activity can never back-pressure the dispatch thread's table
        // access.
        let gate = self
            .gates
            .lock()
            .expect(ERR_POISONED_LOCK)
            .get(&token)
            .map(Arc::clone);

        match gate {
            Some(gate) => {
                gate.unblock(dir, fault, ready);
                true
            }
            None => false,
        }
    }

    /// Number of currently registered gates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gates.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// Whether no gates are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::GatePool;

    assert_impl_all!(Registry: Send, Sync);
    assert_impl_all!(Token: Copy, Send, Sync);

    #[test]
    fn lease_and_close_drive_registration() {
        let registry = Arc::new(Registry::new());
        let pool = GatePool::new();
        assert!(registry.is_empty());

        let gate = pool.acquire(Token(1), &registry);
        assert_eq!(registry.len(), 1);

        gate.close();
        assert!(registry.is_empty());

        pool.release(gate);
    }

    #[test]
    fn notify_reports_whether_a_gate_was_reached() {
        let registry = Arc::new(Registry::new());
        let pool = GatePool::new();
        let gate = pool.acquire(Token(7), &registry);

        assert!(registry.notify(Token(7), Dir::Write, false, true));
        assert!(!registry.notify(Token(8), Dir::Write, false, true));

        gate.close();

        // Events for a closed connection fall on the floor.
        assert!(!registry.notify(Token(7), Dir::Write, false, true));

        pool.release(gate);
    }
}
