use std::sync::{Arc, Mutex};

use crate::{ERR_POISONED_LOCK, Gate, Registry, Token};

/// A free-list of [`Gate`]s, amortizing construction across connections.
///
/// The pool is an explicit value owned by whoever opens connections; there is
/// no process-wide instance. The channel plumbing inside a gate is built once
/// per pool slot, not once per connection.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use ready_gate::{GatePool, Registry, Token};
///
/// let registry = Arc::new(Registry::new());
/// let pool = GatePool::new();
///
/// let gate = pool.acquire(Token(40), &registry);
/// // ... the connection lives its life ...
/// gate.close();
/// pool.release(gate);
/// ```
#[derive(Debug)]
pub struct GatePool {
    free: Mutex<Vec<Arc<Gate>>>,
}

impl GatePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Leases a gate for a newly opened connection.
    ///
    /// A recycled gate is reset for its new tenancy: identity re-pointed,
    /// closing/fault flags cleared, both directions idle with no deadline,
    /// and both sequence counters bumped so a straggler timeout wake-up from
    /// the previous tenancy is recognized as stale. The gate is registered
    /// with `registry` before it is returned.
    pub fn acquire(&self, token: Token, registry: &Arc<Registry>) -> Arc<Gate> {
        let recycled = self.free.lock().expect(ERR_POISONED_LOCK).pop();
        let gate = recycled.unwrap_or_else(|| Arc::new(Gate::new()));

        gate.rebind(token, &Arc::downgrade(registry));
        registry.register(Arc::clone(&gate));

        gate
    }

    /// Returns a quiesced gate to the free list.
    ///
    /// # Panics
    ///
    /// Panics if the gate has not been closed, or if either direction still
    /// has a suspended waiter. Both are programming errors in the caller's
    /// teardown sequence, not recoverable conditions.
    pub fn release(&self, gate: Arc<Gate>) {
        gate.retire();
        self.free.lock().expect(ERR_POISONED_LOCK).push(gate);
    }

    /// Number of gates currently parked on the free list.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.free.lock().expect(ERR_POISONED_LOCK).len()
    }
}

impl Default for GatePool {
    fn default() -> Self {
        Self::new()
    }
}
