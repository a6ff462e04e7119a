#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Deadline-aware readiness gate for non-blocking transports.
//!
//! Native transport libraries often expose only non-blocking send/receive
//! calls plus an asynchronous "became ready" / "errored" notification
//! callback. This crate bridges that shape to synchronous-looking I/O: a
//! caller issues a read or write, and when the transport reports that it
//! would block, the calling thread suspends on a per-connection [`Gate`]
//! until the external notifier reports readiness, the direction's deadline
//! elapses, or the connection is closed.
//!
//! The pieces:
//!
//! - [`Gate`] - the per-connection wait/notify state machine, one readiness
//!   axis per [`Dir`], each with its own deadline and a guard against stale
//!   timer fires.
//! - [`GatePool`] - a free-list that recycles gates across connections.
//! - [`Registry`] - the registration table through which the external event
//!   multiplexer delivers readiness and fault notifications.
//! - [`Transport`] / [`PacketTransport`] - the contract for the non-blocking
//!   transport primitive underneath.
//! - [`Conn`] - the consumer-facing wrapper gluing a transport to a gate
//!   with a retry loop.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use ready_gate::{Dir, GatePool, Registry, Token, WaitError};
//!
//! let registry = Arc::new(Registry::new());
//! let pool = GatePool::new();
//!
//! // A connection opens: lease a gate keyed by the transport's handle.
//! let gate = pool.acquire(Token(7), &registry);
//!
//! // The multiplexer reports readiness before anyone waits; the next wait
//! // consumes it without suspending.
//! registry.notify(Token(7), Dir::Read, false, true);
//! assert_eq!(gate.wait(Dir::Read), Ok(()));
//!
//! // An already-elapsed deadline trips immediately and stays tripped until
//! // a new deadline is set.
//! gate.set_read_deadline(Some(Instant::now()));
//! assert_eq!(gate.wait(Dir::Read), Err(WaitError::TimedOut));
//!
//! // Tear down: close unblocks any waiters, then the gate is recycled.
//! gate.close();
//! pool.release(gate);
//! ```

mod conn;
mod constants;
mod deadline;
mod dir;
mod error;
mod gate;
mod pool;
mod registry;
mod signal;
mod transport;

pub use conn::*;
pub use dir::*;
pub use error::*;
pub use gate::*;
pub use pool::*;
pub use registry::*;
pub use transport::*;

pub(crate) use constants::*;
pub(crate) use deadline::*;
pub(crate) use signal::*;
