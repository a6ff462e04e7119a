use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Mutex, Weak};
use std::time::Instant;

use crate::{Deadline, Dir, ERR_POISONED_LOCK, Registry, Signal, Token, WaitError};

/// Readiness state of one direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum IoState {
    /// No pending interest and no waiter.
    Idle,

    /// A caller is suspended in [`Gate::wait`] on this direction.
    Waiting,

    /// The notifier reported readiness before anyone was waiting; the next
    /// wait consumes it without suspending.
    Ready,
}

/// Mutable per-direction bookkeeping, guarded by the gate's mutex.
#[derive(Debug)]
struct DirState {
    state: IoState,

    deadline: Deadline,

    /// Bumped on every deadline change for this direction. A timeout wake-up
    /// is honored only if the sequence it captured going to sleep still
    /// matches; anything else is a stale fire from a superseded deadline.
    seq: u64,
}

impl DirState {
    fn new() -> Self {
        Self {
            state: IoState::Idle,
            deadline: Deadline::Unset,
            seq: 0,
        }
    }

    /// Re-arms this direction; returns whether its suspended waiter (if any)
    /// must be woken.
    fn arm(&mut self, resolved: Deadline) -> bool {
        self.seq = self.seq.wrapping_add(1);
        self.deadline = resolved;

        match resolved {
            // A suspended waiter is parked on the superseded deadline; it has
            // to wake so its next verdict check or bounded sleep reflects the
            // new one.
            Deadline::Expired | Deadline::At(_) => self.state == IoState::Waiting,
            Deadline::Unset => false,
        }
    }
}

/// Everything the gate mutex guards.
#[derive(Debug)]
struct Shared {
    /// Once set, no further waits are admitted and the gate only leaves this
    /// state by being recycled through its pool.
    closing: bool,

    /// Sticky transport fault; persists until the gate is recycled.
    faulted: bool,

    /// Identity of the owning connection while leased from the pool.
    token: Option<Token>,

    /// Non-owning edge back to the registration table.
    registry: Weak<Registry>,

    read: DirState,
    write: DirState,
}

impl Shared {
    fn dir(&self, dir: Dir) -> &DirState {
        match dir {
            Dir::Read => &self.read,
            Dir::Write => &self.write,
        }
    }

    fn dir_mut(&mut self, dir: Dir) -> &mut DirState {
        match dir {
            Dir::Read => &mut self.read,
            Dir::Write => &mut self.write,
        }
    }

    /// Verdict for a prospective or finished wait: closing beats an expired
    /// deadline, which beats a sticky fault.
    fn verdict(&self, dir: Dir) -> Result<(), WaitError> {
        if self.closing {
            return Err(WaitError::Closed);
        }

        if self.dir(dir).deadline == Deadline::Expired {
            return Err(WaitError::TimedOut);
        }

        if self.faulted {
            return Err(WaitError::Closed);
        }

        Ok(())
    }
}

/// The per-connection readiness gate.
///
/// A gate turns a transport that only offers non-blocking calls plus
/// asynchronous readiness notifications into something a thread can block on
/// with a deadline. One gate serves one connection; its two [`Dir`] axes are
/// fully independent.
///
/// Gates are leased from a [`GatePool`][crate::GatePool], woken through
/// [`Registry::notify`], and torn down with [`close`](Self::close). At most
/// one thread may be suspended per direction at a time; a second concurrent
/// waiter blocks until the first completes its wait, not until its deadline.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Instant;
///
/// use ready_gate::{Dir, GatePool, Registry, Token, WaitError};
///
/// let registry = Arc::new(Registry::new());
/// let pool = GatePool::new();
/// let gate = pool.acquire(Token(1), &registry);
///
/// // An already-elapsed deadline trips the next wait immediately.
/// gate.set_read_deadline(Some(Instant::now()));
/// assert_eq!(gate.wait(Dir::Read), Err(WaitError::TimedOut));
///
/// // Clearing it makes readiness flow again.
/// gate.set_read_deadline(None);
/// registry.notify(Token(1), Dir::Read, false, true);
/// assert_eq!(gate.wait(Dir::Read), Ok(()));
///
/// gate.close();
/// pool.release(gate);
/// ```
#[derive(Debug)]
pub struct Gate {
    shared: Mutex<Shared>,
    read_signal: Signal,
    write_signal: Signal,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                closing: false,
                faulted: false,
                token: None,
                registry: Weak::new(),
                read: DirState::new(),
                write: DirState::new(),
            }),
            read_signal: Signal::new(),
            write_signal: Signal::new(),
        }
    }

    fn signal(&self, dir: Dir) -> &Signal {
        match dir {
            Dir::Read => &self.read_signal,
            Dir::Write => &self.write_signal,
        }
    }

    /// Re-points a recycled gate at a new connection.
    ///
    /// Sequence counters are bumped, not reset: a timeout wake-up left over
    /// from the previous tenancy must never be mistaken for a fresh expiry.
    pub(crate) fn rebind(&self, token: Token, registry: &Weak<Registry>) {
        let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);

        shared.token = Some(token);
        shared.registry = Weak::clone(registry);
        shared.closing = false;
        shared.faulted = false;

        for dir in [Dir::Read, Dir::Write] {
            let ds = shared.dir_mut(dir);
            ds.state = IoState::Idle;
            ds.deadline = Deadline::Unset;
            ds.seq = ds.seq.wrapping_add(1);
        }
    }

    pub(crate) fn token(&self) -> Option<Token> {
        self.shared.lock().expect(ERR_POISONED_LOCK).token
    }

    /// Pool-side precondition check before the gate is parked on the free
    /// list; clears the connection identity.
    pub(crate) fn retire(&self) {
        let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);

        assert!(
            shared.closing
                && shared.read.state != IoState::Waiting
                && shared.write.state != IoState::Waiting,
            "gate released to the pool while open or with a suspended waiter"
        );

        shared.token = None;
    }

    /// Blocks the calling thread until `dir` becomes ready, its deadline
    /// elapses, or the gate is closed.
    ///
    /// Returns `Ok(())` when the caller should retry its non-blocking
    /// transport call. That is a hint, not a guarantee: the wake-up may be
    /// spurious, and the retry's own would-block result leads straight back
    /// here.
    ///
    /// # Errors
    ///
    /// [`WaitError::Closed`] if the gate is closing, closed, or carries a
    /// sticky fault; [`WaitError::TimedOut`] if the direction's deadline has
    /// elapsed. An expired deadline keeps failing waits until a new one is
    /// set.
    #[cfg_attr(test, mutants::skip)] // Timing-critical primitive - tampering hangs the test suite.
    pub fn wait(&self, dir: Dir) -> Result<(), WaitError> {
        // Whatever happens below, the direction must read Idle on the way out
        // so a stale Ready can never short-circuit a later cycle.
        let _reset = scopeguard::guard((), |()| self.reset(dir));

        // Fail fast before contending for the waiter slot.
        self.check(dir)?;

        // Exclusivity: the second of two concurrent waiters parks here until
        // the first has fully completed its wait.
        let listener = self.signal(dir).listen();

        let (mut seq, mut deadline) = {
            let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);

            // Re-checked under the same lock that guards the transition, so a
            // concurrent close cannot slip between the entry check and the
            // suspension and leave us stranded.
            shared.verdict(dir)?;

            let ds = shared.dir_mut(dir);

            if ds.state == IoState::Ready {
                // Readiness arrived before we did; consume it without
                // suspending.
                ds.state = IoState::Idle;
                return Ok(());
            }

            debug_assert_eq!(
                ds.state,
                IoState::Idle,
                "direction already has a waiter despite the exclusivity lock"
            );
            ds.state = IoState::Waiting;

            (ds.seq, ds.deadline)
        };

        loop {
            let expired = match deadline {
                Deadline::Unset => match listener.recv() {
                    Ok(()) => false,
                    Err(_) => unreachable!("signal sender lives inside the gate itself"),
                },
                Deadline::Expired => true,
                Deadline::At(instant) => {
                    let timeout = instant.saturating_duration_since(Instant::now());

                    match listener.recv_timeout(timeout) {
                        Ok(()) => false,
                        Err(RecvTimeoutError::Timeout) => true,
                        Err(RecvTimeoutError::Disconnected) => {
                            unreachable!("signal sender lives inside the gate itself")
                        }
                    }
                }
            };

            if !expired {
                // Unblocked: readiness, fault, close, or a deadline re-arm.
                // The final verdict check sorts them out.
                break;
            }

            let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);
            let ds = shared.dir_mut(dir);

            if seq == ds.seq {
                // Genuine expiry: nothing re-armed this deadline while we
                // slept.
                ds.deadline = Deadline::Expired;
                break;
            }

            // Stale fire: a newer deadline was armed while we slept. Pick up
            // the current one and keep waiting.
            seq = ds.seq;
            deadline = ds.deadline;
        }

        self.check(dir)
    }

    /// Notifier-side entry point: records a fault and/or readiness for `dir`
    /// and wakes the suspended waiter, if any.
    ///
    /// Reached through [`Registry::notify`]. Never blocks: the wake-up is a
    /// best-effort single-token delivery, which suffices because a waiter
    /// always re-checks state before suspending again.
    #[cfg_attr(test, mutants::skip)] // Timing-critical primitive - tampering hangs the test suite.
    pub(crate) fn unblock(&self, dir: Dir, fault: bool, ready: bool) {
        let was_waiting = {
            let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);

            if fault {
                shared.faulted = true;
            }

            let ds = shared.dir_mut(dir);
            let previous = ds.state;

            if ready {
                // Forced even with no waiter present; the next wait consumes
                // it on its fast path.
                ds.state = IoState::Ready;
            }

            previous == IoState::Waiting
        };

        // The wake-up happens outside the lock so the woken thread does not
        // immediately contend with us for it.
        if was_waiting {
            self.signal(dir).notify();
        }
    }

    /// Sets or clears the deadline for the read direction.
    ///
    /// `None` means block indefinitely. An instant that is not in the future
    /// expires immediately: a suspended waiter wakes and observes
    /// [`WaitError::TimedOut`], as does every later wait until a new deadline
    /// is set.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.arm(deadline, true, false);
    }

    /// Sets or clears the deadline for the write direction.
    ///
    /// Semantics match [`set_read_deadline`](Self::set_read_deadline).
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.arm(deadline, false, true);
    }

    /// Sets or clears both directions' deadlines.
    ///
    /// Equivalent to calling [`set_read_deadline`](Self::set_read_deadline)
    /// and [`set_write_deadline`](Self::set_write_deadline) with the same
    /// instant, except that both legs happen under a single lock acquisition.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.arm(deadline, true, true);
    }

    fn arm(&self, deadline: Option<Instant>, read: bool, write: bool) {
        let mut wake_read = false;
        let mut wake_write = false;

        {
            let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);
            let resolved = Deadline::resolve(deadline, Instant::now());

            if read {
                wake_read = shared.read.arm(resolved);
            }

            if write {
                wake_write = shared.write.arm(resolved);
            }
        }

        if wake_read {
            self.signal(Dir::Read).notify();
        }

        if wake_write {
            self.signal(Dir::Write).notify();
        }
    }

    /// Forces the direction back to idle.
    ///
    /// Called by the retry loop immediately before each non-blocking attempt
    /// and on every exit from [`wait`](Self::wait): a leftover `Ready` from a
    /// previous cycle must never cause a zero-wait skip for data that is not
    /// there.
    pub fn reset(&self, dir: Dir) {
        let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);
        shared.dir_mut(dir).state = IoState::Idle;
    }

    /// Marks the gate as closing, deregisters it from its registry and wakes
    /// both directions so no waiter is left stranded.
    ///
    /// Idempotent. Waiters observe [`WaitError::Closed`]; the gate stays
    /// unusable until recycled through its pool.
    pub fn close(&self) {
        let registered = {
            let mut shared = self.shared.lock().expect(ERR_POISONED_LOCK);

            if shared.closing {
                return;
            }

            shared.closing = true;
            shared.token.map(|token| (shared.registry.upgrade(), token))
        };

        if let Some((Some(registry), token)) = registered {
            registry.deregister(token);
        }

        self.unblock(Dir::Read, false, false);
        self.unblock(Dir::Write, false, false);
    }

    fn check(&self, dir: Dir) -> Result<(), WaitError> {
        self.shared.lock().expect(ERR_POISONED_LOCK).verdict(dir)
    }
}
