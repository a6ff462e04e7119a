use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::{Dir, Error, Gate, PacketTransport, Transport};

/// A connection presenting blocking-with-deadline reads and writes on top of
/// a non-blocking [`Transport`] and its [`Gate`].
///
/// Every operation follows the same retry shape: clear leftover readiness,
/// attempt the non-blocking call, and on "would block" suspend on the gate
/// until the notifier reports readiness, the deadline elapses, or the
/// connection closes. Transport errors other than "would block" propagate
/// unchanged and are never retried.
///
/// A connection created with [`new_blocking`](Self::new_blocking) trusts the
/// native transport to block internally and bypasses the gate entirely.
///
/// # Example
///
/// ```rust
/// use std::io;
/// use std::sync::Arc;
///
/// use ready_gate::{Conn, GatePool, Registry, Token, Transport};
///
/// /// Accepts every write and never yields data.
/// #[derive(Debug)]
/// struct Sink;
///
/// impl Transport for Sink {
///     fn try_recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
///         Err(io::ErrorKind::WouldBlock.into())
///     }
///
///     fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
///         Ok(buf.len())
///     }
/// }
///
/// let registry = Arc::new(Registry::new());
/// let pool = GatePool::new();
/// let gate = pool.acquire(Token(12), &registry);
///
/// let mut conn = Conn::new(Sink, gate);
/// assert_eq!(conn.write(b"hello").unwrap(), 5);
///
/// conn.close();
/// let (_sink, gate) = conn.into_parts();
/// pool.release(gate);
/// ```
#[derive(Debug)]
pub struct Conn<T> {
    transport: T,
    gate: Arc<Gate>,
    blocking: bool,
}

impl<T> Conn<T> {
    /// Sets or clears the read deadline. `None` means block indefinitely.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.gate.set_read_deadline(deadline);
    }

    /// Sets or clears the write deadline. `None` means block indefinitely.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.gate.set_write_deadline(deadline);
    }

    /// Sets or clears both deadlines in one step.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.gate.set_deadline(deadline);
    }

    /// Closes the connection's gate: suspended waiters unblock with
    /// [`Error::Closed`] and future gated operations fail.
    pub fn close(&self) {
        self.gate.close();
    }

    /// The gate mediating this connection.
    #[must_use]
    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    /// Dismantles the connection, returning the transport and the gate so
    /// the gate can be released back to its pool once quiesced.
    #[must_use]
    pub fn into_parts(self) -> (T, Arc<Gate>) {
        (self.transport, self.gate)
    }

    fn should_wait(&self, error: &io::Error) -> bool {
        !self.blocking && error.kind() == io::ErrorKind::WouldBlock
    }
}

impl<T> Conn<T>
where
    T: Transport,
{
    /// Creates a gated connection over a non-blocking transport.
    pub fn new(transport: T, gate: Arc<Gate>) -> Self {
        Self {
            transport,
            gate,
            blocking: false,
        }
    }

    /// Creates a connection whose transport blocks natively.
    ///
    /// Operations call the transport directly and the gate machinery is
    /// bypassed; a "would block" error from a misconfigured transport then
    /// surfaces to the caller unchanged.
    pub fn new_blocking(transport: T, gate: Arc<Gate>) -> Self {
        Self {
            transport,
            gate,
            blocking: true,
        }
    }

    /// Receives into `buf`, blocking until data arrives, the read deadline
    /// elapses, or the connection closes.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`], [`Error::TimedOut`], or any transport error other
    /// than "would block", which propagates unchanged.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if !self.blocking {
            // A Ready left over from an earlier cycle must not skip the wait
            // for data that is not there.
            self.gate.reset(Dir::Read);
        }

        loop {
            match self.transport.try_recv(buf) {
                Ok(n) => return Ok(n),
                Err(e) if self.should_wait(&e) => self.gate.wait(Dir::Read)?,
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }

    /// Sends `buf`, blocking until the transport accepts it, the write
    /// deadline elapses, or the connection closes.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`], [`Error::TimedOut`], or any transport error other
    /// than "would block", which propagates unchanged.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        if !self.blocking {
            self.gate.reset(Dir::Write);
        }

        loop {
            match self.transport.try_send(buf) {
                Ok(n) => return Ok(n),
                Err(e) if self.should_wait(&e) => self.gate.wait(Dir::Write)?,
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }
}

impl<T> Conn<T>
where
    T: PacketTransport,
{
    /// Like [`read`](Self::read), but also returns the metadata the
    /// transport attaches to the received message.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`], [`Error::TimedOut`], or any transport error other
    /// than "would block", which propagates unchanged.
    pub fn read_packet(&mut self, buf: &mut [u8]) -> Result<(usize, T::Meta), Error> {
        if !self.blocking {
            self.gate.reset(Dir::Read);
        }

        loop {
            match self.transport.try_recv_packet(buf) {
                Ok(received) => return Ok(received),
                Err(e) if self.should_wait(&e) => self.gate.wait(Dir::Read)?,
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use testing::{measure, with_watchdog};

    use super::*;
    use crate::{GatePool, Registry, Token};

    /// Test-side handle feeding an in-memory transport.
    #[derive(Clone, Debug, Default)]
    struct Feed {
        incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
        writable: Arc<AtomicBool>,
        recv_attempts: Arc<AtomicUsize>,
    }

    impl Feed {
        fn push(&self, bytes: &[u8]) {
            self.incoming
                .lock()
                .expect("test mutex poisoned")
                .push_back(bytes.to_vec());
        }
    }

    /// In-memory transport scripted by a [`Feed`]; would-block by default.
    #[derive(Debug)]
    struct Scripted {
        feed: Feed,
        received: usize,
        fail_recv_with: Option<io::ErrorKind>,
    }

    impl Scripted {
        fn new(feed: &Feed) -> Self {
            Self {
                feed: feed.clone(),
                received: 0,
                fail_recv_with: None,
            }
        }
    }

    impl Transport for Scripted {
        fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.feed.recv_attempts.fetch_add(1, Ordering::SeqCst);

            if let Some(kind) = self.fail_recv_with {
                return Err(kind.into());
            }

            match self
                .feed
                .incoming
                .lock()
                .expect("test mutex poisoned")
                .pop_front()
            {
                Some(message) => {
                    let n = message.len().min(buf.len());
                    buf[..n].copy_from_slice(&message[..n]);
                    Ok(n)
                }
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }

        fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.feed.writable.load(Ordering::SeqCst) {
                Ok(buf.len())
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            }
        }
    }

    impl PacketTransport for Scripted {
        /// Ordinal of the received message.
        type Meta = usize;

        fn try_recv_packet(&mut self, buf: &mut [u8]) -> io::Result<(usize, usize)> {
            let n = self.try_recv(buf)?;
            self.received += 1;
            Ok((n, self.received))
        }
    }

    fn gated(token: u64) -> (Arc<Registry>, GatePool, Conn<Scripted>, Feed) {
        let registry = Arc::new(Registry::new());
        let pool = GatePool::new();
        let gate = pool.acquire(Token(token), &registry);
        let feed = Feed::default();
        let conn = Conn::new(Scripted::new(&feed), gate);
        (registry, pool, conn, feed)
    }

    #[test]
    fn read_returns_data_once_notified() {
        with_watchdog(|| {
            let (registry, _pool, mut conn, feed) = gated(1);

            let producer = thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                feed.push(b"hello");
                registry.notify(Token(1), Dir::Read, false, true);
            });

            let mut buf = [0_u8; 16];
            let n = conn.read(&mut buf).expect("data was produced");
            assert_eq!(&buf[..n], b"hello");

            producer.join().expect("producer must not panic");
        });
    }

    #[test]
    fn read_times_out_then_reports_closed_after_close() {
        with_watchdog(|| {
            let (_registry, _pool, mut conn, _feed) = gated(2);

            conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(50)));

            let mut buf = [0_u8; 16];
            let (outcome, elapsed) = measure(|| conn.read(&mut buf));
            assert!(matches!(outcome, Err(Error::TimedOut)));
            assert!(elapsed >= Duration::from_millis(40));

            conn.close();
            assert!(matches!(conn.read(&mut buf), Err(Error::Closed)));
        });
    }

    #[test]
    fn cleared_deadline_blocks_until_data_arrives() {
        with_watchdog(|| {
            let (registry, _pool, mut conn, feed) = gated(3);

            conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(50)));
            let mut buf = [0_u8; 16];
            assert!(matches!(conn.read(&mut buf), Err(Error::TimedOut)));

            // Clearing the deadline recovers the connection; the next read
            // blocks until data really arrives.
            conn.set_read_deadline(None);

            let producer = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                feed.push(b"late");
                registry.notify(Token(3), Dir::Read, false, true);
            });

            let n = conn.read(&mut buf).expect("data was produced");
            assert_eq!(&buf[..n], b"late");

            producer.join().expect("producer must not panic");
        });
    }

    #[test]
    fn write_blocks_until_capacity_opens_up() {
        with_watchdog(|| {
            let (registry, _pool, mut conn, feed) = gated(4);

            let opener = thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                feed.writable.store(true, Ordering::SeqCst);
                registry.notify(Token(4), Dir::Write, false, true);
            });

            let n = conn.write(b"payload").expect("capacity opened up");
            assert_eq!(n, 7);

            opener.join().expect("opener must not panic");
        });
    }

    #[test]
    fn rearming_deadline_mid_read_postpones_timeout() {
        with_watchdog(|| {
            let (_registry, _pool, mut conn, _feed) = gated(5);

            conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(150)));

            let gate = Arc::clone(conn.gate());
            let rearm = thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                gate.set_read_deadline(Some(Instant::now() + Duration::from_millis(400)));
            });

            let mut buf = [0_u8; 16];
            let (outcome, elapsed) = measure(|| conn.read(&mut buf));
            assert!(matches!(outcome, Err(Error::TimedOut)));
            assert!(
                elapsed >= Duration::from_millis(300),
                "the superseded deadline surfaced early: {elapsed:?}"
            );

            rearm.join().expect("re-arm thread must not panic");
        });
    }

    #[test]
    fn transport_errors_propagate_without_retry() {
        with_watchdog(|| {
            let (_registry, _pool, mut conn, feed) = gated(6);
            conn.transport.fail_recv_with = Some(io::ErrorKind::ConnectionReset);

            let mut buf = [0_u8; 16];
            let outcome = conn.read(&mut buf);

            match outcome {
                Err(Error::Transport(e)) => {
                    assert_eq!(e.kind(), io::ErrorKind::ConnectionReset);
                }
                other => panic!("expected a transport error, got {other:?}"),
            }

            // One failed attempt, no retries.
            assert_eq!(feed.recv_attempts.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn would_block_is_never_surfaced_by_gated_reads() {
        with_watchdog(|| {
            let (_registry, _pool, mut conn, _feed) = gated(7);

            conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(50)));

            let mut buf = [0_u8; 16];
            match conn.read(&mut buf) {
                Err(Error::TimedOut) => {}
                other => panic!("expected a timeout, got {other:?}"),
            }
        });
    }

    #[test]
    fn blocking_mode_bypasses_the_gate() {
        with_watchdog(|| {
            let registry = Arc::new(Registry::new());
            let pool = GatePool::new();
            let gate = pool.acquire(Token(8), &registry);
            let feed = Feed::default();
            feed.push(b"direct");

            // Even a closed gate does not get in the way.
            gate.close();

            let mut conn = Conn::new_blocking(Scripted::new(&feed), gate);
            let mut buf = [0_u8; 16];
            let n = conn.read(&mut buf).expect("data was already queued");
            assert_eq!(&buf[..n], b"direct");

            // With nothing queued, the native would-block error surfaces
            // unchanged instead of suspending.
            match conn.read(&mut buf) {
                Err(Error::Transport(e)) => {
                    assert_eq!(e.kind(), io::ErrorKind::WouldBlock);
                }
                other => panic!("expected a pass-through error, got {other:?}"),
            }
        });
    }

    #[test]
    fn read_packet_returns_message_metadata() {
        with_watchdog(|| {
            let (registry, _pool, mut conn, feed) = gated(9);

            feed.push(b"first");
            feed.push(b"second");
            registry.notify(Token(9), Dir::Read, false, true);

            let mut buf = [0_u8; 16];
            let (n, ordinal) = conn.read_packet(&mut buf).expect("data was queued");
            assert_eq!(&buf[..n], b"first");
            assert_eq!(ordinal, 1);

            let (n, ordinal) = conn.read_packet(&mut buf).expect("data was queued");
            assert_eq!(&buf[..n], b"second");
            assert_eq!(ordinal, 2);
        });
    }
}
