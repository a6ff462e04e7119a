//! Demonstrates deadline expiry and recovery on a gated connection.
//!
//! The transport in this example never has data, so every read has to wait -
//! first into a deadline, then indefinitely until the connection is closed.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ready_gate::{Conn, Error, GatePool, Registry, Token, Transport};

/// A transport that accepts every write and never yields data.
#[derive(Debug)]
struct Silent;

impl Transport for Silent {
    fn try_recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::WouldBlock.into())
    }

    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
}

fn main() {
    println!("=== Deadline Example ===");

    let registry = Arc::new(Registry::new());
    let pool = GatePool::new();
    let gate = pool.acquire(Token(1), &registry);
    let mut conn = Conn::new(Silent, gate);

    conn.set_read_deadline(Some(Instant::now() + Duration::from_millis(200)));

    let mut buf = [0_u8; 16];
    println!("Reading with a 200 ms deadline and no incoming data...");
    match conn.read(&mut buf) {
        Err(Error::TimedOut) => println!("Read timed out, as expected."),
        other => println!("Unexpected outcome: {other:?}"),
    }

    // The expired deadline is sticky until a new one is set.
    assert!(matches!(conn.read(&mut buf), Err(Error::TimedOut)));
    println!("A second read fails instantly until the deadline is cleared.");

    // Clear the deadline, then close from another thread while a read is
    // suspended; the read unblocks promptly with a Closed error.
    conn.set_read_deadline(None);
    let closer_gate = Arc::clone(conn.gate());
    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        println!("Closing the connection from another thread...");
        closer_gate.close();
    });

    match conn.read(&mut buf) {
        Err(Error::Closed) => println!("Suspended read unblocked with Closed."),
        other => println!("Unexpected outcome: {other:?}"),
    }
    closer.join().expect("closer thread should not panic");

    let (_transport, gate) = conn.into_parts();
    pool.release(gate);
    println!("Example completed successfully!");
}
