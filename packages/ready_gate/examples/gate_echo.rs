//! A producer thread feeds an in-memory transport while the main thread
//! performs a blocking read through the gate.
//!
//! The third participant - normally the event multiplexer of the native
//! transport library - is played by the producer itself: after depositing a
//! message it reports read-readiness through the registry.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ready_gate::{Conn, Dir, GatePool, Registry, Token, Transport};

/// Shared message queue standing in for the native transport's buffers.
#[derive(Clone, Debug, Default)]
struct Mailbox {
    messages: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl Mailbox {
    fn deposit(&self, bytes: &[u8]) {
        self.messages
            .lock()
            .expect("mailbox mutex poisoned")
            .push_back(bytes.to_vec());
    }
}

/// Non-blocking view of a [`Mailbox`].
#[derive(Debug)]
struct MailboxTransport {
    mailbox: Mailbox,
}

impl Transport for MailboxTransport {
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self
            .mailbox
            .messages
            .lock()
            .expect("mailbox mutex poisoned")
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
        Ok(buf.len())
    }
}

fn main() {
    println!("=== Echo Example ===");

    let registry = Arc::new(Registry::new());
    let pool = GatePool::new();
    let gate = pool.acquire(Token(1), &registry);

    let mailbox = Mailbox::default();
    let mut conn = Conn::new(
        MailboxTransport {
            mailbox: mailbox.clone(),
        },
        gate,
    );

    let producer_registry = Arc::clone(&registry);
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        println!("Producer: depositing a message and signaling readiness.");
        mailbox.deposit(b"ping");
        producer_registry.notify(Token(1), Dir::Read, false, true);
    });

    println!("Reading (blocks until the producer delivers)...");
    let mut buf = [0_u8; 16];
    let n = conn.read(&mut buf).expect("producer delivers a message");
    println!("Received: {}", String::from_utf8_lossy(&buf[..n]));

    producer.join().expect("producer thread should not panic");

    conn.close();
    let (_transport, gate) = conn.into_parts();
    pool.release(gate);
    println!("Example completed successfully!");
}
