use std::io;

/// A non-blocking transport endpoint.
///
/// Exactly three outcomes are recognized per attempt, mirroring the native
/// call underneath:
///
/// - `Ok(n)` - `n` bytes were transferred.
/// - an error of kind [`io::ErrorKind::WouldBlock`] - nothing could be
///   transferred right now; the caller may wait for readiness and retry.
/// - any other error - a real transport failure, propagated unchanged.
///
/// Implementations must not block; a call either completes immediately or
/// reports `WouldBlock`. (A transport configured for native blocking mode is
/// paired with [`Conn::new_blocking`][crate::Conn::new_blocking], which never
/// waits on a gate.)
pub trait Transport {
    /// Attempts to receive into `buf`, returning the number of bytes read.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Attempts to send `buf`, returning the number of bytes written.
    fn try_send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// A [`Transport`] whose receive path also yields per-message metadata:
/// source timestamps, sequence numbers - whatever the protocol carries.
pub trait PacketTransport: Transport {
    /// Metadata attached to one received message.
    type Meta;

    /// Attempts to receive one message into `buf`, returning the byte count
    /// and the message's metadata.
    fn try_recv_packet(&mut self, buf: &mut [u8]) -> io::Result<(usize, Self::Meta)>;
}
