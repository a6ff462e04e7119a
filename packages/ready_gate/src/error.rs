use std::io;

use thiserror::Error;

/// Verdict of a [`Gate::wait`][crate::Gate::wait] call that did not end in
/// readiness.
///
/// "Would block" conditions never appear here: they are consumed by the retry
/// loop and only ever lead back into another wait.
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum WaitError {
    /// The connection is closing, has been closed, or carries a sticky
    /// transport fault. Terminal: no wait on this gate can succeed until the
    /// gate is recycled.
    #[error("connection is closed")]
    Closed,

    /// The direction's deadline elapsed before it became ready. Terminal for
    /// the current call only; the gate works again once a new deadline is
    /// set.
    #[error("i/o deadline elapsed")]
    TimedOut,
}

/// Error returned by [`Conn`][crate::Conn] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection is closing or has been closed.
    #[error("connection is closed")]
    Closed,

    /// The direction's deadline elapsed before the operation could complete.
    #[error("i/o deadline elapsed")]
    TimedOut,

    /// The transport reported an error other than "would block". It is
    /// propagated unchanged and the operation is not retried.
    #[error(transparent)]
    Transport(#[from] io::Error),
}

impl From<WaitError> for Error {
    fn from(verdict: WaitError) -> Self {
        match verdict {
            WaitError::Closed => Self::Closed,
            WaitError::TimedOut => Self::TimedOut,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(WaitError: Send, Sync, Debug);
    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn wait_verdicts_map_to_operation_errors() {
        assert!(matches!(Error::from(WaitError::Closed), Error::Closed));
        assert!(matches!(Error::from(WaitError::TimedOut), Error::TimedOut));
    }

    #[test]
    fn transport_errors_pass_through() {
        let inner = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let error = Error::from(inner);
        assert!(matches!(error, Error::Transport(_)));
    }
}
