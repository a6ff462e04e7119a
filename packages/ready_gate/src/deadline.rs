use std::time::Instant;

/// Deadline state of one gate direction.
///
/// `Expired` is sticky: once a deadline has elapsed it keeps failing waits
/// until the owner arms a new one. This is what lets a caller distinguish
/// "timed out, set a fresh deadline and try again" from "timed out and
/// forgot about it".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Deadline {
    /// No deadline; waits block until unblocked or closed.
    Unset,

    /// The deadline has already elapsed.
    Expired,

    /// Armed for an absolute point in time.
    At(Instant),
}

impl Deadline {
    /// Maps the consumer-facing `Option<Instant>` onto deadline state.
    ///
    /// `None` clears the deadline. An instant that is not in the future is
    /// already expired at arming time.
    pub(crate) fn resolve(at: Option<Instant>, now: Instant) -> Self {
        match at {
            None => Self::Unset,
            Some(instant) if instant <= now => Self::Expired,
            Some(instant) => Self::At(instant),
        }
    }
}
