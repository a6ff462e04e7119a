// A poisoned lock means a thread panicked while updating gate state; the
// invariants that state is supposed to uphold can no longer be trusted, so we
// stop instead of limping on.
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - a thread panicked while \
    updating gate state, so its invariants can no longer be trusted";
