//! Deadlines for bounded waits.
//!
//! Every blocking primitive in the runtime takes a [`Deadline`]: either an
//! absolute instant or "never", which degrades the wait to an indefinite one.

use std::time::{Duration, Instant};

/// An absolute point in time a wait must not outlive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Wait until the given instant at the latest.
    At(Instant),
    /// Wait indefinitely.
    Never,
}

impl Deadline {
    /// A deadline `timeout` from now. Saturates to [`Deadline::Never`] when
    /// the addition overflows (e.g. `Duration::MAX`).
    pub fn after(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(at) => Self::At(at),
            None => Self::Never,
        }
    }

    /// Whether the deadline has already passed.
    pub fn expired(&self) -> bool {
        match self {
            Self::At(at) => *at <= Instant::now(),
            Self::Never => false,
        }
    }

    /// Time left until the deadline; `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::At(at) => Some(at.saturating_duration_since(Instant::now())),
            Self::Never => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_timeout_is_never() {
        assert_eq!(Deadline::after(Duration::MAX), Deadline::Never);
        assert!(!Deadline::Never.expired());
        assert!(Deadline::Never.remaining().is_none());
    }

    #[test]
    fn past_deadline_is_expired() {
        let d = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(1));
        assert!(d.expired());
        assert_eq!(d.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn future_deadline_has_remaining() {
        let d = Deadline::after(Duration::from_secs(60));
        assert!(!d.expired());
        assert!(d.remaining().unwrap() > Duration::from_secs(30));
    }
}
