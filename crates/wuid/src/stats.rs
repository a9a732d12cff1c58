use portable_atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of a generator's renewal counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Stats {
    /// Background renewals started, successful or not.
    pub renew_attempts: u64,
    /// Background renewals that applied a new high segment.
    pub renewals: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    renew_attempts: AtomicU64,
    renewals: AtomicU64,
}

impl Counters {
    pub(crate) fn record_attempt(&self) {
        self.renew_attempts.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_renewal(&self) {
        self.renewals.fetch_add(1, Ordering::AcqRel);
    }

    /// Acquire loads pair with the increments, so a reader that sees a
    /// renewal also sees the state word it reset.
    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            renew_attempts: self.renew_attempts.load(Ordering::Acquire),
            renewals: self.renewals.load(Ordering::Acquire),
        }
    }
}
