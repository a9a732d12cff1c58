#[cfg(not(feature = "parking-lot"))]
use crate::mutex::{MutexGuard, PoisonError};
use core::time::Duration;

/// A boxed error returned by [`HighSegmentProvider`] implementations and
/// high segment verifiers.
///
/// [`HighSegmentProvider`]: crate::HighSegmentProvider
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `wuid` can produce.
///
/// The variants fall into three groups:
///
/// - **configuration** errors, reported by [`WuidBuilder::build`] and never
///   by a live generator;
/// - **lease** errors, reported while fetching, validating or applying a high
///   segment. They surface to the caller of [`Wuid::load`] and
///   [`Wuid::renew_now`], and are only logged when they happen during a
///   background renewal;
/// - **state** errors from the hot path: [`Error::Unbound`] before the first
///   lease and [`Error::Exhausted`] once the low segment runs out.
///
/// [`WuidBuilder::build`]: crate::WuidBuilder::build
/// [`Wuid::load`]: crate::Wuid::load
/// [`Wuid::renew_now`]: crate::Wuid::renew_now
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The section tag is outside `[0, 7]`.
    #[error("section must be in between [0, 7], got {section}")]
    InvalidSection { section: u8 },

    /// The step is not a power of two in `[1, 1024]`.
    #[error("step must be a power of two in between [1, 1024], got {step}")]
    InvalidStep { step: u64 },

    /// The floor is not in `[0, step)`.
    #[error("floor must be in between [0, {step}), got {floor}")]
    InvalidFloor { step: u64, floor: u64 },

    /// The obfuscation seed is zero.
    #[error("obfuscation seed cannot be 0")]
    InvalidSeed,

    /// `step` was configured more than once on the same builder.
    #[error("step has already been set")]
    StepAlreadySet,

    /// The leased high segment is zero or negative.
    #[error("high segment must be positive, got {high}. name: {name}")]
    NonPositiveHighSegment { name: String, high: i64 },

    /// The leased high segment does not fit the usable high bits.
    #[error("high segment should not exceed {max:#x}, got {high}. name: {name}")]
    HighSegmentOutOfRange { name: String, high: i64, max: i64 },

    /// The leased high segment equals the one already in use.
    #[error("high segment should be a different value other than {high}. name: {name}")]
    StaleHighSegment { name: String, high: i64 },

    /// A negative value was passed to [`Wuid::reset`](crate::Wuid::reset).
    #[error("high segment cannot be negative, got {high}")]
    NegativeHighSegment { high: i64 },

    /// The user supplied verifier refused the leased high segment.
    #[error("high segment rejected by verifier: {0}")]
    Rejected(#[source] BoxError),

    /// The provider failed to fetch a high segment.
    #[error("high segment provider failed: {0}")]
    Provider(#[source] BoxError),

    /// The provider did not answer within the allotted time.
    #[error("high segment provider timed out after {timeout:?}")]
    ProviderTimeout { timeout: Duration },

    /// The provider panicked before handing back a lease.
    #[error("high segment provider panicked")]
    ProviderPanicked,

    /// No renewal has been bound yet. Call [`Wuid::load`](crate::Wuid::load)
    /// first.
    #[error("renewal is not bound yet")]
    NotBound,

    /// No high segment has been loaded yet, so no id can be issued.
    #[error("no high segment has been loaded yet")]
    Unbound,

    /// The low segment reached its panic threshold before a renewal landed.
    ///
    /// This is terminal for the generator instance: it keeps returning this
    /// error and must be replaced.
    #[error("the low segment is about to run out; the generator must be replaced")]
    Exhausted,

    /// The renewal lock was poisoned by a panicking thread.
    ///
    /// When the `parking-lot` feature is enabled, mutexes do **not** poison,
    /// so this variant is not available.
    #[cfg(not(feature = "parking-lot"))]
    #[error("renewal lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Returns `true` for the terminal [`Error::Exhausted`] condition.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// Returns `true` for errors that can only come out of a builder.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidSection { .. }
                | Self::InvalidStep { .. }
                | Self::InvalidFloor { .. }
                | Self::InvalidSeed
                | Self::StepAlreadySet
        )
    }

    /// Unwraps a provider error, keeping errors this crate raised itself
    /// (e.g. [`Error::ProviderTimeout`]) as they are.
    pub(crate) fn from_provider(err: BoxError) -> Self {
        match err.downcast::<Self>() {
            Ok(err) => *err,
            Err(err) => Self::Provider(err),
        }
    }
}

#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidFloor { step: 8, floor: 9 };
        assert_eq!(err.to_string(), "floor must be in between [0, 8), got 9");

        let err = Error::StaleHighSegment {
            name: "alpha".into(),
            high: 100,
        };
        assert_eq!(
            err.to_string(),
            "high segment should be a different value other than 100. name: alpha"
        );

        let err = Error::HighSegmentOutOfRange {
            name: "alpha".into(),
            high: 1 << 30,
            max: 0x07FF_FFFF,
        };
        assert!(err.to_string().contains("0x7ffffff"));
    }

    #[test]
    fn provider_errors_keep_their_own_variant() {
        let timeout: BoxError = Box::new(Error::ProviderTimeout {
            timeout: Duration::from_secs(5),
        });
        assert!(matches!(
            Error::from_provider(timeout),
            Error::ProviderTimeout { .. }
        ));

        let io: BoxError = Box::new(std::io::Error::other("connection refused"));
        let err = Error::from_provider(io);
        assert!(matches!(err, Error::Provider(_)));
        assert!(core::error::Error::source(&err).is_some());
    }

    #[test]
    fn classification() {
        assert!(Error::Exhausted.is_exhausted());
        assert!(!Error::Unbound.is_exhausted());
        assert!(Error::InvalidSeed.is_config());
        assert!(Error::StepAlreadySet.is_config());
        assert!(!Error::NotBound.is_config());
    }

    #[cfg(not(feature = "parking-lot"))]
    #[test]
    fn poisoned_lock_maps_to_lock_poisoned() {
        let mutex = crate::mutex::Mutex::new(0_u8);
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let guard = mutex.lock().unwrap();
                assert_eq!(*guard, 1, "poisoning the lock");
            })
            .join()
        });
        assert!(matches!(
            crate::mutex::lock(&mutex),
            Err(Error::LockPoisoned)
        ));
    }
}
