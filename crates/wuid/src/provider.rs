use core::fmt;
use core::time::Duration;
use std::sync::{
    Arc,
    mpsc::{self, RecvTimeoutError},
};
use std::thread;

use crate::{BoxError, Error};

/// How long the store adapters wait for an increment before giving up.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// A freshly leased high segment.
///
/// A lease may carry a release action, e.g. closing a short-lived database
/// connection or acknowledging a callback. It runs exactly once, when the
/// lease is dropped after the generator has verified and applied (or
/// rejected) the value.
pub struct Lease {
    high: i64,
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Lease {
    /// Creates a lease without a release action.
    #[must_use]
    pub fn new(high: i64) -> Self {
        Self {
            high,
            release: None,
        }
    }

    /// Creates a lease whose `release` action runs once the lease has been
    /// processed.
    #[must_use]
    pub fn with_release<F>(high: i64, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            high,
            release: Some(Box::new(release)),
        }
    }

    /// The leased high segment.
    #[must_use]
    pub const fn high(&self) -> i64 {
        self.high
    }
}

impl From<i64> for Lease {
    fn from(high: i64) -> Self {
        Self::new(high)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("high", &self.high)
            .field("release", &self.release.is_some())
            .finish()
    }
}

/// A source of monotonically increasing high segments.
///
/// Implementations wrap whatever atomic increment-and-read the deployment
/// has at hand: an `UPDATE ... RETURNING` on a counter row, an `INCR`
/// against a key/value store, a `findAndModify` on a document store, or a
/// locally tracked counter. The generator calls [`fetch`] once on
/// [`Wuid::load`] and keeps the provider to repeat the fetch whenever it
/// renews.
///
/// Any `Fn() -> Result<Lease, BoxError>` closure is a provider.
///
/// [`fetch`]: HighSegmentProvider::fetch
/// [`Wuid::load`]: crate::Wuid::load
pub trait HighSegmentProvider: Send + Sync + 'static {
    /// Atomically increments the shared counter and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying store reports. Errors produced by this
    /// crate (such as [`Error::ProviderTimeout`]) are passed through
    /// unchanged; anything else is wrapped in [`Error::Provider`].
    fn fetch(&self) -> Result<Lease, BoxError>;
}

impl<F> HighSegmentProvider for F
where
    F: Fn() -> Result<Lease, BoxError> + Send + Sync + 'static,
{
    fn fetch(&self) -> Result<Lease, BoxError> {
        self()
    }
}

/// Bounds every [`fetch`](HighSegmentProvider::fetch) of the wrapped provider
/// by a deadline.
///
/// The fetch runs on a helper thread. If it does not answer in time the
/// caller gets [`Error::ProviderTimeout`]; a lease arriving late is dropped
/// (running its release action) and never applied.
pub struct Timeout<P> {
    inner: Arc<P>,
    timeout: Duration,
}

impl<P> Timeout<P>
where
    P: HighSegmentProvider,
{
    /// Wraps `inner`, failing fetches that take longer than `timeout`.
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            timeout,
        }
    }

    /// The configured deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<P> HighSegmentProvider for Timeout<P>
where
    P: HighSegmentProvider,
{
    fn fetch(&self) -> Result<Lease, BoxError> {
        let (tx, rx) = mpsc::sync_channel(1);
        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name("wuid-fetch".into())
            .spawn(move || {
                // The receiver is gone after a timeout; dropping the late
                // lease releases it.
                let _ = tx.send(inner.fetch());
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(lease) => lease,
            Err(RecvTimeoutError::Timeout) => Err(Box::new(Error::ProviderTimeout {
                timeout: self.timeout,
            })),
            Err(RecvTimeoutError::Disconnected) => Err(Box::new(Error::ProviderPanicked)),
        }
    }
}

/// Bounds `provider` by `timeout`. See [`Timeout`].
pub fn with_timeout<P>(provider: P, timeout: Duration) -> Timeout<P>
where
    P: HighSegmentProvider,
{
    Timeout::new(provider, timeout)
}
