use core::{fmt, marker::PhantomData};
use std::sync::Arc;

use portable_atomic::{AtomicU64, Ordering};
use tracing::instrument;

use crate::{
    BoxError, Error, H28L36, HighSegmentProvider, Layout, Lease, Result, Stats, WuidBuilder,
    WuidConfig,
    config::{Options, Verifier},
    layout::{SECTION_CLEAR_MASK, SECTION_SHIFT},
    mutex::Mutex,
    stats::Counters,
};

/// A lock-free generator of unique, monotonic 64-bit ids.
///
/// The whole generator state is a single packed [`AtomicU64`]: the high
/// segment leased from a [`HighSegmentProvider`] and the low segment advanced
/// by one `fetch_add` per id. `Wuid` is a cheap handle; clones share the same
/// state and may be used from any number of threads.
///
/// ## Lifecycle
///
/// 1. [`Wuid::new`] / [`WuidBuilder::build`] creates an *unbound* generator;
///    [`Wuid::try_next`] returns [`Error::Unbound`] until a segment is loaded.
/// 2. [`Wuid::load`] fetches the first high segment and binds the provider
///    for later renewals.
/// 3. Once the low segment passes [`Layout::CRITICAL_VALUE`], `try_next`
///    renews in the background every [`Layout::RENEW_INTERVAL_MASK`]` + 1`
///    ids until a renewal lands.
/// 4. If the low segment reaches [`Layout::PANIC_VALUE`] first, the generator
///    is exhausted for good and `try_next` returns [`Error::Exhausted`].
pub struct Wuid<L: Layout = H28L36> {
    pub(crate) shared: Arc<Shared<L>>,
}

pub(crate) struct Shared<L: Layout> {
    #[cfg(feature = "cache-padded")]
    pub(crate) state: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    pub(crate) state: AtomicU64,
    pub(crate) step: u64,
    pub(crate) floor: u64,
    /// Section tag already shifted into place, `0` when monolithic.
    pub(crate) section: u64,
    pub(crate) sectioned: bool,
    pub(crate) obfuscation_mask: Option<u64>,
    pub(crate) verifier: Option<Verifier>,
    pub(crate) name: String,
    pub(crate) renew: Mutex<Option<Arc<dyn HighSegmentProvider>>>,
    pub(crate) counters: Counters,
    _layout: PhantomData<fn() -> L>,
}

impl Wuid {
    /// Creates an unbound generator with the default [`H28L36`] layout and
    /// default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name)
            .build()
            .unwrap_or_else(|_| unreachable!("default options are valid"))
    }

    /// Starts a [`WuidBuilder`] for the default [`H28L36`] layout. Use
    /// [`WuidBuilder::new`] for other layouts.
    pub fn builder(name: impl Into<String>) -> WuidBuilder {
        WuidBuilder::new(name)
    }

    /// Creates a generator with the default layout from plain settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings are invalid. See
    /// [`WuidBuilder::build`].
    pub fn from_config(config: &WuidConfig) -> Result<Self> {
        config.builder().build()
    }
}

impl<L: Layout> Wuid<L> {
    pub(crate) fn from_options(options: Options) -> Self {
        let Options {
            name,
            step,
            floor,
            section,
            obfuscation_mask,
            verifier,
        } = options;
        Self {
            shared: Arc::new(Shared {
                #[cfg(feature = "cache-padded")]
                state: crossbeam_utils::CachePadded::new(AtomicU64::new(0)),
                #[cfg(not(feature = "cache-padded"))]
                state: AtomicU64::new(0),
                step,
                floor,
                section: section.map_or(0, |s| u64::from(s) << SECTION_SHIFT),
                sectioned: section.is_some(),
                obfuscation_mask,
                verifier,
                name,
                renew: Mutex::new(None),
                counters: Counters::default(),
                _layout: PhantomData,
            }),
        }
    }

    /// Returns the next id.
    ///
    /// This is the hot path: one atomic `fetch_add`, no locking, no I/O and
    /// no allocation. Ids issued under one high segment increase by `step`
    /// in issuance order, before output transforms are applied.
    ///
    /// When the low segment lands on a renewal boundary past the critical
    /// threshold, a background renewal is started; the caller never waits
    /// for it.
    ///
    /// # Errors
    ///
    /// - [`Error::Unbound`] if no high segment has been loaded yet
    /// - [`Error::Exhausted`] once the low segment reaches the panic
    ///   threshold. The low segment is pinned at the threshold, so every
    ///   later call fails the same way instead of wrapping.
    #[instrument(level = "trace", skip(self))]
    pub fn try_next(&self) -> Result<i64> {
        let shared = &*self.shared;
        let word = shared
            .state
            .fetch_add(shared.step, Ordering::Relaxed)
            .wrapping_add(shared.step);
        let low = word & L::LOW_MASK;

        if low >= L::PANIC_VALUE {
            return Err(self.cold_exhausted(word));
        }
        if word & shared.high_value_mask() == 0 {
            return Err(Error::Unbound);
        }
        // A floor that does not divide the low segment shifts every low value
        // by the same offset below `step`, so match the one value per boundary.
        if low >= L::CRITICAL_VALUE && (low & L::RENEW_INTERVAL_MASK) < shared.step {
            self.schedule_renewal();
        }

        Ok(shared.encode(word))
    }

    /// An infallible-looking version of [`Self::try_next`].
    ///
    /// # Panics
    ///
    /// Panics if the generator is unbound or exhausted. Prefer
    /// [`Self::try_next`] when the caller can restart the generator.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> i64 {
        match self.try_next() {
            Ok(id) => id,
            Err(err) => panic!("<wuid> {err}. name: {}", self.shared.name),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_exhausted(&self, word: u64) -> Error {
        let shared = &*self.shared;
        let pinned = (word & L::HIGH_MASK) | L::PANIC_VALUE;
        // Only pin if nobody advanced the word since; otherwise the thread
        // that did will pin it.
        let _ = shared
            .state
            .compare_exchange(word, pinned, Ordering::Relaxed, Ordering::Relaxed);

        // Log the crossing only, not every call made after it.
        if (word & L::LOW_MASK).wrapping_sub(shared.step) < L::PANIC_VALUE {
            tracing::error!(name = %shared.name, "<wuid> the low segment is about to run out");
        }
        Error::Exhausted
    }

    /// Checks whether `high` is acceptable as the next high segment.
    ///
    /// # Errors
    ///
    /// - [`Error::NonPositiveHighSegment`] for zero or negative values
    /// - [`Error::HighSegmentOutOfRange`] above [`Layout::MAX_HIGH`], or
    ///   [`Layout::MAX_SECTIONED_HIGH`] when sectioned
    /// - [`Error::StaleHighSegment`] if `high` is the segment already in use
    /// - [`Error::Rejected`] if the configured verifier refuses it
    pub fn verify(&self, high: i64) -> Result<()> {
        let shared = &*self.shared;
        if high <= 0 {
            return Err(Error::NonPositiveHighSegment {
                name: shared.name.clone(),
                high,
            });
        }

        let max = shared.max_high();
        if high > max {
            return Err(Error::HighSegmentOutOfRange {
                name: shared.name.clone(),
                high,
                max,
            });
        }

        if high == self.high_segment() {
            return Err(Error::StaleHighSegment {
                name: shared.name.clone(),
                high,
            });
        }

        if let Some(verifier) = &shared.verifier {
            verifier(high).map_err(Error::Rejected)?;
        }
        Ok(())
    }

    /// Starts a new epoch at high segment `high`.
    ///
    /// The section tag is kept, and the low segment restarts at the smallest
    /// offset that makes the word a multiple of `floor`, so quantized ids
    /// never fall below the new segment. The word is replaced with a single
    /// atomic store. No range or freshness checks are done; see
    /// [`Self::verify`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NegativeHighSegment`] if `high` is negative.
    pub fn reset(&self, high: i64) -> Result<()> {
        if high < 0 {
            return Err(Error::NegativeHighSegment { high });
        }
        let shared = &*self.shared;
        let base = (((high as u64) << L::LOW_BITS) & shared.high_value_mask())
            | shared.section;
        let word = if shared.floor >= 2 {
            base + shared.floor_offset(base)
        } else {
            base
        };
        shared.state.store(word, Ordering::Relaxed);
        Ok(())
    }

    /// Verifies and applies a lease, returning the applied high segment.
    /// The lease's release action runs when this returns.
    pub(crate) fn apply(&self, lease: Lease) -> Result<i64> {
        let high = lease.high();
        self.verify(high)?;
        self.reset(high)?;
        tracing::info!(name = %self.shared.name, high, "<wuid> new high segment");
        Ok(high)
    }

    /// Fetches one lease from `provider` and applies it.
    pub(crate) fn load_once(&self, provider: &dyn HighSegmentProvider) -> Result<i64> {
        let lease = provider.fetch().map_err(Error::from_provider)?;
        self.apply(lease)
    }

    /// Loads the first high segment from `provider` and binds it for later
    /// renewals.
    ///
    /// Calling `load` again fetches and applies a new segment but keeps the
    /// provider bound first.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, or a validation error from
    /// [`Self::verify`]. The generator stays as it was in both cases; if it
    /// was unbound, it stays unbound.
    pub fn load<P>(&self, provider: P) -> Result<()>
    where
        P: HighSegmentProvider,
    {
        let provider: Arc<dyn HighSegmentProvider> = Arc::new(provider);
        self.load_once(provider.as_ref())?;
        self.bind(provider)
    }

    /// Like [`Self::load`] for a plain callback. The callback returns the new
    /// high segment, optionally with a release action (see [`Lease`]).
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with<F>(&self, callback: F) -> Result<()>
    where
        F: Fn() -> Result<Lease, BoxError> + Send + Sync + 'static,
    {
        self.load(callback)
    }

    /// The high segment currently in use, without the section tag. `0` while
    /// unbound.
    #[must_use]
    pub fn high_segment(&self) -> i64 {
        let shared = &*self.shared;
        let word = shared.state.load(Ordering::Relaxed);
        ((word & shared.high_value_mask()) >> L::LOW_BITS) as i64
    }

    /// A snapshot of the renewal counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.shared.counters.snapshot()
    }

    /// The name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The low segment obfuscation mask, if obfuscation is enabled.
    #[must_use]
    pub fn obfuscation_mask(&self) -> Option<u64> {
        self.shared.obfuscation_mask
    }

    /// The section tag, if sectioned.
    #[must_use]
    pub fn section(&self) -> Option<u8> {
        let shared = &*self.shared;
        shared
            .sectioned
            .then(|| (shared.section >> SECTION_SHIFT) as u8)
    }
}

impl<L: Layout> Shared<L> {
    /// Bits of the word holding the high segment value, excluding the section
    /// tag when sectioned.
    #[inline(always)]
    pub(crate) const fn high_value_mask(&self) -> u64 {
        if self.sectioned {
            L::HIGH_MASK & SECTION_CLEAR_MASK
        } else {
            L::HIGH_MASK
        }
    }

    #[inline(always)]
    const fn max_high(&self) -> i64 {
        if self.sectioned {
            L::MAX_SECTIONED_HIGH
        } else {
            L::MAX_HIGH
        }
    }

    /// Offset from the start of the segment at `base` to its first multiple
    /// of `floor`. Always below `floor`, and so below `step`.
    #[inline(always)]
    const fn floor_offset(&self, base: u64) -> u64 {
        (self.floor - base % self.floor) % self.floor
    }

    /// Applies the output transforms: low segment obfuscation, then floor
    /// quantization.
    ///
    /// With a floor, both transforms work on the distance from the
    /// floor-aligned start of the segment in whole steps, and the mask bits
    /// below `step` are left out. Ids then stay multiples of `floor`, stay
    /// distinct, and never leave the high segment they were issued under.
    #[inline(always)]
    pub(crate) fn encode(&self, word: u64) -> i64 {
        let base = word & L::HIGH_MASK;
        let low = word & L::LOW_MASK;
        if self.floor < 2 {
            return match self.obfuscation_mask {
                Some(mask) => (base | (low ^ mask)) as i64,
                None => word as i64,
            };
        }

        let start = self.floor_offset(base);
        let steps = !(self.step - 1);
        let mut offset = low.wrapping_sub(start) & L::LOW_MASK & steps;
        if let Some(mask) = self.obfuscation_mask {
            offset ^= mask & steps;
        }
        (base + start + offset / self.floor * self.floor) as i64
    }
}

impl<L: Layout> Clone for Wuid<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L: Layout> fmt::Debug for Wuid<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = &*self.shared;
        f.debug_struct("Wuid")
            .field("name", &shared.name)
            .field("high_segment", &self.high_segment())
            .field("step", &shared.step)
            .field("floor", &shared.floor)
            .field("section", &self.section())
            .field("obfuscated", &shared.obfuscation_mask.is_some())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
