use core::{fmt, marker::PhantomData};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{BoxError, Error, H28L36, Layout, Result, Wuid};

/// The steps a generator may advance by.
pub const VALID_STEPS: [u64; 11] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1024];

/// An extra acceptance rule for leased high segments, run after the built-in
/// range and freshness checks.
pub type Verifier = Box<dyn Fn(i64) -> Result<(), BoxError> + Send + Sync + 'static>;

/// Plain-data generator settings, e.g. loaded from a configuration file.
///
/// ```
/// use wuid::{Wuid, WuidConfig};
///
/// let config = WuidConfig {
///     section: Some(3),
///     step: 16,
///     floor: 4,
///     ..WuidConfig::new("orders")
/// };
/// let generator = Wuid::from_config(&config).unwrap();
/// assert_eq!(generator.name(), "orders");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WuidConfig {
    /// Name used in log events and error messages.
    pub name: String,
    /// Section tag in `[0, 7]`; enables sectioned mode when set.
    pub section: Option<u8>,
    /// Power of two in `[1, 1024]`.
    pub step: u64,
    /// Quantization in `[0, step)`; `0` and `1` disable it.
    pub floor: u64,
    /// Non-zero seed enabling low segment obfuscation.
    pub obfuscation_seed: Option<u64>,
}

impl WuidConfig {
    /// Default settings under the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Turns these settings into a builder for layout `L`.
    pub fn builder<L: Layout>(&self) -> WuidBuilder<L> {
        let mut builder = WuidBuilder::new(self.name.clone());
        if let Some(section) = self.section {
            builder = builder.section(section);
        }
        if self.step != 1 || self.floor != 0 {
            builder = builder.step(self.step, self.floor);
        }
        if let Some(seed) = self.obfuscation_seed {
            builder = builder.obfuscation(seed);
        }
        builder
    }
}

impl Default for WuidConfig {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            section: None,
            step: 1,
            floor: 0,
            obfuscation_seed: None,
        }
    }
}

/// Validated, immutable generator options.
pub(crate) struct Options {
    pub(crate) name: String,
    pub(crate) step: u64,
    pub(crate) floor: u64,
    pub(crate) section: Option<u8>,
    pub(crate) obfuscation_mask: Option<u64>,
    pub(crate) verifier: Option<Verifier>,
}

/// Builds a [`Wuid`] generator.
///
/// Options are collected as given and validated together by
/// [`build`](Self::build), so an invalid combination never produces a
/// partially usable generator.
///
/// ```
/// use wuid::{H32L32, Wuid, WuidBuilder};
///
/// let generator = Wuid::builder("alpha")
///     .section(1)
///     .step(128, 100)
///     .obfuscation(42)
///     .build()
///     .unwrap();
/// assert!(generator.obfuscation_mask().is_some());
///
/// let short: Wuid<H32L32> = WuidBuilder::new("beta").build().unwrap();
/// assert_eq!(short.high_segment(), 0);
/// ```
pub struct WuidBuilder<L: Layout = H28L36> {
    name: String,
    section: Option<u8>,
    step: Option<(u64, u64)>,
    step_set_twice: bool,
    obfuscation_seed: Option<u64>,
    verifier: Option<Verifier>,
    _layout: PhantomData<fn() -> L>,
}

impl<L: Layout> WuidBuilder<L> {
    /// Starts a builder for a generator called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            section: None,
            step: None,
            step_set_twice: false,
            obfuscation_seed: None,
            verifier: None,
            _layout: PhantomData,
        }
    }

    /// Brands every id with a section tag in `[0, 7]`.
    ///
    /// The tag takes the top three usable bits of the high segment, which
    /// narrows the accepted high segment range to
    /// [`Layout::MAX_SECTIONED_HIGH`].
    #[must_use]
    pub fn section(mut self, section: u8) -> Self {
        self.section = Some(section);
        self
    }

    /// Advances the low segment by `step` per id and quantizes every id to a
    /// multiple of `floor` within its high segment.
    ///
    /// `step` must be a power of two in `[1, 1024]` and `floor` must be in
    /// `[0, step)`. Setting the step twice is a configuration error.
    #[must_use]
    pub fn step(mut self, step: u64, floor: u64) -> Self {
        if self.step.is_some() {
            self.step_set_twice = true;
        }
        self.step = Some((step, floor));
        self
    }

    /// XORs the low segment of every id with a mask derived from `seed`.
    ///
    /// The high segment is left readable. `seed` must not be zero.
    #[must_use]
    pub fn obfuscation(mut self, seed: u64) -> Self {
        self.obfuscation_seed = Some(seed);
        self
    }

    /// Adds an acceptance rule for leased high segments.
    #[must_use]
    pub fn high_segment_verifier<F>(mut self, verifier: F) -> Self
    where
        F: Fn(i64) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.verifier = Some(Box::new(verifier));
        self
    }

    /// Validates the options and creates the generator.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSection`] if the section is outside `[0, 7]`
    /// - [`Error::InvalidStep`] / [`Error::InvalidFloor`] for a bad step
    /// - [`Error::StepAlreadySet`] if [`step`](Self::step) was called twice
    /// - [`Error::InvalidSeed`] for a zero obfuscation seed
    pub fn build(self) -> Result<Wuid<L>> {
        if self.step_set_twice {
            return Err(Error::StepAlreadySet);
        }
        if let Some(section) = self.section {
            validate_section(section)?;
        }
        let (step, floor) = self.step.unwrap_or((1, 0));
        validate_step(step, floor)?;
        let obfuscation_mask = match self.obfuscation_seed {
            Some(seed) => Some(obfuscation_mask::<L>(seed)?),
            None => None,
        };

        Ok(Wuid::from_options(Options {
            name: self.name,
            step,
            floor,
            section: self.section,
            obfuscation_mask,
            verifier: self.verifier,
        }))
    }
}

impl<L: Layout> fmt::Debug for WuidBuilder<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WuidBuilder")
            .field("name", &self.name)
            .field("section", &self.section)
            .field("step", &self.step)
            .field("obfuscation_seed", &self.obfuscation_seed)
            .field("verifier", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

fn validate_section(section: u8) -> Result<()> {
    if section > 7 {
        return Err(Error::InvalidSection { section });
    }
    Ok(())
}

fn validate_step(step: u64, floor: u64) -> Result<()> {
    if !VALID_STEPS.contains(&step) {
        return Err(Error::InvalidStep { step });
    }
    if floor >= step {
        return Err(Error::InvalidFloor { step, floor });
    }
    Ok(())
}

/// Derives the low segment obfuscation mask for `seed`.
///
/// The derivation is a fixed 64-bit mix, so the same seed yields the same
/// mask on every run and every machine.
///
/// # Errors
///
/// Returns [`Error::InvalidSeed`] if `seed` is zero.
pub fn obfuscation_mask<L: Layout>(seed: u64) -> Result<u64> {
    if seed == 0 {
        return Err(Error::InvalidSeed);
    }
    Ok(mix64(seed) & L::LOW_MASK)
}

const fn mix64(seed: u64) -> u64 {
    const M: u64 = 0xd6e8_feb8_6659_fd93;
    let mut x = seed;
    x = (x ^ (x >> 32)).wrapping_mul(M);
    x = (x ^ (x >> 32)).wrapping_mul(M);
    x ^ (x >> 32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::H32L32;
    use std::collections::HashSet;

    #[test]
    fn rejects_invalid_sections() {
        let err = Wuid::builder("alpha").section(8).build().unwrap_err();
        assert!(matches!(err, Error::InvalidSection { section: 8 }));
        for section in 0..=7 {
            assert!(Wuid::builder("alpha").section(section).build().is_ok());
        }
    }

    #[test]
    fn rejects_invalid_steps() {
        for step in [0, 3, 6, 100, 2048] {
            let err = Wuid::builder("alpha").step(step, 0).build().unwrap_err();
            assert!(matches!(err, Error::InvalidStep { .. }), "step {step}");
        }
        for step in VALID_STEPS {
            assert!(Wuid::builder("alpha").step(step, 0).build().is_ok());
        }
    }

    #[test]
    fn rejects_invalid_floors() {
        let err = Wuid::builder("alpha").step(16, 16).build().unwrap_err();
        assert!(matches!(err, Error::InvalidFloor { step: 16, floor: 16 }));
        let err = Wuid::builder("alpha").step(1, 1).build().unwrap_err();
        assert!(err.is_config());
        assert!(Wuid::builder("alpha").step(16, 15).build().is_ok());
    }

    #[test]
    fn rejects_a_second_step() {
        let err = Wuid::builder("alpha")
            .step(16, 0)
            .step(32, 0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::StepAlreadySet));
    }

    #[test]
    fn rejects_zero_seed() {
        let err = Wuid::builder("alpha").obfuscation(0).build().unwrap_err();
        assert!(matches!(err, Error::InvalidSeed));
        assert!(matches!(
            obfuscation_mask::<H28L36>(0),
            Err(Error::InvalidSeed)
        ));
    }

    #[test]
    fn obfuscation_mask_is_deterministic() {
        assert_eq!(obfuscation_mask::<H28L36>(42).unwrap(), 0x9_0E3C_46F3);
        assert_eq!(obfuscation_mask::<H32L32>(42).unwrap(), 0x0E3C_46F3);

        let a = Wuid::builder("a").obfuscation(42).build().unwrap();
        let b = Wuid::builder("b").obfuscation(42).build().unwrap();
        assert_eq!(a.obfuscation_mask(), b.obfuscation_mask());
    }

    #[test]
    fn obfuscation_masks_differ_across_seeds() {
        let masks: HashSet<u64> = (1..=1024)
            .map(|seed| obfuscation_mask::<H28L36>(seed).unwrap())
            .collect();
        assert_eq!(masks.len(), 1024);
        assert!(!masks.contains(&0));
    }

    #[test]
    fn config_maps_onto_builder() {
        let config = WuidConfig {
            section: Some(2),
            step: 64,
            floor: 10,
            obfuscation_seed: Some(7),
            ..WuidConfig::new("orders")
        };
        let generator = Wuid::from_config(&config).unwrap();
        assert_eq!(generator.name(), "orders");
        assert_eq!(
            generator.obfuscation_mask(),
            Some(obfuscation_mask::<H28L36>(7).unwrap())
        );

        let bad = WuidConfig {
            floor: 64,
            ..config
        };
        assert!(matches!(
            Wuid::from_config(&bad),
            Err(Error::InvalidFloor { .. })
        ));
    }

    #[test]
    fn default_config_builds_a_plain_generator() {
        let config = WuidConfig::default();
        assert_eq!(config.name, "default");
        let generator: Wuid<H32L32> = config.builder().build().unwrap();
        assert_eq!(generator.obfuscation_mask(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_deserializes_with_defaults() {
        let config: WuidConfig =
            serde_json::from_str(r#"{"name":"orders","step":8,"obfuscation_seed":5}"#).unwrap();
        assert_eq!(config.name, "orders");
        assert_eq!(config.step, 8);
        assert_eq!(config.floor, 0);
        assert_eq!(config.section, None);
        assert_eq!(config.obfuscation_seed, Some(5));

        let json = serde_json::to_string(&config).unwrap();
        let back: WuidConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
