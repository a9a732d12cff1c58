/// Bit position of the 3-bit section tag. Bit 63 is never set, so every id
/// is a non-negative `i64`.
pub const SECTION_SHIFT: u32 = 60;

/// Every bit of the word except the section tag and the sign bit.
pub const SECTION_CLEAR_MASK: u64 = 0x0FFF_FFFF_FFFF_FFFF;

/// A fixed split of the 64-bit word into a leased high segment and a locally
/// incremented low segment.
///
/// The split is a compile-time property of a generator, chosen through its
/// type parameter (e.g. `Wuid<H32L32>`), so all packing arithmetic works on
/// constants. Implementations are produced by the built-in profiles
/// [`H28L36`] and [`H32L32`].
pub trait Layout: Send + Sync + 'static {
    /// Number of bits above the low segment, including the sign bit.
    const HIGH_BITS: u32;

    /// Number of bits in the low segment.
    const LOW_BITS: u32;

    /// Mask of the low segment.
    const LOW_MASK: u64;

    /// Mask of every bit above the low segment, excluding the sign bit.
    const HIGH_MASK: u64;

    /// Largest high segment a monolithic generator accepts.
    const MAX_HIGH: i64;

    /// Largest high segment a sectioned generator accepts; the section tag
    /// takes the top three usable bits.
    const MAX_SECTIONED_HIGH: i64;

    /// Low segment value at which `try_next` starts failing with
    /// `Error::Exhausted`: 96% of the low space, rounded down to 1024.
    const PANIC_VALUE: u64;

    /// Low segment value from which background renewal is attempted: 80% of
    /// the low space, rounded down to 1024.
    const CRITICAL_VALUE: u64;

    /// Renewal is only attempted when the low segment is a multiple of
    /// `RENEW_INTERVAL_MASK + 1`, so a failed renewal is retried periodically
    /// instead of on every call.
    const RENEW_INTERVAL_MASK: u64;

    /// First low segment value at which a renewal is attempted.
    const FIRST_RENEW_VALUE: u64;
}

/// Declares a [`Layout`] profile.
///
/// ```text
/// define_layout!(<TypeName>, high: <bits>, low: <bits>);
/// ```
///
/// The two widths must add up to 64; this is asserted at compile time.
macro_rules! define_layout {
    (
        $(#[$meta:meta])*
        $name:ident,
        high: $high_bits:expr,
        low: $low_bits:expr
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name;

        const _: () = {
            assert!(
                $high_bits + $low_bits == u64::BITS,
                "Layout must cover the whole 64-bit word"
            );
            // The section tag must sit entirely above the low segment.
            assert!($low_bits < SECTION_SHIFT);
        };

        impl Layout for $name {
            const HIGH_BITS: u32 = $high_bits;
            const LOW_BITS: u32 = $low_bits;
            const LOW_MASK: u64 = (1 << Self::LOW_BITS) - 1;
            const HIGH_MASK: u64 = (u64::MAX >> 1) & !Self::LOW_MASK;
            const MAX_HIGH: i64 = (Self::HIGH_MASK >> Self::LOW_BITS) as i64;
            const MAX_SECTIONED_HIGH: i64 =
                ((Self::HIGH_MASK & SECTION_CLEAR_MASK) >> Self::LOW_BITS) as i64;
            const PANIC_VALUE: u64 = ((1 << Self::LOW_BITS) * 96 / 100) & !1023;
            const CRITICAL_VALUE: u64 = ((1 << Self::LOW_BITS) * 80 / 100) & !1023;
            const RENEW_INTERVAL_MASK: u64 = (1 << (Self::LOW_BITS - 7)) - 1;
            const FIRST_RENEW_VALUE: u64 =
                (Self::CRITICAL_VALUE + Self::RENEW_INTERVAL_MASK) & !Self::RENEW_INTERVAL_MASK;
        }
    };
}

define_layout!(
    /// 28 high bits, 36 low bits. The default profile.
    ///
    /// ```text
    ///  Bit Index:  63 62          36 35           0
    ///              +--+-------------+-------------+
    ///  Field:      |0 |  high (27)  |  low (36)   |
    ///              +--+-------------+-------------+
    /// ```
    ///
    /// Renewal is attempted every 2^29 ids once the low segment passes 80%.
    H28L36,
    high: 28,
    low: 36
);

define_layout!(
    /// 32 high bits, 32 low bits.
    ///
    /// ```text
    ///  Bit Index:  63 62          32 31           0
    ///              +--+-------------+-------------+
    ///  Field:      |0 |  high (31)  |  low (32)   |
    ///              +--+-------------+-------------+
    /// ```
    ///
    /// Leases last sixteen times shorter than with [`H28L36`], in exchange
    /// for a larger high segment range. Renewal is attempted every 2^25 ids
    /// once the low segment passes 80%.
    H32L32,
    high: 32,
    low: 32
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h28l36_constants() {
        assert_eq!(H28L36::LOW_MASK, 0x0F_FFFF_FFFF);
        assert_eq!(H28L36::HIGH_MASK, 0x07FF_FFFF << 36);
        assert_eq!(H28L36::MAX_HIGH, 0x07FF_FFFF);
        assert_eq!(H28L36::MAX_SECTIONED_HIGH, 0x00FF_FFFF);
        assert_eq!(H28L36::PANIC_VALUE, 0xF_5C28_F400);
        assert_eq!(H28L36::CRITICAL_VALUE, 0xC_CCCC_CC00);
        assert_eq!(H28L36::RENEW_INTERVAL_MASK, 0x2000_0000 - 1);
        assert_eq!(H28L36::FIRST_RENEW_VALUE, 0xC_E000_0000);
    }

    #[test]
    fn h32l32_constants() {
        assert_eq!(H32L32::LOW_MASK, 0xFFFF_FFFF);
        assert_eq!(H32L32::HIGH_MASK, 0x7FFF_FFFF << 32);
        assert_eq!(H32L32::MAX_HIGH, 0x7FFF_FFFF);
        assert_eq!(H32L32::MAX_SECTIONED_HIGH, 0x0FFF_FFFF);
        assert_eq!(H32L32::PANIC_VALUE, 0xF5C2_8C00);
        assert_eq!(H32L32::CRITICAL_VALUE, 0xCCCC_CC00);
        assert_eq!(H32L32::RENEW_INTERVAL_MASK, 0x0200_0000 - 1);
        assert_eq!(H32L32::FIRST_RENEW_VALUE, 0xCE00_0000);
    }

    fn check_thresholds<L: Layout>() {
        assert!(L::CRITICAL_VALUE < L::FIRST_RENEW_VALUE);
        assert!(L::FIRST_RENEW_VALUE < L::PANIC_VALUE);
        assert!(L::PANIC_VALUE < L::LOW_MASK);
        assert_eq!(L::FIRST_RENEW_VALUE & L::RENEW_INTERVAL_MASK, 0);
        assert_eq!(L::PANIC_VALUE % 1024, 0);
        // Every supported step divides the renewal interval.
        assert_eq!((L::RENEW_INTERVAL_MASK + 1) % 1024, 0);
        // Section bits never overlap the low segment.
        assert_eq!((0b111 << SECTION_SHIFT) & L::LOW_MASK, 0);
    }

    #[test]
    fn thresholds_are_ordered() {
        check_thresholds::<H28L36>();
        check_thresholds::<H32L32>();
    }
}
