#![forbid(unsafe_code)]

//! Relationships between route labels.
//!
//! A label `d` is *behind* a label `m` when every packet routed to `d`
//! passes through `m`: the low `significant_bits(m)` bits of both labels
//! agree. The one-hop test goes a step further and inspects the bits of `d`
//! that lie beyond `m` to decide whether exactly one more hop is encoded
//! there.
//!
//! The one-hop test relies on how the daemon's number compression packs a
//! single hop's interface index. Its thresholds are empirical; any change to
//! the daemon's label compression breaks them and they must be revisited.

/// Width (in significant bits) of a single hop encoded in the 1-bit form:
/// 3 bits of interface index plus the 1-bit prefix.
pub const ONE_BIT_FORM_WIDTH: u32 = 4;

/// Width of a single hop encoded in the 2-bit form: 5 bits of interface
/// index plus the 2-bit prefix.
pub const TWO_BIT_FORM_WIDTH: u32 = 7;

/// Width of a single hop encoded in the 3-bit form: 7 bits of interface
/// index plus the 3-bit prefix.
pub const THREE_BIT_FORM_WIDTH: u32 = 10;

/// Number of bits from the highest set bit down to bit 0 inclusive.
///
/// Zero only for the degenerate label `0`.
#[inline]
#[must_use]
pub fn significant_bits(label: u64) -> u32 {
    u64::BITS - label.leading_zeros()
}

/// Mask covering the low `bits` bits. `bits == 0` yields an empty mask.
#[inline]
fn low_mask(bits: u32) -> u64 {
    u64::MAX.checked_shr(u64::BITS - bits).unwrap_or(0)
}

/// True iff packets destined for `destination` go through `midpoint`.
#[must_use]
pub fn is_behind(destination: u64, midpoint: u64) -> bool {
    if midpoint > destination {
        return false;
    }
    let mask = low_mask(significant_bits(midpoint));
    destination & mask == midpoint & mask
}

/// Best-effort hint that `destination` is exactly one physical hop beyond
/// `midpoint`.
///
/// May produce false positives for labels that are not behind `midpoint`;
/// the `is_behind` pre-check is what removes them.
#[must_use]
pub fn is_one_hop(destination: u64, midpoint: u64) -> bool {
    if !is_behind(destination, midpoint) {
        return false;
    }
    let c = destination.checked_shr(significant_bits(midpoint)).unwrap_or(0);
    if c & 1 != 0 {
        significant_bits(c) == ONE_BIT_FORM_WIDTH
    } else if c & 3 != 0 {
        significant_bits(c) == TWO_BIT_FORM_WIDTH
    } else {
        significant_bits(c) == THREE_BIT_FORM_WIDTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn significant_bits_matches_log2() {
        assert_eq!(significant_bits(0), 0);
        assert_eq!(significant_bits(1), 1);
        assert_eq!(significant_bits(0x13), 5);
        assert_eq!(significant_bits(0x8000_0000_0000_0000), 64);
        assert_eq!(significant_bits(u64::MAX), 64);
    }

    #[test]
    fn label_is_behind_itself() {
        for x in [1u64, 0x13, 0x55, 0xdead_beef, u64::MAX] {
            assert!(is_behind(x, x), "{x:#x}");
        }
    }

    #[test]
    fn longer_midpoint_is_never_ancestor() {
        let pairs = [(0x13u64, 0x14u64), (1, 2), (0x55, u64::MAX), (0x100, 0x101)];
        for (d, m) in pairs {
            assert!(!is_behind(d, m), "{d:#x} behind {m:#x}");
        }
    }

    #[test]
    fn only_odd_labels_are_behind_self_label() {
        assert!(is_behind(0x13, 1));
        assert!(!is_behind(0x12, 1));
        assert!(is_behind(u64::MAX, 1));
    }

    #[test]
    fn mask_compares_low_bits_only() {
        // 0b1_0011 is behind 0b11 (low two bits agree) but not behind 0b101.
        assert!(is_behind(0x13, 0x3));
        assert!(!is_behind(0x13, 0x5));
    }

    #[test]
    fn one_bit_form_hop_from_self() {
        // 0x13 >> 1 = 0b1001: low bit set, four significant bits.
        assert!(is_behind(0x13, 0x1));
        assert!(is_one_hop(0x13, 0x1));
        // 0x23 >> 1 = 0b10001: low bit set but five significant bits.
        assert!(!is_one_hop(0x23, 0x1));
    }

    #[test]
    fn two_bit_form_hop() {
        // c = 0b100_0010: low bits 10, seven significant bits.
        let c: u64 = 0b100_0010;
        let d = (c << 1) | 1;
        assert!(is_one_hop(d, 1));
        // Same prefix class with eight significant bits is rejected.
        let d = ((c | 0b1000_0000) << 1) | 1;
        assert!(!is_one_hop(d, 1));
    }

    #[test]
    fn three_bit_form_hop() {
        // c = 0b10_0000_0100: low two bits clear, ten significant bits.
        let c: u64 = 0b10_0000_0100;
        let d = (c << 1) | 1;
        assert!(is_one_hop(d, 1));
        let wide: u64 = 0b100_0000_0100;
        assert!(!is_one_hop((wide << 1) | 1, 1));
    }

    #[test]
    fn one_hop_beyond_longer_midpoint() {
        // Midpoint 0x13 (5 bits); append hop 0b1011 above it.
        let m: u64 = 0x13;
        let d = (0b1011u64 << 5) | m;
        assert!(is_one_hop(d, m));
        assert!(!is_one_hop(m, d));
    }

    #[test]
    fn label_is_not_one_hop_from_itself() {
        for x in [1u64, 0x13, 0x2a5, u64::MAX] {
            assert!(!is_one_hop(x, x));
        }
    }

    #[test]
    fn one_hop_implies_behind() {
        let samples = [0u64, 1, 2, 3, 0x13, 0x17, 0x23, 0x85, 0x285, 0x409, 0x1013, 0xffff, u64::MAX];
        for &d in &samples {
            for &m in &samples {
                if is_one_hop(d, m) {
                    assert!(is_behind(d, m), "{d:#x} one hop from {m:#x} but not behind");
                }
            }
        }
        for d in 0u64..2048 {
            for m in [1u64, 3, 5, 0x13] {
                assert!(!is_one_hop(d, m) || is_behind(d, m));
            }
        }
    }
}
