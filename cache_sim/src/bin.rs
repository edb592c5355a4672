use std::ops::Range;

/// width of the physical address carried by a bus record.
pub const ADDRESS_BITS: u32 = 27;

/// mask of bits `r.start..=r.end`. the range is inclusive on both ends.
#[inline]
pub const fn bit_range(r: Range<u32>) -> u32 {
    let large: u32 = if r.end != 31 { 1 << (r.end + 1) } else { 0 };
    large.wrapping_sub(1 << r.start)
}

/// mask of the lowest `width` bits. `width` may be 0 or 32.
#[inline]
pub const fn low_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

#[inline]
const fn mask(bin: u32, r: Range<u32>) -> u32 {
    bin & bit_range(r)
}

#[inline]
pub const fn extract(bin: u32, r: Range<u32>) -> u32 {
    let left = r.start;
    mask(bin, r) >> left
}

/// masks `addr` into the 27-bit physical address space.
#[inline]
pub const fn physical(addr: u32) -> u32 {
    addr & low_mask(ADDRESS_BITS)
}

/// returns `log2(v)` if `v` is a power of two.
#[inline]
pub const fn exact_log2(v: usize) -> Option<u32> {
    if v.is_power_of_two() {
        Some(v.trailing_zeros())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_range() {
        assert_eq!(0b1, bit_range(0..0));
        assert_eq!(0b110000, bit_range(4..5));
        assert_eq!(0b1111111, bit_range(0..6));
        assert_eq!(0xe000_0000, bit_range(29..31));
    }
    #[test]
    fn test_low_mask() {
        assert_eq!(0, low_mask(0));
        assert_eq!(0xf, low_mask(4));
        assert_eq!(0x07ff_ffff, low_mask(ADDRESS_BITS));
        assert_eq!(u32::MAX, low_mask(32));
    }
    #[test]
    fn test_extract() {
        let word = 0b110_10_000_0000_0000_0000_0000_0001_0000;
        assert_eq!(0b110, extract(word, 29..31));
        assert_eq!(0b10, extract(word, 27..28));
        assert_eq!(0x10, extract(word, 0..26));
    }
    #[test]
    fn test_exact_log2() {
        assert_eq!(Some(0), exact_log2(1));
        assert_eq!(Some(4), exact_log2(16));
        assert_eq!(Some(10), exact_log2(1024));
        assert_eq!(None, exact_log2(0));
        assert_eq!(None, exact_log2(24));
    }
}
