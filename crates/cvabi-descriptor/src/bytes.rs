// Native-endian readers over borrowed bytes. Every read is bounds-checked and
// alignment-agnostic; callers enforce alignment separately where the format
// requires it.

#[inline]
pub(crate) fn read_u8(b: &[u8], off: usize) -> Option<u8> {
    b.get(off).copied()
}

#[inline]
pub(crate) fn read_u16_ne(b: &[u8], off: usize) -> Option<u16> {
    let s = b.get(off..off.checked_add(2)?)?;
    Some(u16::from_ne_bytes([s[0], s[1]]))
}

#[inline]
pub(crate) fn read_u32_ne(b: &[u8], off: usize) -> Option<u32> {
    let s = b.get(off..off.checked_add(4)?)?;
    Some(u32::from_ne_bytes([s[0], s[1], s[2], s[3]]))
}

#[inline]
pub(crate) fn read_u64_ne(b: &[u8], off: usize) -> Option<u64> {
    let s = b.get(off..off.checked_add(8)?)?;
    let mut arr = [0u8; 8];
    arr.copy_from_slice(s);
    Some(u64::from_ne_bytes(arr))
}

#[inline]
pub(crate) fn read_usize_ne(b: &[u8], off: usize) -> Option<usize> {
    const N: usize = core::mem::size_of::<usize>();
    let s = b.get(off..off.checked_add(N)?)?;
    let mut arr = [0u8; N];
    arr.copy_from_slice(s);
    Some(usize::from_ne_bytes(arr))
}

#[inline]
pub(crate) fn align_up(x: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    Some(x.checked_add(align - 1)? & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_stop_at_the_end_of_the_slice() {
        let b = [1u8, 2, 3];
        assert_eq!(read_u8(&b, 2), Some(3));
        assert_eq!(read_u8(&b, 3), None);
        assert!(read_u16_ne(&b, 1).is_some());
        assert_eq!(read_u16_ne(&b, 2), None);
        assert_eq!(read_u32_ne(&b, 0), None);
        assert_eq!(read_u16_ne(&b, usize::MAX), None);
    }

    #[test]
    fn align_up_rounds_to_the_next_multiple() {
        assert_eq!(align_up(0, 8), Some(0));
        assert_eq!(align_up(9, 8), Some(16));
        assert_eq!(align_up(16, 8), Some(16));
        assert_eq!(align_up(usize::MAX, 8), None);
    }
}
