#![no_std]

pub mod arch;
pub use arch::ArchFamily;

pub mod layout;
pub use layout::GuestMemoryLayout;

/// Unicorn-style engines map memory in 4 KiB units.
pub const PAGE_SIZE: u64 = 0x1000;

/// Rounds `size` up to the next multiple of `unit`, or `None` when the
/// result does not fit in a `u64`.
///
/// `unit` does not have to be a power of two and must be non-zero.
pub const fn align(size: u64, unit: u64) -> Option<u64> {
    if size % unit == 0 {
        Some(size)
    } else {
        match (size / unit).checked_add(1) {
            Some(units) => units.checked_mul(unit),
            None => None,
        }
    }
}

/// Rounds `addr` up to the end of the page that contains it.
pub const fn page_align_end(addr: u64, page_size: u64) -> Option<u64> {
    align(addr, page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_rounds_up_to_unit() {
        assert_eq!(align(0, 8), Some(0));
        assert_eq!(align(1, 8), Some(8));
        assert_eq!(align(8, 8), Some(8));
        assert_eq!(align(10, 8), Some(16));
        assert_eq!(align(10, 4), Some(12));
        assert_eq!(align(0x1001, PAGE_SIZE), Some(0x2000));
    }

    #[test]
    fn align_accepts_non_power_of_two_units() {
        assert_eq!(align(7, 3), Some(9));
    }

    #[test]
    fn align_reports_overflow() {
        assert_eq!(align(u64::MAX - 3, 8), None);
        assert_eq!(align(u64::MAX, 8), None);
        assert_eq!(align(u64::MAX - 7, 8), Some(u64::MAX - 7));
        assert_eq!(page_align_end(u64::MAX - 0xffe, PAGE_SIZE), None);
    }

    #[test]
    fn page_align_end_keeps_aligned_addresses() {
        assert_eq!(page_align_end(0x100004000, PAGE_SIZE), Some(0x100004000));
        assert_eq!(page_align_end(0x100004001, PAGE_SIZE), Some(0x100005000));
    }
}
