//! Fixed guest address-space layouts for the macOS personality.

use crate::ArchFamily;

/// Where the stack, the mmap area and the vmmap trap page live for one
/// architecture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuestMemoryLayout {
    pub stack_address: u64,
    pub stack_size: u64,
    pub mmap_base_address: u64,
    pub vmmap_trap_address: u64,
}

impl GuestMemoryLayout {
    pub const ARM64: GuestMemoryLayout = GuestMemoryLayout {
        stack_address: 0x0000_0001_6050_3000,
        stack_size: 0x21000,
        mmap_base_address: 0x7ffb_f010_0000,
        vmmap_trap_address: 0x4000_000f_4000,
    };

    pub const X8664: GuestMemoryLayout = GuestMemoryLayout {
        stack_address: 0x7ffc_f000_0000,
        stack_size: 0x19a0_0000,
        mmap_base_address: 0x7ffb_f010_0000,
        vmmap_trap_address: 0x4000_000f_4000,
    };

    /// Layout table lookup. 32-bit x86 has no macOS layout.
    pub const fn for_arch(arch: ArchFamily) -> Option<GuestMemoryLayout> {
        match arch {
            ArchFamily::Arm64 => Some(Self::ARM64),
            ArchFamily::X8664 => Some(Self::X8664),
            ArchFamily::X86 => None,
        }
    }

    /// Initial stack pointer for a full binary: the top of the default stack.
    pub const fn stack_top(&self) -> u64 {
        self.stack_address + self.stack_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_has_no_layout() {
        assert!(GuestMemoryLayout::for_arch(ArchFamily::X86).is_none());
    }

    #[test]
    fn stack_top_is_end_of_default_stack() {
        let layout = GuestMemoryLayout::for_arch(ArchFamily::X8664).unwrap();
        assert_eq!(layout.stack_top(), 0x7ffc_f000_0000 + 0x19a0_0000);
    }
}
