use core::fmt;

/// Guest CPU families known to the OS layer.
///
/// Not every family is supported by every component: the heap only knows the
/// word size of the x86 families, while the macOS layout table only covers
/// X86_64 and ARM64. Callers get an architecture error for the gaps instead of
/// a silent default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchFamily {
    X86,
    X8664,
    Arm64,
}

impl ArchFamily {
    /// Pointer width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            ArchFamily::X86 => 32,
            ArchFamily::X8664 | ArchFamily::Arm64 => 64,
        }
    }

    /// Heap chunk alignment, when the allocator knows this family.
    pub const fn heap_alignment(self) -> Option<u64> {
        match self {
            ArchFamily::X86 => Some(4),
            ArchFamily::X8664 => Some(8),
            ArchFamily::Arm64 => None,
        }
    }

    /// Address used as "run until the end" when no stop address is given.
    pub const fn emu_end(self) -> u64 {
        match self.bits() {
            32 => 0x8fff_ffff,
            _ => 0xffff_ffff_ffff_ffff,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ArchFamily::X86 => "x86",
            ArchFamily::X8664 => "x8664",
            ArchFamily::Arm64 => "arm64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "x86" => Some(ArchFamily::X86),
            "x8664" | "x86_64" => Some(ArchFamily::X8664),
            "arm64" | "aarch64" => Some(ArchFamily::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for ArchFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_alignment_table() {
        assert_eq!(ArchFamily::X86.heap_alignment(), Some(4));
        assert_eq!(ArchFamily::X8664.heap_alignment(), Some(8));
        assert_eq!(ArchFamily::Arm64.heap_alignment(), None);
    }

    #[test]
    fn names_round_trip() {
        for arch in [ArchFamily::X86, ArchFamily::X8664, ArchFamily::Arm64] {
            assert_eq!(ArchFamily::from_name(arch.name()), Some(arch));
        }
        assert_eq!(ArchFamily::from_name("mips"), None);
    }
}
