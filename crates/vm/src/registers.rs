use types::ArchFamily;

/// Registers the OS layer reads or writes, across all supported families.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    // x86
    Eax,
    Ebx,
    Esp,
    Eip,

    // x86_64
    Rax,
    Rdi,
    Rsp,
    Rip,
    Cs,
    Ds,
    Ss,
    Es,
    GdtrBase,
    GdtrLimit,

    // arm64
    X0,
    X16, // darwin syscall number
    Sp,
    Pc,
    CpacrEl1, // FP/SIMD access control
}

impl Register {
    pub fn belongs_to(self, arch: ArchFamily) -> bool {
        use Register::*;
        match arch {
            ArchFamily::X86 => matches!(self, Eax | Ebx | Esp | Eip | Cs | Ds | Ss | Es | GdtrBase | GdtrLimit),
            ArchFamily::X8664 => matches!(self, Rax | Rdi | Rsp | Rip | Cs | Ds | Ss | Es | GdtrBase | GdtrLimit),
            ArchFamily::Arm64 => matches!(self, X0 | X16 | Sp | Pc | CpacrEl1),
        }
    }

    pub fn pc(arch: ArchFamily) -> Register {
        match arch {
            ArchFamily::X86 => Register::Eip,
            ArchFamily::X8664 => Register::Rip,
            ArchFamily::Arm64 => Register::Pc,
        }
    }

    pub fn sp(arch: ArchFamily) -> Register {
        match arch {
            ArchFamily::X86 => Register::Esp,
            ArchFamily::X8664 => Register::Rsp,
            ArchFamily::Arm64 => Register::Sp,
        }
    }

    /// Register carrying the syscall number on darwin.
    pub fn syscall_number(arch: ArchFamily) -> Register {
        match arch {
            ArchFamily::X86 => Register::Eax,
            ArchFamily::X8664 => Register::Rax,
            ArchFamily::Arm64 => Register::X16,
        }
    }

    /// First syscall argument.
    pub fn syscall_arg0(arch: ArchFamily) -> Register {
        match arch {
            ArchFamily::X86 => Register::Ebx,
            ArchFamily::X8664 => Register::Rdi,
            ArchFamily::Arm64 => Register::X0,
        }
    }

    /// Register carrying the syscall return value.
    pub fn syscall_return(arch: ArchFamily) -> Register {
        match arch {
            ArchFamily::X86 => Register::Eax,
            ArchFamily::X8664 => Register::Rax,
            ArchFamily::Arm64 => Register::X0,
        }
    }
}
