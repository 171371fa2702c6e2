use thiserror::Error;

use crate::registers::Register;

/// Low-level failures reported by an engine, modelled on the unicorn error set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("mapping 0x{address:x}+0x{size:x} overlaps an existing region")]
    MapOverlap { address: u64, size: u64 },

    #[error("read from unmapped memory at 0x{0:x}")]
    ReadUnmapped(u64),

    #[error("write to unmapped memory at 0x{0:x}")]
    WriteUnmapped(u64),

    #[error("instruction fetch from unmapped memory at 0x{0:x}")]
    FetchUnmapped(u64),

    #[error("instruction fetch from non-executable memory at 0x{0:x}")]
    FetchProtected(u64),

    #[error("invalid instruction at 0x{pc:x}")]
    InsnInvalid { pc: u64 },

    #[error("unhandled CPU exception (intno={intno}) at 0x{pc:x}")]
    UnhandledException { intno: u32, pc: u64 },

    #[error("register {0:?} does not exist on this architecture")]
    InvalidRegister(Register),
}
