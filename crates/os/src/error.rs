use thiserror::Error;
use types::ArchFamily;
use vm::EngineError;

use crate::macos::ControllerState;

/// Errors surfaced by the OS layer.
///
/// Heap exhaustion and invalid frees are reported through return values
/// (`0` / `false`), not here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported architecture {0}: {1}")]
    Architecture(ArchFamily, &'static str),

    #[error("explicit stack parameters need both an address and a size")]
    IncompleteStackParams,

    #[error("shellcode of {len} bytes does not fit a 0x{stack_size:x} byte stack")]
    ShellcodeTooLarge { len: u64, stack_size: u64 },

    #[error("controller is {0:?}, run() requires a loaded session")]
    InvalidState(ControllerState),

    /// Any engine fault during `run()`. Never retried.
    #[error("execution terminated")]
    ExecutionStopped {
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("unknown syscall {number} at 0x{pc:x}")]
    UnknownSyscall { number: u64, pc: u64 },

    #[error("syscall {number} failed: {message}")]
    Syscall { number: u64, message: String },

    /// A panic caught at the trap boundary.
    #[error("trap handler panicked: {0}")]
    TrapPanic(String),

    #[error("invalid executable: {0}")]
    Loader(String),

    #[error(transparent)]
    Goblin(#[from] goblin::error::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
