use std::collections::HashMap;
use std::fmt;

use log::{debug, info};
use types::ArchFamily;
use vm::{Engine, Register, Trap};

use crate::error::{Error, Result};
use crate::session::SessionContext;

/// Outcome after a trap handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapAction {
    Continue,
    /// The guest asked to terminate; the engine loop is stopped.
    Exit,
}

/// Snapshot of the CPU state for one syscall trap.
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub trap: Trap,
    /// BSD syscall number with the darwin class bits stripped.
    pub number: u64,
    pub pc: u64,
}

/// Receives every syscall trap of a session.
pub trait SyscallDispatcher: fmt::Debug {
    fn dispatch(
        &mut self,
        engine: &mut dyn Engine,
        session: &mut SessionContext,
        trap: Trap,
    ) -> Result<TrapAction>;
}

pub type TrapHandler = Box<dyn FnMut(&mut dyn Engine, &mut SessionContext, &TrapFrame) -> Result<TrapAction>>;

/// Syscall numbers the default table knows about.
pub mod syscall {
    /// x86_64 darwin encodes the syscall class in the upper bits of RAX.
    pub const CLASS_MASK: u64 = 0xff00_0000;
    pub const CLASS_UNIX: u64 = 0x0200_0000;

    pub const EXIT: u64 = 1;
}

/// Strips the darwin syscall class from the raw register value.
pub fn syscall_number(arch: ArchFamily, raw: u64) -> u64 {
    match arch {
        ArchFamily::X8664 => raw & !syscall::CLASS_MASK,
        _ => raw,
    }
}

/// Dispatches traps by syscall number. Unknown numbers are errors.
pub struct TrapTable {
    handlers: HashMap<u64, TrapHandler>,
}

impl fmt::Debug for TrapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrapTable")
            .field("registered", &self.handlers.len())
            .finish()
    }
}

impl Default for TrapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapTable {
    /// A table with only `exit` installed.
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.register(syscall::EXIT, Box::new(sys_exit));
        table
    }

    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, number: u64, handler: TrapHandler) {
        self.handlers.insert(number, handler);
    }

    pub fn is_registered(&self, number: u64) -> bool {
        self.handlers.contains_key(&number)
    }
}

impl SyscallDispatcher for TrapTable {
    fn dispatch(
        &mut self,
        engine: &mut dyn Engine,
        session: &mut SessionContext,
        trap: Trap,
    ) -> Result<TrapAction> {
        let arch = engine.arch();
        let raw = engine.reg_read(Register::syscall_number(arch))?;
        let frame = TrapFrame {
            trap,
            number: syscall_number(arch, raw),
            pc: engine.pc(),
        };
        debug!("syscall {} ({:?}) at 0x{:x}", frame.number, frame.trap, frame.pc);

        match self.handlers.get_mut(&frame.number) {
            Some(handler) => handler(engine, session, &frame),
            None => Err(Error::UnknownSyscall {
                number: frame.number,
                pc: frame.pc,
            }),
        }
    }
}

fn sys_exit(engine: &mut dyn Engine, session: &mut SessionContext, _frame: &TrapFrame) -> Result<TrapAction> {
    let status = engine.reg_read(Register::syscall_arg0(engine.arch()))?;
    info!("guest exit({})", status as i64);
    session.exit_code = Some(status as i64);
    Ok(TrapAction::Exit)
}
