use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use types::ArchFamily;

use crate::error::EngineError;
use crate::memory::{MemRegion, Perms};
use crate::registers::Register;

/// Shared handle to the session's engine.
pub type EngineRef = Rc<RefCell<dyn Engine>>;

/// Why a trap hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// A filtered instruction hook matched a `syscall` instruction.
    Syscall,
    /// A CPU interrupt or exception with its number.
    Interrupt(u32),
}

/// Instruction filters accepted by [`Engine::hook_insn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnKind {
    Syscall,
}

/// Callback invoked synchronously from inside the fetch-execute loop. Guest
/// execution resumes only after it returns.
pub type HookFn = Box<dyn FnMut(&mut dyn Engine, Trap)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub usize);

/// Everything the OS layer consumes from a CPU emulator.
pub trait Engine: fmt::Debug {
    fn arch(&self) -> ArchFamily;

    // --- memory ---
    fn mem_map(&mut self, address: u64, size: u64, perms: Perms) -> Result<(), EngineError>;
    fn mem_read(&self, address: u64, size: usize) -> Result<Vec<u8>, EngineError>;
    fn mem_write(&mut self, address: u64, data: &[u8]) -> Result<(), EngineError>;
    fn mem_regions(&self) -> Vec<MemRegion>;

    // --- registers ---
    fn reg_read(&self, reg: Register) -> Result<u64, EngineError>;
    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), EngineError>;

    fn pc(&self) -> u64 {
        self.reg_read(Register::pc(self.arch())).unwrap_or(0)
    }

    // --- hooks ---
    fn hook_insn(&mut self, kind: InsnKind, hook: HookFn) -> HookId;
    fn hook_intr(&mut self, hook: HookFn) -> HookId;
    fn hook_del(&mut self, id: HookId);

    // --- execution ---
    /// Runs from `begin` until the PC reaches `until`, the timeout expires,
    /// [`Engine::emu_stop`] is called, or a fault occurs.
    fn emu_start(&mut self, begin: u64, until: u64, timeout: Option<Duration>) -> Result<(), EngineError>;
    fn emu_stop(&mut self);

    /// Short listing of the code at `address`. Engines without a disassembler
    /// fall back to raw hex rows.
    fn disassemble(&self, address: u64, size: usize) -> Vec<String> {
        match self.mem_read(address, size) {
            Ok(bytes) => bytes
                .chunks(16)
                .enumerate()
                .map(|(i, row)| format!("0x{:x}: {}", address + (i * 16) as u64, hex::encode(row)))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
