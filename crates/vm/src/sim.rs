use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use types::{ArchFamily, PAGE_SIZE};

use crate::decoder::{decode, fetch_len, Instruction};
use crate::engine::{Engine, HookFn, HookId, InsnKind, Trap};
use crate::error::EngineError;
use crate::memory::{MemRegion, Perms};
use crate::registers::Register;

/// Interrupt number unicorn reports for an arm64 `svc`.
pub const ARM64_EXCP_SWI: u32 = 2;

#[derive(Debug)]
struct Region {
    end: u64,
    perms: Perms,
    data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HookKind {
    Insn(InsnKind),
    Intr,
}

struct HookEntry {
    id: HookId,
    kind: HookKind,
    callback: Rc<RefCell<HookFn>>,
}

/// Deterministic reference engine.
///
/// Memory is a set of page-aligned regions backed by host vectors, registers
/// live in a map, and the fetch-execute loop understands only the instructions
/// in [`crate::decoder`]. Anything else faults, which is exactly what the OS
/// layer needs to exercise its fault path.
pub struct SimEngine {
    arch: ArchFamily,
    regions: BTreeMap<u64, Region>,
    regs: HashMap<Register, u64>,
    hooks: Vec<HookEntry>,
    next_hook: usize,
    stop_requested: bool,
    /// Instructions retired by the last `emu_start`.
    pub retired: u64,
}

impl std::fmt::Debug for SimEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEngine")
            .field("arch", &self.arch)
            .field("regions", &self.regions.len())
            .field("hooks", &self.hooks.len())
            .field("pc", &format_args!("0x{:x}", self.pc()))
            .finish()
    }
}

impl SimEngine {
    pub fn new(arch: ArchFamily) -> Self {
        Self {
            arch,
            regions: BTreeMap::new(),
            regs: HashMap::new(),
            hooks: Vec::new(),
            next_hook: 0,
            stop_requested: false,
            retired: 0,
        }
    }

    /// Convenience for callers that want the engine behind a shared handle.
    pub fn shared(arch: ArchFamily) -> Rc<RefCell<SimEngine>> {
        Rc::new(RefCell::new(Self::new(arch)))
    }

    fn locate(&self, address: u64) -> Option<(u64, &Region)> {
        self.regions
            .range(..=address)
            .next_back()
            .filter(|(_, region)| address < region.end)
            .map(|(begin, region)| (*begin, region))
    }

    fn set_pc(&mut self, value: u64) {
        self.regs.insert(Register::pc(self.arch), value);
    }

    fn fetch(&self, pc: u64, len: usize) -> Result<Vec<u8>, EngineError> {
        match self.locate(pc) {
            None => return Err(EngineError::FetchUnmapped(pc)),
            Some((_, region)) if !region.perms.exec => return Err(EngineError::FetchProtected(pc)),
            Some(_) => {}
        }
        self.mem_read(pc, len).map_err(|_| EngineError::FetchUnmapped(pc))
    }

    fn next_instruction(&self, pc: u64) -> Result<(Instruction, u8), EngineError> {
        let first = self.fetch(pc, 1)?[0];
        let bytes = self.fetch(pc, fetch_len(self.arch, first))?;
        decode(self.arch, &bytes).ok_or(EngineError::InsnInvalid { pc })
    }

    fn dispatch_hooks(&mut self, kind: HookKind, trap: Trap) -> usize {
        let callbacks: Vec<_> = self
            .hooks
            .iter()
            .filter(|hook| hook.kind == kind)
            .map(|hook| Rc::clone(&hook.callback))
            .collect();

        for callback in &callbacks {
            let mut callback = callback.borrow_mut();
            let hook: &mut HookFn = &mut callback;
            let engine: &mut dyn Engine = self;
            hook(engine, trap);
        }
        callbacks.len()
    }

    /// Executes one instruction. Returns `false` when the guest halted.
    fn step(&mut self) -> Result<bool, EngineError> {
        let pc = self.pc();
        let (instr, size) = self.next_instruction(pc)?;
        trace!("0x{:x}: {}", pc, instr.pretty_print());

        // Hooks observe the PC after the trapping instruction and may redirect it.
        self.set_pc(pc.wrapping_add(size as u64));
        self.retired += 1;

        match instr {
            Instruction::Nop => {}
            Instruction::Hlt => return Ok(false),
            Instruction::Syscall => {
                self.dispatch_hooks(HookKind::Insn(InsnKind::Syscall), Trap::Syscall);
            }
            Instruction::Int(n) => {
                if self.dispatch_hooks(HookKind::Intr, Trap::Interrupt(n as u32)) == 0 {
                    return Err(EngineError::UnhandledException { intno: n as u32, pc });
                }
            }
            Instruction::Svc(_) => {
                if self.dispatch_hooks(HookKind::Intr, Trap::Interrupt(ARM64_EXCP_SWI)) == 0 {
                    return Err(EngineError::UnhandledException { intno: ARM64_EXCP_SWI, pc });
                }
            }
        }
        Ok(true)
    }

    fn add_hook(&mut self, kind: HookKind, hook: HookFn) -> HookId {
        let id = HookId(self.next_hook);
        self.next_hook += 1;
        self.hooks.push(HookEntry {
            id,
            kind,
            callback: Rc::new(RefCell::new(hook)),
        });
        id
    }
}

impl Engine for SimEngine {
    fn arch(&self) -> ArchFamily {
        self.arch
    }

    fn mem_map(&mut self, address: u64, size: u64, perms: Perms) -> Result<(), EngineError> {
        if size == 0 {
            return Err(EngineError::InvalidArgument("mapping size is zero"));
        }
        if address % PAGE_SIZE != 0 || size % PAGE_SIZE != 0 {
            return Err(EngineError::InvalidArgument("mapping is not page aligned"));
        }
        let end = address
            .checked_add(size)
            .ok_or(EngineError::InvalidArgument("mapping wraps the address space"))?;

        let overlaps = self
            .regions
            .iter()
            .any(|(begin, region)| address < region.end && *begin < end);
        if overlaps {
            return Err(EngineError::MapOverlap { address, size });
        }

        debug!("sim: map 0x{:x}-0x{:x} {}", address, end, perms);
        self.regions.insert(
            address,
            Region {
                end,
                perms,
                data: vec![0u8; size as usize],
            },
        );
        Ok(())
    }

    fn mem_read(&self, address: u64, size: usize) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::with_capacity(size);
        let mut cursor = address;
        let end = address
            .checked_add(size as u64)
            .ok_or(EngineError::ReadUnmapped(address))?;

        while cursor < end {
            let (begin, region) = self.locate(cursor).ok_or(EngineError::ReadUnmapped(cursor))?;
            let take = (region.end.min(end) - cursor) as usize;
            let offset = (cursor - begin) as usize;
            out.extend_from_slice(&region.data[offset..offset + take]);
            cursor += take as u64;
        }
        Ok(out)
    }

    fn mem_write(&mut self, address: u64, data: &[u8]) -> Result<(), EngineError> {
        let end = address
            .checked_add(data.len() as u64)
            .ok_or(EngineError::WriteUnmapped(address))?;

        // Validate the whole range first so a failed write leaves memory untouched.
        let mut cursor = address;
        while cursor < end {
            let (_, region) = self.locate(cursor).ok_or(EngineError::WriteUnmapped(cursor))?;
            cursor = region.end;
        }

        let mut cursor = address;
        let mut written = 0usize;
        while cursor < end {
            let begin = match self.locate(cursor) {
                Some((begin, _)) => begin,
                None => return Err(EngineError::WriteUnmapped(cursor)),
            };
            let region = self
                .regions
                .get_mut(&begin)
                .ok_or(EngineError::WriteUnmapped(cursor))?;
            let take = (region.end.min(end) - cursor) as usize;
            let offset = (cursor - begin) as usize;
            region.data[offset..offset + take].copy_from_slice(&data[written..written + take]);
            written += take;
            cursor += take as u64;
        }
        Ok(())
    }

    fn mem_regions(&self) -> Vec<MemRegion> {
        self.regions
            .iter()
            .map(|(begin, region)| MemRegion {
                begin: *begin,
                end: region.end,
                perms: region.perms,
            })
            .collect()
    }

    fn reg_read(&self, reg: Register) -> Result<u64, EngineError> {
        if !reg.belongs_to(self.arch) {
            return Err(EngineError::InvalidRegister(reg));
        }
        Ok(self.regs.get(&reg).copied().unwrap_or(0))
    }

    fn reg_write(&mut self, reg: Register, value: u64) -> Result<(), EngineError> {
        if !reg.belongs_to(self.arch) {
            return Err(EngineError::InvalidRegister(reg));
        }
        self.regs.insert(reg, value);
        Ok(())
    }

    fn hook_insn(&mut self, kind: InsnKind, hook: HookFn) -> HookId {
        self.add_hook(HookKind::Insn(kind), hook)
    }

    fn hook_intr(&mut self, hook: HookFn) -> HookId {
        self.add_hook(HookKind::Intr, hook)
    }

    fn hook_del(&mut self, id: HookId) {
        self.hooks.retain(|hook| hook.id != id);
    }

    fn emu_start(&mut self, begin: u64, until: u64, timeout: Option<Duration>) -> Result<(), EngineError> {
        self.stop_requested = false;
        self.retired = 0;
        self.set_pc(begin);
        let started = Instant::now();

        loop {
            if self.pc() == until || self.stop_requested {
                break;
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    debug!("sim: timeout after {} instructions", self.retired);
                    break;
                }
            }
            if !self.step()? {
                break;
            }
        }

        debug!("sim: stopped at 0x{:x} after {} instructions", self.pc(), self.retired);
        Ok(())
    }

    fn emu_stop(&mut self) {
        self.stop_requested = true;
    }

    fn disassemble(&self, address: u64, size: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut pc = address;
        let end = address.saturating_add(size as u64);
        while pc < end {
            match self.next_instruction(pc) {
                Ok((instr, len)) => {
                    lines.push(format!("0x{:x}: {}", pc, instr.pretty_print()));
                    pc += len as u64;
                }
                Err(_) => {
                    if let Ok(byte) = self.mem_read(pc, 1) {
                        lines.push(format!("0x{:x}: .byte 0x{}", pc, hex::encode(byte)));
                    }
                    break;
                }
            }
        }
        lines
    }
}
