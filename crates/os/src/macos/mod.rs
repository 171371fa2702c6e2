//! Execution lifecycle of a macOS guest.
//!
//! [`MacOs::load`] lays out the address space and builds the Mach-domain
//! collaborators, [`MacOs::run`] installs the syscall trap, finishes the
//! per-architecture CPU setup and drives the engine loop.

pub mod commpage;
pub mod gdt;
pub mod mach;
pub mod thread;
pub mod utils;

use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use log::{debug, error, info};
use types::{page_align_end, ArchFamily, GuestMemoryLayout};
use vm::{Engine, EngineError, EngineRef, HookFn, HookId, InsnKind, Perms, Register, Trap};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::heap::Heap;
use crate::loader::LoaderInfo;
use crate::session::{SessionContext, SessionRef};
use crate::traps::{SyscallDispatcher, TrapAction, TrapTable};

use self::commpage::CommpageInfo;
use self::gdt::GdtManager;
use self::mach::MachDomain;
use self::thread::ThreadManagement;

pub use self::mach::MACH_PORT_START;

/// Stack used when running raw shellcode without explicit parameters.
pub const SHELLCODE_STACK_ADDRESS: u64 = 0x100_0000;
pub const SHELLCODE_STACK_SIZE: u64 = 10 * 1024 * 1024;
/// Shellcode is copied this far into its stack mapping.
pub const SHELLCODE_OFFSET: u64 = 0x20_0000 - 0x1000;

/// CPACR_EL1.FPEN: no FP/SIMD traps at EL0 or EL1.
const CPACR_FPEN: u64 = 0x30_0000;

pub type DispatcherRef = Rc<RefCell<dyn SyscallDispatcher>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Unloaded,
    Loaded,
    Running,
    Stopped,
    Faulted,
}

/// Diagnostics collected after an engine fault in verbose output modes.
#[derive(Debug, Clone)]
pub struct FaultReport {
    pub pc: u64,
    pub map_info: Vec<String>,
    /// Up to 8 bytes at the faulting PC; empty when the PC is unmapped.
    pub bytes_at_pc: Vec<u8>,
    pub disassembly: Vec<String>,
    pub error: EngineError,
}

impl FaultReport {
    fn log(&self) {
        error!("PC = 0x{:x}: {}", self.pc, self.error);
        for line in &self.map_info {
            error!("  {}", line);
        }
        error!("bytes at PC: {}", hex::encode(&self.bytes_at_pc));
        for line in &self.disassembly {
            error!("  {}", line);
        }
    }
}

/// Resolves the stack placement for a session.
///
/// Zero is treated like an absent value. With the compatibility quirk on, an
/// explicit pair puts the *size* into the address and leaves the size at the
/// mode default.
pub fn select_stack(config: &SessionConfig, layout: &GuestMemoryLayout) -> Result<(u64, u64)> {
    let explicit_address = config.stack_address.filter(|address| *address != 0);
    let explicit_size = config.stack_size.filter(|size| *size != 0);

    let (default_address, default_size) = if config.is_shellcode() {
        (SHELLCODE_STACK_ADDRESS, SHELLCODE_STACK_SIZE)
    } else {
        (layout.stack_address, layout.stack_size)
    };

    match (explicit_address, explicit_size) {
        (None, None) => Ok((default_address, default_size)),
        (Some(address), Some(size)) => {
            if config.quirks.stack_size_overwrites_address {
                Ok((size, default_size))
            } else {
                Ok((address, size))
            }
        }
        _ => Err(Error::IncompleteStackParams),
    }
}

#[derive(Debug)]
pub struct MacOs {
    arch: ArchFamily,
    engine: EngineRef,
    session: SessionRef,
    loader: LoaderInfo,
    dispatcher: DispatcherRef,
    state: ControllerState,

    layout: Option<GuestMemoryLayout>,
    stack_address: u64,
    stack_size: u64,
    /// Top of the default stack, used as SP when the loader gives none.
    stack_sp: u64,
    shellcode_start: Option<u64>,
    vmmap_end: u64,
    envs: Vec<String>,
    argv: Vec<String>,
    guest_path: String,

    mach: Option<MachDomain>,
    thread_management: Option<ThreadManagement>,
    stop_address: u64,
    hooks: Vec<HookId>,
    last_fault: Option<FaultReport>,
}

impl MacOs {
    pub fn new(engine: EngineRef, loader: LoaderInfo, config: SessionConfig) -> Self {
        let arch = engine.borrow().arch();
        Self {
            arch,
            session: SessionContext::shared(arch, config),
            engine,
            loader,
            dispatcher: Rc::new(RefCell::new(TrapTable::new())),
            state: ControllerState::Unloaded,
            layout: None,
            stack_address: 0,
            stack_size: 0,
            stack_sp: 0,
            shellcode_start: None,
            vmmap_end: 0,
            envs: Vec::new(),
            argv: Vec::new(),
            guest_path: String::new(),
            mach: None,
            thread_management: None,
            stop_address: 0,
            hooks: Vec::new(),
            last_fault: None,
        }
    }

    /// Replaces the default trap table. Takes effect at the next `run()`.
    pub fn with_dispatcher(mut self, dispatcher: DispatcherRef) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn load(&mut self) -> Result<()> {
        if self.state != ControllerState::Unloaded {
            return Err(Error::InvalidState(self.state));
        }

        let layout = GuestMemoryLayout::for_arch(self.arch)
            .ok_or(Error::Architecture(self.arch, "no macOS memory layout"))?;
        let config = self.session.borrow().config.clone();
        let (stack_address, stack_size) = select_stack(&config, &layout)?;
        debug!("stack 0x{:x} (0x{:x} bytes)", stack_address, stack_size);

        if let Some(code) = &config.shellcode {
            let end = SHELLCODE_OFFSET.checked_add(code.len() as u64);
            if end.is_none_or(|end| end > stack_size) {
                return Err(Error::ShellcodeTooLarge {
                    len: code.len() as u64,
                    stack_size,
                });
            }
        }

        let mach = MachDomain::new(&self.engine, &config.rootfs);

        {
            let mut engine = self.engine.borrow_mut();
            let mut session = self.session.borrow_mut();
            let mut memory = session.memory(&mut *engine);
            memory.map(stack_address, stack_size, Perms::rwx(), "[stack]")?;

            if let Some(code) = &config.shellcode {
                let start = stack_address + SHELLCODE_OFFSET;
                memory.write(start, code)?;
                self.shellcode_start = Some(start);
                debug!("shellcode: {} bytes at 0x{:x}", code.len(), start);
            }
        }

        if !config.is_shellcode() {
            self.vmmap_end = layout.vmmap_trap_address;
            self.stack_sp = layout.stack_top();
            self.envs = utils::env_dict_to_array(&config.env);
            self.guest_path = utils::real_to_vm_abspath(&config.rootfs, &config.path);
            self.argv = std::iter::once(self.guest_path.clone())
                .chain(config.args.iter().cloned())
                .collect();
        }

        let heap = Heap::new(
            self.arch,
            layout.mmap_base_address,
            layout.mmap_base_address + config.heap_size,
            config.page_size,
        )
        .with_exact_fit_reuse(config.quirks.heap_reuse_exact_fit);
        self.session.borrow_mut().heap = Some(heap);

        self.layout = Some(layout);
        self.stack_address = stack_address;
        self.stack_size = stack_size;
        self.mach = Some(mach);
        self.state = ControllerState::Loaded;
        info!("{} guest loaded", self.arch);
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        if self.state != ControllerState::Loaded {
            return Err(Error::InvalidState(self.state));
        }
        self.state = ControllerState::Running;

        match self.execute() {
            Ok(()) => {
                self.state = ControllerState::Stopped;
                info!("guest stopped");
                match self.session.borrow_mut().take_pending_error() {
                    Some(pending) => Err(pending),
                    None => Ok(()),
                }
            }
            Err(err) => {
                self.state = ControllerState::Faulted;
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<()> {
        let config = self.session.borrow().config.clone();
        let sp = self
            .loader
            .stack_address
            .or(self.shellcode_start)
            .unwrap_or(self.stack_sp);

        self.setup_cpu(sp)?;

        let min_offset = page_align_end(self.loader.vm_end_addr, config.page_size)
            .ok_or_else(|| Error::Loader(format!("image end 0x{:x} overflows", self.loader.vm_end_addr)))?;
        if let Some(mach) = self.mach.as_mut() {
            mach.task.min_offset = min_offset;
        }
        info!("output mode: {:?}", config.output);

        self.setup_commpage()?;

        let mut threads = ThreadManagement::new();
        let main = threads.spawn();
        threads.set_current(main);
        self.thread_management = Some(threads);

        self.stop_address = config
            .stop_address
            .filter(|address| *address != 0)
            .unwrap_or_else(|| self.arch.emu_end());

        let (begin, until) = match (self.shellcode_start, &config.shellcode) {
            (Some(start), Some(code)) => (start, start + code.len() as u64),
            _ => (self.loader.entry_point, self.stop_address),
        };
        info!("emulating 0x{:x} -> 0x{:x}", begin, until);

        let outcome = self.engine.borrow_mut().emu_start(begin, until, config.timeout);
        if let Err(source) = outcome {
            // The fault wins; a trap error parked before it is only reported.
            if let Some(pending) = self.session.borrow_mut().take_pending_error() {
                error!("trap error before the fault: {}", pending);
            }
            if config.output.is_verbose() {
                let report = self.fault_report(source.clone());
                report.log();
                self.last_fault = Some(report);
            }
            return Err(Error::ExecutionStopped { source });
        }
        Ok(())
    }

    fn setup_cpu(&mut self, sp: u64) -> Result<()> {
        let hook = trap_hook(Rc::clone(&self.session), Rc::clone(&self.dispatcher));
        let mut engine = self.engine.borrow_mut();
        match self.arch {
            ArchFamily::Arm64 => {
                let cpacr = engine.reg_read(Register::CpacrEl1)?;
                engine.reg_write(Register::CpacrEl1, cpacr | CPACR_FPEN)?;
                self.hooks.push(engine.hook_intr(hook));
            }
            ArchFamily::X8664 => {
                self.hooks.push(engine.hook_insn(InsnKind::Syscall, hook));

                let mut session = self.session.borrow_mut();
                let mut gdt = GdtManager::new(&mut session.ledger, &mut *engine)?;
                gdt.setup_flat_segments()?;
            }
            ArchFamily::X86 => return Err(Error::Architecture(self.arch, "no CPU setup")),
        }
        engine.reg_write(Register::sp(self.arch), sp)?;
        Ok(())
    }

    fn setup_commpage(&mut self) -> Result<()> {
        let mut engine = self.engine.borrow_mut();
        let mut session = self.session.borrow_mut();
        let base = commpage::map_commpage(&mut session.memory(&mut *engine), self.arch)?;
        // The arm64 field layout is not known yet.
        if self.arch == ArchFamily::X8664 {
            commpage::load_commpage(&mut *engine, base, &CommpageInfo::default())?;
        }
        Ok(())
    }

    fn fault_report(&self, error: EngineError) -> FaultReport {
        let mut engine = self.engine.borrow_mut();
        let pc = engine.pc();
        let bytes_at_pc = engine.mem_read(pc, 8).unwrap_or_default();
        let disassembly = engine.disassemble(pc, 64);
        let map_info = self.session.borrow_mut().memory(&mut *engine).show_mapinfo();
        FaultReport {
            pc,
            map_info,
            bytes_at_pc,
            disassembly,
            error,
        }
    }

    /// Allocates from the guest heap. `Ok(0)` means the heap is exhausted.
    pub fn heap_allocate(&self, size: u64) -> Result<u64> {
        let mut session = self.session.borrow_mut();
        let heap = session.heap.as_mut().ok_or(Error::InvalidState(self.state))?;
        heap.allocate(&mut *self.engine.borrow_mut(), size)
    }

    pub fn heap_free(&self, address: u64) -> bool {
        match self.session.borrow_mut().heap.as_mut() {
            Some(heap) => heap.free(address),
            None => false,
        }
    }

    pub fn heap_size(&self, address: u64) -> u64 {
        self.session.borrow().heap.as_ref().map_or(0, |heap| heap.size(address))
    }

    pub fn arch(&self) -> ArchFamily {
        self.arch
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn engine(&self) -> &EngineRef {
        &self.engine
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }

    pub fn loader(&self) -> &LoaderInfo {
        &self.loader
    }

    pub fn layout(&self) -> Option<&GuestMemoryLayout> {
        self.layout.as_ref()
    }

    pub fn stack_address(&self) -> u64 {
        self.stack_address
    }

    pub fn stack_size(&self) -> u64 {
        self.stack_size
    }

    pub fn stack_sp(&self) -> u64 {
        self.stack_sp
    }

    pub fn shellcode_start(&self) -> Option<u64> {
        self.shellcode_start
    }

    pub fn vmmap_end(&self) -> u64 {
        self.vmmap_end
    }

    pub fn envs(&self) -> &[String] {
        &self.envs
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn guest_path(&self) -> &str {
        &self.guest_path
    }

    pub fn mach(&self) -> Option<&MachDomain> {
        self.mach.as_ref()
    }

    pub fn thread_management(&self) -> Option<&ThreadManagement> {
        self.thread_management.as_ref()
    }

    pub fn stop_address(&self) -> u64 {
        self.stop_address
    }

    pub fn hooks(&self) -> &[HookId] {
        &self.hooks
    }

    pub fn last_fault(&self) -> Option<&FaultReport> {
        self.last_fault.as_ref()
    }

    pub fn exit_code(&self) -> Option<i64> {
        self.session.borrow().exit_code
    }
}

/// Hook installed on the engine for every syscall trap.
///
/// Errors and panics from the dispatcher cannot cross the engine loop, so
/// they are parked in the session and the loop is stopped.
fn trap_hook(session: SessionRef, dispatcher: DispatcherRef) -> HookFn {
    Box::new(move |engine: &mut dyn Engine, trap: Trap| {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut session = session.borrow_mut();
            dispatcher.borrow_mut().dispatch(&mut *engine, &mut session, trap)
        }));
        let result = outcome.unwrap_or_else(|payload| Err(Error::TrapPanic(panic_message(payload.as_ref()))));

        match result {
            Ok(TrapAction::Continue) => {}
            Ok(TrapAction::Exit) => engine.emu_stop(),
            Err(err) => {
                error!("trap at 0x{:x}: {}", engine.pc(), err);
                session.borrow_mut().set_pending_error(err);
                engine.emu_stop();
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
