use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use types::ArchFamily;
use vm::Engine;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::heap::Heap;
use crate::memory::{AddressSpaceView, RegionLedger};

pub type SessionRef = Rc<RefCell<SessionContext>>;

/// Mutable state of one emulation session.
///
/// Trap hooks run inside the engine's loop and cannot return errors through
/// it, so they park the first failure in the pending slot; the controller
/// re-raises it once the loop returns.
#[derive(Debug)]
pub struct SessionContext {
    pub config: SessionConfig,
    pub arch: ArchFamily,
    pub ledger: RegionLedger,
    pub heap: Option<Heap>,
    /// Status passed to the guest's exit syscall, if it made one.
    pub exit_code: Option<i64>,
    pending_error: Option<Error>,
}

impl SessionContext {
    pub fn new(arch: ArchFamily, config: SessionConfig) -> Self {
        Self {
            config,
            arch,
            ledger: RegionLedger::default(),
            heap: None,
            exit_code: None,
            pending_error: None,
        }
    }

    pub fn shared(arch: ArchFamily, config: SessionConfig) -> SessionRef {
        Rc::new(RefCell::new(Self::new(arch, config)))
    }

    /// Records an error raised inside a trap. Only the first one is kept.
    pub fn set_pending_error(&mut self, error: Error) {
        if self.pending_error.is_none() {
            debug!("pending trap error: {}", error);
            self.pending_error = Some(error);
        }
    }

    pub fn has_pending_error(&self) -> bool {
        self.pending_error.is_some()
    }

    pub fn take_pending_error(&mut self) -> Option<Error> {
        self.pending_error.take()
    }

    /// Address-space view over this session's ledger and `engine`.
    pub fn memory<'a>(&'a mut self, engine: &'a mut dyn Engine) -> AddressSpaceView<'a> {
        AddressSpaceView::new(&mut self.ledger, engine)
    }
}
