use goblin::mach::MachO;

use crate::error::{Error, Result};

/// What the OS layer needs from the executable loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderInfo {
    pub entry_point: u64,
    /// End of the highest loaded segment.
    pub vm_end_addr: u64,
    /// Stack pointer the loader prepared, if any.
    pub stack_address: Option<u64>,
}

impl LoaderInfo {
    pub fn new(entry_point: u64, vm_end_addr: u64) -> Self {
        Self {
            entry_point,
            vm_end_addr,
            stack_address: None,
        }
    }

    pub fn with_stack_address(mut self, stack_address: u64) -> Self {
        self.stack_address = Some(stack_address);
        self
    }

    /// Reads the entry point and image end from a thin Mach-O executable.
    ///
    /// Segments are not copied into guest memory; that stays the loader's job.
    pub fn from_macho(bytes: &[u8]) -> Result<Self> {
        let macho = MachO::parse(bytes, 0)?;

        let mut text_vmaddr = None;
        let mut vm_end_addr = 0u64;
        for segment in macho.segments.iter() {
            let name = segment.name()?;
            if name == "__PAGEZERO" || segment.vmsize == 0 {
                continue;
            }
            if name == "__TEXT" {
                text_vmaddr = Some(segment.vmaddr);
            }
            vm_end_addr = vm_end_addr.max(segment.vmaddr + segment.vmsize);
        }

        // LC_MAIN stores an offset into __TEXT, LC_UNIXTHREAD an absolute PC.
        let entry_point = if macho.old_style_entry {
            macho.entry
        } else {
            let base = text_vmaddr.ok_or_else(|| Error::Loader("LC_MAIN without a __TEXT segment".to_string()))?;
            base + macho.entry
        };

        if vm_end_addr == 0 {
            return Err(Error::Loader("no loadable segments".to_string()));
        }

        Ok(Self::new(entry_point, vm_end_addr))
    }
}
