//! The commpage: a read-only page the kernel shares with every process,
//! holding CPU and system facts that libSystem reads without a syscall.

use types::ArchFamily;
use vm::{Engine, Perms};

use crate::error::{Error, Result};
use crate::memory::AddressSpaceView;

pub const COMMPAGE_SIZE: u64 = 0x1000;
pub const COMMPAGE_LABEL: &str = "[commpage]";

pub const X8664_COMMPAGE_ADDRESS: u64 = 0x7fff_ffe0_0000;
pub const ARM64_COMMPAGE_ADDRESS: u64 = 0xf_ffff_c000;

// Field offsets, relative to the commpage base.
pub const SIGNATURE: u64 = 0x000;
pub const CPU_CAPABILITIES64: u64 = 0x010;
pub const VERSION: u64 = 0x01e;
pub const NCPUS: u64 = 0x022;
pub const CACHE_LINESIZE: u64 = 0x026;
pub const PHYSICAL_CPUS: u64 = 0x035;
pub const LOGICAL_CPUS: u64 = 0x036;
pub const MEMORY_SIZE: u64 = 0x038;
pub const CPUFAMILY: u64 = 0x040;

pub const SIGNATURE_64: &[u8; 16] = b"commpage 64-bit\0";
pub const COMMPAGE_VERSION: u16 = 14;

/// Host facts the commpage advertises to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommpageInfo {
    pub cpu_capabilities: u64,
    pub ncpus: u8,
    pub physical_cpus: u8,
    pub logical_cpus: u8,
    pub cache_linesize: u16,
    pub memory_size: u64,
    pub cpufamily: u32,
}

impl Default for CommpageInfo {
    fn default() -> Self {
        Self {
            cpu_capabilities: 0x0000_0000_0000_07c7,
            ncpus: 4,
            physical_cpus: 4,
            logical_cpus: 4,
            cache_linesize: 64,
            memory_size: 8 << 30,
            cpufamily: 0x10b2_82dc,
        }
    }
}

pub fn commpage_address(arch: ArchFamily) -> Result<u64> {
    match arch {
        ArchFamily::X8664 => Ok(X8664_COMMPAGE_ADDRESS),
        ArchFamily::Arm64 => Ok(ARM64_COMMPAGE_ADDRESS),
        ArchFamily::X86 => Err(Error::Architecture(arch, "no commpage address")),
    }
}

/// Maps the (still empty) commpage.
pub fn map_commpage(memory: &mut AddressSpaceView<'_>, arch: ArchFamily) -> Result<u64> {
    let address = commpage_address(arch)?;
    memory.map(address, COMMPAGE_SIZE, Perms::r(), COMMPAGE_LABEL)?;
    Ok(address)
}

/// Fills in the commpage fields. Only the x86_64 layout is known.
pub fn load_commpage(engine: &mut dyn Engine, base: u64, info: &CommpageInfo) -> Result<()> {
    engine.mem_write(base + SIGNATURE, SIGNATURE_64)?;
    engine.mem_write(base + CPU_CAPABILITIES64, &info.cpu_capabilities.to_le_bytes())?;
    engine.mem_write(base + VERSION, &COMMPAGE_VERSION.to_le_bytes())?;
    engine.mem_write(base + NCPUS, &[info.ncpus])?;
    engine.mem_write(base + CACHE_LINESIZE, &info.cache_linesize.to_le_bytes())?;
    engine.mem_write(base + PHYSICAL_CPUS, &[info.physical_cpus])?;
    engine.mem_write(base + LOGICAL_CPUS, &[info.logical_cpus])?;
    engine.mem_write(base + MEMORY_SIZE, &info.memory_size.to_le_bytes())?;
    engine.mem_write(base + CPUFAMILY, &info.cpufamily.to_le_bytes())?;
    Ok(())
}
