//! Minimal global descriptor table for x86_64 guests.
//!
//! The engine starts with null selectors. A flat table is built in guest
//! memory and ring-3 code/data selectors are loaded from it.

use log::debug;
use vm::{Engine, Perms, Register};

use crate::error::Result;
use crate::memory::{AddressSpaceView, RegionLedger};

pub const GDT_ADDRESS: u64 = 0x3000;
pub const GDT_LIMIT: u64 = 0x1000;
pub const GDT_ENTRY_SIZE: u64 = 8;

// access byte
pub const A_PRESENT: u8 = 0x80;
pub const A_PRIV_0: u8 = 0x00;
pub const A_PRIV_3: u8 = 0x60;
pub const A_DATA: u8 = 0x10;
pub const A_DATA_WRITABLE: u8 = 0x02;
pub const A_CODE: u8 = 0x18;
pub const A_CODE_READABLE: u8 = 0x02;
pub const A_DIR_CON_BIT: u8 = 0x04;

// flags nibble
pub const F_GRANULARITY: u8 = 0x8;
pub const F_PROT_32: u8 = 0x4;

// selector bits
pub const S_GDT: u16 = 0x0;
pub const S_PRIV_0: u16 = 0x0;
pub const S_PRIV_3: u16 = 0x3;

pub const CS_INDEX: u16 = 3;
pub const DS_INDEX: u16 = 5;
pub const SS_INDEX: u16 = 6;

/// Encodes one segment descriptor.
pub fn create_gdt_entry(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    let base = base as u64;
    let limit = limit as u64;
    let mut entry = limit & 0xffff;
    entry |= (base & 0xff_ffff) << 16;
    entry |= (access as u64) << 40;
    entry |= ((limit >> 16) & 0xf) << 48;
    entry |= ((flags as u64) & 0xf) << 52;
    entry |= ((base >> 24) & 0xff) << 56;
    entry
}

pub const fn create_selector(index: u16, flags: u16) -> u16 {
    (index << 3) | flags
}

pub struct GdtManager<'a> {
    engine: &'a mut dyn Engine,
    base: u64,
    limit: u64,
}

impl<'a> GdtManager<'a> {
    /// Maps the table and points GDTR at it.
    pub fn new(ledger: &mut RegionLedger, engine: &'a mut dyn Engine) -> Result<Self> {
        Self::with_base(ledger, engine, GDT_ADDRESS, GDT_LIMIT)
    }

    pub fn with_base(ledger: &mut RegionLedger, engine: &'a mut dyn Engine, base: u64, limit: u64) -> Result<Self> {
        AddressSpaceView::new(ledger, &mut *engine).map(base, limit, Perms::rw(), "[GDT]")?;
        engine.reg_write(Register::GdtrBase, base)?;
        engine.reg_write(Register::GdtrLimit, limit - 1)?;
        Ok(Self { engine, base, limit })
    }

    pub fn register_gdt_segment(&mut self, index: u16, base: u32, limit: u32, access: u8, flags: u8) -> Result<()> {
        let offset = index as u64 * GDT_ENTRY_SIZE;
        debug_assert!(offset + GDT_ENTRY_SIZE <= self.limit);
        let entry = create_gdt_entry(base, limit, access, flags);
        self.engine.mem_write(self.base + offset, &entry.to_le_bytes())?;
        debug!("gdt[{}] = 0x{:016x}", index, entry);
        Ok(())
    }

    /// Loads flat ring-3 code and data segments into CS, DS, ES and a ring-0
    /// stack segment into SS.
    pub fn setup_flat_segments(&mut self) -> Result<()> {
        self.register_gdt_segment(
            CS_INDEX,
            0,
            0xfffff,
            A_PRESENT | A_CODE | A_CODE_READABLE | A_PRIV_3 | A_DIR_CON_BIT,
            F_PROT_32 | F_GRANULARITY,
        )?;
        self.engine
            .reg_write(Register::Cs, create_selector(CS_INDEX, S_GDT | S_PRIV_3) as u64)?;

        self.register_gdt_segment(
            DS_INDEX,
            0,
            0xfffff,
            A_PRESENT | A_DATA | A_DATA_WRITABLE | A_PRIV_3 | A_DIR_CON_BIT,
            F_PROT_32,
        )?;
        let data = create_selector(DS_INDEX, S_GDT | S_PRIV_3) as u64;
        self.engine.reg_write(Register::Ds, data)?;
        self.engine.reg_write(Register::Es, data)?;

        self.register_gdt_segment(
            SS_INDEX,
            0,
            0xfffff,
            A_PRESENT | A_DATA | A_DATA_WRITABLE | A_PRIV_0 | A_DIR_CON_BIT,
            F_PROT_32,
        )?;
        self.engine
            .reg_write(Register::Ss, create_selector(SS_INDEX, S_GDT | S_PRIV_0) as u64)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_encode_index_and_rpl() {
        assert_eq!(create_selector(CS_INDEX, S_GDT | S_PRIV_3), 0x1b);
        assert_eq!(create_selector(DS_INDEX, S_GDT | S_PRIV_3), 0x2b);
        assert_eq!(create_selector(SS_INDEX, S_GDT | S_PRIV_0), 0x30);
    }

    #[test]
    fn flat_descriptor_layout() {
        let entry = create_gdt_entry(0, 0xfffff, A_PRESENT | A_DATA | A_DATA_WRITABLE, F_PROT_32 | F_GRANULARITY);
        assert_eq!(entry & 0xffff, 0xffff);
        assert_eq!((entry >> 40) & 0xff, 0x92);
        assert_eq!((entry >> 48) & 0xf, 0xf);
        assert_eq!((entry >> 52) & 0xf, 0xc);
        assert_eq!(entry >> 56, 0);
    }
}
