use log::debug;
use vm::{Engine, Perms};

use crate::error::Result;

/// One mapping recorded by the OS layer, with a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    pub start: u64,
    /// Exclusive.
    pub end: u64,
    pub perms: Perms,
    pub label: String,
}

/// Regions the OS layer believes it has mapped.
///
/// The ledger is kept next to the engine's own region table. Mappings made
/// directly through the engine (the heap does this) do not show up here, so
/// the two can drift; [`AddressSpaceView::is_mapped`] consults both.
#[derive(Debug, Default, Clone)]
pub struct RegionLedger {
    entries: Vec<MapInfo>,
}

impl RegionLedger {
    pub fn add(&mut self, start: u64, end: u64, perms: Perms, label: impl Into<String>) {
        self.entries.push(MapInfo {
            start,
            end,
            perms,
            label: label.into(),
        });
    }

    pub fn entries(&self) -> &[MapInfo] {
        &self.entries
    }

    pub fn contains(&self, address: u64) -> bool {
        self.entries
            .iter()
            .any(|info| address >= info.start && address < info.end)
    }

    pub fn find(&self, label: &str) -> Option<&MapInfo> {
        self.entries.iter().find(|info| info.label == label)
    }

    /// One line per mapping, sorted by start address.
    pub fn show_mapinfo(&self) -> Vec<String> {
        let mut sorted: Vec<&MapInfo> = self.entries.iter().collect();
        sorted.sort_by_key(|info| info.start);
        sorted
            .into_iter()
            .map(|info| {
                format!(
                    "0x{:016x} - 0x{:016x} {} {}",
                    info.start, info.end, info.perms, info.label
                )
            })
            .collect()
    }
}

/// Query and access layer over the ledger and the engine's memory.
pub struct AddressSpaceView<'a> {
    ledger: &'a mut RegionLedger,
    engine: &'a mut dyn Engine,
}

impl<'a> AddressSpaceView<'a> {
    pub fn new(ledger: &'a mut RegionLedger, engine: &'a mut dyn Engine) -> Self {
        Self { ledger, engine }
    }

    /// Returns `true` when `address` is covered by neither the ledger nor the
    /// engine's live regions, i.e. the address is still free for a new mapping.
    pub fn is_mapped(&self, address: u64) -> bool {
        if self.ledger.contains(address) {
            return false;
        }
        !self
            .engine
            .mem_regions()
            .iter()
            .any(|region| region.contains(address))
    }

    pub fn read(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        Ok(self.engine.mem_read(address, size)?)
    }

    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        Ok(self.engine.mem_write(address, data)?)
    }

    /// Maps through the engine and records the mapping under `label`.
    pub fn map(&mut self, address: u64, size: u64, perms: Perms, label: &str) -> Result<()> {
        self.engine.mem_map(address, size, perms)?;
        self.ledger.add(address, address + size, perms, label);
        debug!("mapped {} at 0x{:x} (0x{:x} bytes)", label, address, size);
        Ok(())
    }

    /// Ledger lines followed by engine regions the ledger does not know about.
    pub fn show_mapinfo(&self) -> Vec<String> {
        let mut lines = self.ledger.show_mapinfo();
        for region in self.engine.mem_regions() {
            if !self.ledger.contains(region.begin) {
                lines.push(format!(
                    "0x{:016x} - 0x{:016x} {} [unrecorded]",
                    region.begin, region.end, region.perms
                ));
            }
        }
        lines
    }
}
