//! Guest heap.
//!
//! A best-fit-ish chunk allocator over a reserved `[start, end)` guest range.
//! Pages are mapped lazily as `current_use` passes `current_alloc`. Chunks are
//! never split, merged or unmapped: a free only flips `in_use`, and a later
//! request reuses the smallest free chunk that is large enough. Fragmentation
//! is therefore bounded only by the set of distinct sizes ever requested.

use log::{debug, warn};
use types::{align, ArchFamily};
use vm::{Engine, Perms};

use crate::error::{Error, Result};

/// One allocation record. Identity is the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub address: u64,
    /// Already rounded to the architecture's word alignment.
    pub size: u64,
    pub in_use: bool,
}

impl Chunk {
    fn new(address: u64, size: u64) -> Self {
        Self {
            address,
            size,
            in_use: true,
        }
    }
}

#[derive(Debug)]
pub struct Heap {
    arch: ArchFamily,
    start_address: u64,
    end_address: u64,
    page_size: u64,
    /// Bytes mapped so far, starting at `start_address`.
    current_alloc: u64,
    /// Bytes handed out as chunks so far.
    current_use: u64,
    chunks: Vec<Chunk>,
    reuse_exact_fit: bool,
}

impl Heap {
    pub fn new(arch: ArchFamily, start_address: u64, end_address: u64, page_size: u64) -> Self {
        Self {
            arch,
            start_address,
            end_address,
            page_size,
            current_alloc: 0,
            current_use: 0,
            chunks: Vec::new(),
            reuse_exact_fit: false,
        }
    }

    /// Also reuse free chunks whose size equals the request.
    pub fn with_exact_fit_reuse(mut self, enabled: bool) -> Self {
        self.reuse_exact_fit = enabled;
        self
    }

    /// Allocates `size` bytes and returns the guest address.
    ///
    /// `Ok(0)` means the reserved range is exhausted; nothing changes in that
    /// case. Errors are fatal: an architecture without a known word size, or
    /// the engine refusing to map the next pages.
    pub fn allocate(&mut self, engine: &mut dyn Engine, size: u64) -> Result<u64> {
        let alignment = self
            .arch
            .heap_alignment()
            .ok_or(Error::Architecture(self.arch, "no heap alignment"))?;
        let Some(size) = align(size, alignment) else {
            debug!("heap: exhausted, {} bytes requested", size);
            return Ok(0);
        };

        self.chunks.sort_by_key(|chunk| chunk.size);
        let reuse_exact_fit = self.reuse_exact_fit;
        if let Some(chunk) = self.chunks.iter_mut().find(|chunk| {
            !chunk.in_use && (chunk.size > size || (reuse_exact_fit && chunk.size == size))
        }) {
            chunk.in_use = true;
            debug!("heap: reuse chunk 0x{:x} ({} bytes) for {}", chunk.address, chunk.size, size);
            return Ok(chunk.address);
        }

        // Any overflow along the way means the request cannot fit either.
        let Some(new_use) = self.current_use.checked_add(size) else {
            debug!("heap: exhausted, {} bytes requested", size);
            return Ok(0);
        };
        if new_use > self.current_alloc {
            let real_size = align(size, self.page_size);
            let top = real_size
                .and_then(|real_size| self.start_address.checked_add(self.current_use)?.checked_add(real_size));
            let real_size = match (real_size, top) {
                (Some(real_size), Some(top)) if top <= self.end_address => real_size,
                _ => {
                    debug!("heap: exhausted, {} bytes requested", size);
                    return Ok(0);
                }
            };
            engine.mem_map(self.start_address + self.current_alloc, real_size, Perms::rwx())?;
            self.current_alloc += real_size;
        }

        let chunk = Chunk::new(self.start_address + self.current_use, size);
        self.current_use = new_use;
        self.chunks.push(chunk);
        debug!("heap: new chunk 0x{:x} ({} bytes)", chunk.address, chunk.size);
        Ok(chunk.address)
    }

    /// Size of the in-use chunk starting at `address`, or 0.
    pub fn size(&self, address: u64) -> u64 {
        self.chunks
            .iter()
            .find(|chunk| chunk.address == address && chunk.in_use)
            .map_or(0, |chunk| chunk.size)
    }

    /// Releases the in-use chunk at `address`. Double frees and unknown
    /// addresses return `false` and change nothing.
    pub fn free(&mut self, address: u64) -> bool {
        match self
            .chunks
            .iter_mut()
            .find(|chunk| chunk.address == address && chunk.in_use)
        {
            Some(chunk) => {
                chunk.in_use = false;
                true
            }
            None => {
                warn!("heap: invalid free of 0x{:x}", address);
                false
            }
        }
    }

    pub fn start_address(&self) -> u64 {
        self.start_address
    }

    pub fn end_address(&self) -> u64 {
        self.end_address
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn current_alloc(&self) -> u64 {
        self.current_alloc
    }

    pub fn current_use(&self) -> u64 {
        self.current_use
    }

    /// Chunks in their current (size-sorted after the last allocation) order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn in_use_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|chunk| chunk.in_use)
            .map(|chunk| chunk.size)
            .sum()
    }
}
