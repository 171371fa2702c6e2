use core::fmt;

/// Permission bits for a mapped region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Perms {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl Perms {
    pub const fn new(read: bool, write: bool, exec: bool) -> Self {
        Self { read, write, exec }
    }

    pub const fn rwx() -> Self {
        Self::new(true, true, true)
    }

    pub const fn rw() -> Self {
        Self::new(true, true, false)
    }

    pub const fn rx() -> Self {
        Self::new(true, false, true)
    }

    pub const fn r() -> Self {
        Self::new(true, false, false)
    }
}

impl Default for Perms {
    fn default() -> Self {
        Self::rwx()
    }
}

impl fmt::Display for Perms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.exec { 'x' } else { '-' },
        )
    }
}

/// One entry of an engine's live region table. `end` is exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemRegion {
    pub begin: u64,
    pub end: u64,
    pub perms: Perms,
}

impl MemRegion {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.begin && address < self.end
    }

    pub fn size(&self) -> u64 {
        self.end - self.begin
    }
}
