//! macOS personality of the guest OS layer.
//!
//! This crate sits on top of an [`vm::Engine`] and provides what a kernel
//! would: the guest address-space layout, a heap inside a reserved guest
//! range, thread bring-up, and the syscall trap that hands control to a
//! [`traps::SyscallDispatcher`].
//!
//! - `heap`: chunk allocator backed by lazily mapped pages
//! - `memory`: region ledger and the address-space view
//! - `session`: per-session mutable state shared with trap hooks
//! - `macos`: the `load()` / `run()` lifecycle controller
//! - `loader`: entry point and image bounds of a Mach-O executable

pub mod config;
pub mod error;
pub mod heap;
pub mod loader;
pub mod macos;
pub mod memory;
pub mod session;
pub mod traps;

pub use config::{OutputMode, Quirks, SessionConfig};
pub use error::{Error, Result};
pub use heap::{Chunk, Heap};
pub use loader::LoaderInfo;
pub use macos::{ControllerState, MacOs};
pub use memory::{AddressSpaceView, MapInfo, RegionLedger};
pub use session::{SessionContext, SessionRef};
