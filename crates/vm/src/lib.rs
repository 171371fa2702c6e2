//! Engine seam for the guest OS layer.
//!
//! The OS layer never executes guest instructions itself. Everything it needs
//! from a CPU emulator is expressed by the [`Engine`] trait: page mapping, raw
//! memory and register access, trap hooks and the fetch-execute loop.
//! [`sim::SimEngine`] is a small deterministic implementation used by the test
//! suites and the runner binary.

pub mod decoder;
pub mod engine;
pub mod error;
pub mod memory;
pub mod registers;
pub mod sim;

pub use engine::{Engine, EngineRef, HookFn, HookId, InsnKind, Trap};
pub use error::EngineError;
pub use memory::{MemRegion, Perms};
pub use registers::Register;
pub use sim::SimEngine;
