//! Decoder for the handful of instructions [`crate::SimEngine`] understands.
//!
//! The reference engine is not a CPU model. It recognises just enough of each
//! instruction set to drive the OS layer: no-ops, the syscall gateways and a
//! halt.

use types::ArchFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    /// x86_64 `syscall`.
    Syscall,
    /// x86 `int imm8`.
    Int(u8),
    /// arm64 `svc #imm16`.
    Svc(u16),
    Hlt,
}

/// Number of bytes to fetch before [`decode`] can decide.
pub fn fetch_len(arch: ArchFamily, first: u8) -> usize {
    match arch {
        ArchFamily::Arm64 => 4,
        ArchFamily::X86 | ArchFamily::X8664 => match first {
            0x0f | 0xcd => 2,
            _ => 1,
        },
    }
}

/// Decodes `bytes` into an instruction and its length.
pub fn decode(arch: ArchFamily, bytes: &[u8]) -> Option<(Instruction, u8)> {
    match arch {
        ArchFamily::X86 | ArchFamily::X8664 => decode_x86(arch, bytes),
        ArchFamily::Arm64 => decode_arm64(bytes),
    }
}

fn decode_x86(arch: ArchFamily, bytes: &[u8]) -> Option<(Instruction, u8)> {
    match *bytes {
        [0x90, ..] => Some((Instruction::Nop, 1)),
        [0xf4, ..] => Some((Instruction::Hlt, 1)),
        [0x0f, 0x05, ..] if arch == ArchFamily::X8664 => Some((Instruction::Syscall, 2)),
        [0xcd, imm, ..] => Some((Instruction::Int(imm), 2)),
        _ => None,
    }
}

fn decode_arm64(bytes: &[u8]) -> Option<(Instruction, u8)> {
    let word = u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?);
    match word {
        0xd503_201f => Some((Instruction::Nop, 4)),
        w if w & 0xffe0_001f == 0xd400_0001 => Some((Instruction::Svc(((w >> 5) & 0xffff) as u16), 4)),
        w if w & 0xffe0_001f == 0xd440_0000 => Some((Instruction::Hlt, 4)),
        _ => None,
    }
}

impl Instruction {
    pub fn pretty_print(&self) -> String {
        match self {
            Instruction::Nop => "nop".to_string(),
            Instruction::Syscall => "syscall".to_string(),
            Instruction::Int(n) => format!("int 0x{:x}", n),
            Instruction::Svc(n) => format!("svc #0x{:x}", n),
            Instruction::Hlt => "hlt".to_string(),
        }
    }
}
