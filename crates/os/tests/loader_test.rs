use os::{Error, LoaderInfo};

const MH_MAGIC_64: u32 = 0xfeed_facf;
const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const MH_EXECUTE: u32 = 2;
const LC_SEGMENT_64: u32 = 0x19;
const LC_MAIN: u32 = 0x8000_0028;

fn segment(name: &str, vmaddr: u64, vmsize: u64) -> Vec<u8> {
    let mut cmd = Vec::new();
    cmd.extend_from_slice(&LC_SEGMENT_64.to_le_bytes());
    cmd.extend_from_slice(&72u32.to_le_bytes());
    let mut segname = [0u8; 16];
    segname[..name.len()].copy_from_slice(name.as_bytes());
    cmd.extend_from_slice(&segname);
    cmd.extend_from_slice(&vmaddr.to_le_bytes());
    cmd.extend_from_slice(&vmsize.to_le_bytes());
    cmd.extend_from_slice(&0u64.to_le_bytes()); // fileoff
    cmd.extend_from_slice(&0u64.to_le_bytes()); // filesize
    cmd.extend_from_slice(&7u32.to_le_bytes()); // maxprot
    cmd.extend_from_slice(&5u32.to_le_bytes()); // initprot
    cmd.extend_from_slice(&0u32.to_le_bytes()); // nsects
    cmd.extend_from_slice(&0u32.to_le_bytes()); // flags
    cmd
}

fn entry_point_command(entryoff: u64) -> Vec<u8> {
    let mut cmd = Vec::new();
    cmd.extend_from_slice(&LC_MAIN.to_le_bytes());
    cmd.extend_from_slice(&24u32.to_le_bytes());
    cmd.extend_from_slice(&entryoff.to_le_bytes());
    cmd.extend_from_slice(&0u64.to_le_bytes()); // stacksize
    cmd
}

fn macho(commands: &[Vec<u8>]) -> Vec<u8> {
    let sizeofcmds: usize = commands.iter().map(Vec::len).sum();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
    bytes.extend_from_slice(&CPU_TYPE_X86_64.to_le_bytes());
    bytes.extend_from_slice(&3u32.to_le_bytes()); // cpusubtype
    bytes.extend_from_slice(&MH_EXECUTE.to_le_bytes());
    bytes.extend_from_slice(&(commands.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(sizeofcmds as u32).to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
    bytes.extend_from_slice(&0u32.to_le_bytes()); // reserved
    for cmd in commands {
        bytes.extend_from_slice(cmd);
    }
    bytes
}

#[test]
fn test_entry_point_and_image_end() {
    let bytes = macho(&[
        segment("__PAGEZERO", 0, 0x1_0000_0000),
        segment("__TEXT", 0x1_0000_0000, 0x4000),
        segment("__DATA", 0x1_0000_4000, 0x1000),
        entry_point_command(0x3f50),
    ]);

    let info = LoaderInfo::from_macho(&bytes).unwrap();
    assert_eq!(info.entry_point, 0x1_0000_3f50);
    assert_eq!(info.vm_end_addr, 0x1_0000_5000);
    assert_eq!(info.stack_address, None);
}

#[test]
fn test_main_without_text_segment_is_rejected() {
    let bytes = macho(&[segment("__DATA", 0x1_0000_4000, 0x1000), entry_point_command(0x10)]);
    assert!(matches!(LoaderInfo::from_macho(&bytes), Err(Error::Loader(_))));
}

#[test]
fn test_garbage_is_rejected() {
    assert!(LoaderInfo::from_macho(b"not a mach-o file at all").is_err());
}
