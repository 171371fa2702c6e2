use os::{AddressSpaceView, Error, RegionLedger};
use types::ArchFamily;
use vm::{Engine, EngineError, Perms, SimEngine};

#[test]
fn test_is_mapped_means_free_in_both_views() {
    let mut engine = SimEngine::new(ArchFamily::X8664);
    let mut ledger = RegionLedger::default();

    // Known to the engine only.
    engine.mem_map(0x10000, 0x1000, Perms::rw()).unwrap();
    // Known to the ledger only.
    ledger.add(0x20000, 0x21000, Perms::rw(), "[recorded]");

    let view = AddressSpaceView::new(&mut ledger, &mut engine);
    assert!(!view.is_mapped(0x10000));
    assert!(!view.is_mapped(0x10fff));
    assert!(!view.is_mapped(0x20800));
    assert!(view.is_mapped(0x11000));
    assert!(view.is_mapped(0x30000));
}

#[test]
fn test_map_records_label_and_backs_memory() {
    let mut engine = SimEngine::new(ArchFamily::Arm64);
    let mut ledger = RegionLedger::default();

    {
        let mut view = AddressSpaceView::new(&mut ledger, &mut engine);
        view.map(0x40000, 0x2000, Perms::rwx(), "[stack]").unwrap();
        view.write(0x41ff0, &[0xaa; 16]).unwrap();
        assert_eq!(view.read(0x41ff0, 16).unwrap(), vec![0xaa; 16]);
    }

    let info = ledger.find("[stack]").unwrap();
    assert_eq!((info.start, info.end), (0x40000, 0x42000));
    assert_eq!(engine.mem_regions().len(), 1);
}

#[test]
fn test_engine_errors_pass_through() {
    let mut engine = SimEngine::new(ArchFamily::X8664);
    let mut ledger = RegionLedger::default();
    let mut view = AddressSpaceView::new(&mut ledger, &mut engine);

    assert!(matches!(
        view.read(0x5000, 4),
        Err(Error::Engine(EngineError::ReadUnmapped(0x5000)))
    ));
    assert!(matches!(
        view.write(0x5000, &[1]),
        Err(Error::Engine(EngineError::WriteUnmapped(0x5000)))
    ));

    view.map(0x5000, 0x1000, Perms::rw(), "[a]").unwrap();
    assert!(matches!(
        view.map(0x5000, 0x1000, Perms::rw(), "[b]"),
        Err(Error::Engine(EngineError::MapOverlap { .. }))
    ));
}

#[test]
fn test_show_mapinfo_is_sorted_and_lists_unrecorded_regions() {
    let mut engine = SimEngine::new(ArchFamily::X8664);
    let mut ledger = RegionLedger::default();
    engine.mem_map(0x90000, 0x1000, Perms::rw()).unwrap();

    let mut view = AddressSpaceView::new(&mut ledger, &mut engine);
    view.map(0x80000, 0x1000, Perms::r(), "[high]").unwrap();
    view.map(0x3000, 0x1000, Perms::rw(), "[low]").unwrap();

    let lines = view.show_mapinfo();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("[low]"));
    assert!(lines[1].ends_with("[high]"));
    assert!(lines[2].ends_with("[unrecorded]"));
    assert!(lines[1].contains("r--"));
}
