use os::{Error, Heap};
use types::{ArchFamily, PAGE_SIZE};
use vm::{Engine, SimEngine};

const HEAP_START: u64 = 0x1000;
const HEAP_END: u64 = 0x5000;

fn heap(arch: ArchFamily) -> (SimEngine, Heap) {
    (SimEngine::new(arch), Heap::new(arch, HEAP_START, HEAP_END, PAGE_SIZE))
}

#[test]
fn test_allocation_rounds_to_word_alignment() {
    for (arch, unit) in [(ArchFamily::X86, 4u64), (ArchFamily::X8664, 8u64)] {
        let (mut engine, mut heap) = heap(arch);
        for request in [1u64, 3, 4, 5, 8, 9, 15, 17] {
            let address = heap.allocate(&mut engine, request).unwrap();
            let expected = request.div_ceil(unit) * unit;
            assert_eq!(heap.size(address), expected, "{} bytes on {}", request, arch);
        }
    }
}

#[test]
fn test_arm64_allocation_is_an_architecture_error() {
    let (mut engine, mut heap) = heap(ArchFamily::Arm64);
    assert!(matches!(
        heap.allocate(&mut engine, 8),
        Err(Error::Architecture(ArchFamily::Arm64, _))
    ));
    assert!(heap.chunks().is_empty());
    assert!(engine.mem_regions().is_empty());
}

#[test]
fn test_freed_chunk_reused_only_for_smaller_requests() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);
    let first = heap.allocate(&mut engine, 32).unwrap();
    assert!(heap.free(first));

    // Equal size is not a fit.
    let second = heap.allocate(&mut engine, 32).unwrap();
    assert_ne!(second, first);
    assert_eq!(second, HEAP_START + 32);

    // Strictly smaller reuses the free chunk, which keeps its original size.
    let third = heap.allocate(&mut engine, 24).unwrap();
    assert_eq!(third, first);
    assert_eq!(heap.size(third), 32);
}

#[test]
fn test_exact_fit_reuse_when_enabled() {
    let mut engine = SimEngine::new(ArchFamily::X8664);
    let mut heap = Heap::new(ArchFamily::X8664, HEAP_START, HEAP_END, PAGE_SIZE).with_exact_fit_reuse(true);
    let first = heap.allocate(&mut engine, 16).unwrap();
    assert!(heap.free(first));
    assert_eq!(heap.allocate(&mut engine, 16).unwrap(), first);
    assert_eq!(heap.current_use(), 16);
}

#[test]
fn test_smallest_free_chunk_wins() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);
    let big = heap.allocate(&mut engine, 128).unwrap();
    let small = heap.allocate(&mut engine, 48).unwrap();
    assert!(heap.free(big));
    assert!(heap.free(small));

    assert_eq!(heap.allocate(&mut engine, 40).unwrap(), small);
    assert_eq!(heap.allocate(&mut engine, 40).unwrap(), big);
}

#[test]
fn test_growth_is_monotonic_and_page_rounded() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);
    let mut last_alloc = heap.current_alloc();

    for request in [8u64, 0x800, 0x7f0, 0x10, 0x1800] {
        let before_use = heap.current_use();
        let before_alloc = heap.current_alloc();
        heap.allocate(&mut engine, request).unwrap();

        let size = request.div_ceil(8) * 8;
        if before_use + size > before_alloc {
            assert_eq!(heap.current_alloc(), before_alloc + size.div_ceil(PAGE_SIZE) * PAGE_SIZE);
        } else {
            assert_eq!(heap.current_alloc(), before_alloc);
        }
        assert!(heap.current_alloc() >= last_alloc);
        assert!(heap.in_use_bytes() <= heap.current_use());
        assert!(heap.current_use() <= heap.current_alloc());
        last_alloc = heap.current_alloc();
    }
}

#[test]
fn test_exhaustion_returns_zero_and_changes_nothing() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);
    heap.allocate(&mut engine, 0x2000).unwrap();
    let (alloc, used, chunks) = (heap.current_alloc(), heap.current_use(), heap.chunks().len());

    assert_eq!(heap.allocate(&mut engine, 0x3000).unwrap(), 0);
    assert_eq!(heap.current_alloc(), alloc);
    assert_eq!(heap.current_use(), used);
    assert_eq!(heap.chunks().len(), chunks);
    assert_eq!(engine.mem_regions().len(), 1);

    // What is left still fits.
    assert_ne!(heap.allocate(&mut engine, 0x2000).unwrap(), 0);
}

#[test]
fn test_double_free_and_unknown_address() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);
    let address = heap.allocate(&mut engine, 64).unwrap();
    assert!(heap.free(address));

    let snapshot = heap.chunks().to_vec();
    assert!(!heap.free(address));
    assert!(!heap.free(0xdead_0000));
    assert_eq!(heap.chunks(), snapshot.as_slice());
    assert_eq!(heap.size(address), 0);
}

#[test]
fn test_small_heap_walkthrough() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);

    let first = heap.allocate(&mut engine, 10).unwrap();
    assert_eq!(first, HEAP_START);
    assert_eq!(heap.size(first), 16);
    assert_eq!(heap.current_alloc(), 0x1000);
    assert_eq!(heap.current_use(), 16);
    assert_eq!(engine.mem_regions()[0].begin, HEAP_START);

    assert!(heap.free(first));
    let second = heap.allocate(&mut engine, 16).unwrap();
    assert_eq!(second, HEAP_START + 16);
    assert_eq!(heap.chunks().len(), 2);
    assert_eq!(heap.current_use(), 32);
    assert_eq!(heap.current_alloc(), 0x1000);
}

#[test]
fn test_heap_pages_are_guest_memory() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);
    let address = heap.allocate(&mut engine, 24).unwrap();
    engine.mem_write(address, b"guest heap").unwrap();
    assert_eq!(engine.mem_read(address, 10).unwrap(), b"guest heap");
}

#[test]
fn test_oversized_requests_are_exhaustion() {
    let (mut engine, mut heap) = heap(ArchFamily::X8664);
    assert_eq!(heap.allocate(&mut engine, u64::MAX - 3).unwrap(), 0);
    assert!(heap.chunks().is_empty());
    assert_eq!(heap.current_alloc(), 0);

    heap.allocate(&mut engine, 8).unwrap();
    let (alloc, used) = (heap.current_alloc(), heap.current_use());
    assert_eq!(heap.allocate(&mut engine, 0xffff_ffff_ffff_f000).unwrap(), 0);
    assert_eq!(heap.allocate(&mut engine, u64::MAX - 7).unwrap(), 0);
    assert_eq!(heap.current_alloc(), alloc);
    assert_eq!(heap.current_use(), used);
    assert_eq!(heap.chunks().len(), 1);
    assert_eq!(engine.mem_regions().len(), 1);
}
