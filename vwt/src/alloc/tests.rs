use super::*;

fn layout(size: usize, align: usize) -> Layout {
    Layout::from_size_align(size, align).unwrap()
}

#[test]
fn live_alloc_dealloc_roundtrip() {
    let layout = layout(24, 8);
    let ptr = LAlloc::alloc(layout).unwrap();
    assert_eq!(ptr.as_ptr() as usize % 8, 0);
    unsafe {
        ptr.as_ptr().write_bytes(0x5A, 24);
        LAlloc::dealloc(ptr, layout);
    }
}

#[test]
fn zero_size_storage_skips_the_allocator() {
    VAlloc::reset();
    let layout = layout(0, 16);
    let ptr = alloc_storage::<VAlloc>(layout).unwrap();
    assert_eq!(ptr.as_ptr() as usize, 16);
    unsafe { dealloc_storage::<VAlloc>(ptr, layout) };
    assert_eq!(VAlloc::stats(), VAllocStats::default());
}

#[test]
fn verified_records_and_releases() {
    VAlloc::reset();
    let layout = layout(8, 8);
    let a = VAlloc::alloc(layout).unwrap();
    let b = VAlloc::alloc(layout).unwrap();
    assert!(VAlloc::is_live(a.as_ptr()));
    assert_eq!(VAlloc::stats().live, 2);

    unsafe {
        VAlloc::dealloc(a, layout);
        VAlloc::dealloc(b, layout);
    }
    assert!(!VAlloc::is_live(a.as_ptr()));
    assert_eq!(
        VAlloc::stats(),
        VAllocStats {
            allocs: 2,
            deallocs: 2,
            refused: 0,
            live: 0
        }
    );
    VAlloc::assert_no_leaks();
}

#[test]
#[should_panic(expected = "double free")]
fn verified_double_free_panics() {
    VAlloc::reset();
    let layout = layout(4, 4);
    let ptr = VAlloc::alloc(layout).unwrap();
    unsafe {
        VAlloc::dealloc(ptr, layout);
        VAlloc::dealloc(ptr, layout);
    }
}

#[test]
#[should_panic(expected = "layout mismatch")]
fn verified_layout_mismatch_panics() {
    VAlloc::reset();
    let ptr = VAlloc::alloc(layout(16, 8)).unwrap();
    unsafe { VAlloc::dealloc(ptr, layout(8, 8)) };
}

#[test]
#[should_panic(expected = "leaked 1 block")]
fn verified_reports_leaks() {
    VAlloc::reset();
    let _ptr = VAlloc::alloc(layout(4, 4)).unwrap();
    VAlloc::assert_no_leaks();
}

#[test]
fn fault_injection_refuses_then_recovers() {
    VAlloc::reset();
    VAlloc::fail_next_allocs(1);
    let layout = layout(32, 8);

    let err = VAlloc::alloc(layout).unwrap_err();
    assert_eq!(err, AllocError::Exhausted { size: 32, align: 8 });
    assert_eq!(err.layout(), Some(layout));

    let ptr = VAlloc::alloc(layout).unwrap();
    unsafe { VAlloc::dealloc(ptr, layout) };
    assert_eq!(VAlloc::stats().refused, 1);
    VAlloc::assert_no_leaks();
}
