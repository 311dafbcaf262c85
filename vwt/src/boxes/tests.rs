use super::*;
use crate::alloc::{V_OWNED_BOX_TYPE, V_RC_BOX_TYPE, VAlloc, VAllocStats};
use crate::ptr::{PtrConst, PtrMut, PtrMutExt, PtrUninit};
use crate::trivial::TrivialClass;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::cell::Cell;

thread_local! {
    static LIVE: Cell<isize> = const { Cell::new(0) };
    static CLONES: Cell<usize> = const { Cell::new(0) };
    static DROPS: Cell<usize> = const { Cell::new(0) };
}

/// Payload that counts its clones and drops on the current thread.
#[derive(Debug)]
struct Tracked(u64);

impl Tracked {
    fn new(value: u64) -> Self {
        LIVE.set(LIVE.get() + 1);
        Tracked(value)
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        CLONES.set(CLONES.get() + 1);
        Tracked::new(self.0)
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        LIVE.set(LIVE.get() - 1);
        DROPS.set(DROPS.get() + 1);
    }
}

crate::native_type!(static TRACKED: Tracked);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn fresh() {
    init_tracing();
    VAlloc::reset();
    LIVE.set(0);
    CLONES.set(0);
    DROPS.set(0);
}

fn uninit(handle: &mut *mut u8) -> PtrUninit {
    PtrUninit::new((handle as *mut *mut u8).cast::<u8>())
}

fn live(handle: &mut *mut u8) -> PtrMut {
    PtrMut::new((handle as *mut *mut u8).cast::<u8>())
}

fn konst(handle: &*mut u8) -> PtrConst {
    PtrConst::new((handle as *const *mut u8).cast::<u8>())
}

fn owned_tracked(value: u64) -> *mut u8 {
    let mut payload = MaybeUninit::new(Tracked::new(value));
    let mut handle = ptr::null_mut();
    unsafe {
        OwnedBox::<VAlloc>::new_in(
            uninit(&mut handle),
            &TRACKED,
            PtrMut::new(payload.as_mut_ptr().cast::<u8>()),
        );
    }
    handle
}

fn rc_tracked(value: u64) -> *mut u8 {
    let mut payload = MaybeUninit::new(Tracked::new(value));
    let mut handle = ptr::null_mut();
    unsafe {
        RcBox::<VAlloc>::new_in(
            uninit(&mut handle),
            &TRACKED,
            PtrMut::new(payload.as_mut_ptr().cast::<u8>()),
        );
    }
    handle
}

fn owned_u32(value: u32) -> *mut u8 {
    let mut payload = value;
    let mut handle = ptr::null_mut();
    unsafe {
        OwnedBox::<VAlloc>::new_in(
            uninit(&mut handle),
            TrivialClass::B4.ty(),
            PtrMut::new((&raw mut payload).cast::<u8>()),
        );
    }
    handle
}

// ==================================================================
// Owned
// ==================================================================

#[test]
fn owned_copy_then_drop_both_releases_twice() {
    fresh();
    let ty = &V_OWNED_BOX_TYPE;
    let mut src = owned_tracked(5);
    let mut dst = ptr::null_mut();

    unsafe { ty.copy(uninit(&mut dst), konst(&src)) };
    assert_ne!(src, dst);
    assert_eq!(CLONES.get(), 1);
    assert_eq!(VAlloc::stats().live, 2);

    let copied = unsafe { OwnedBox::<VAlloc>::payload_ptr(konst(&dst)).unwrap().as_const().get::<Tracked>() };
    assert_eq!(copied.0, 5);

    unsafe {
        ty.drop_value(live(&mut dst));
        ty.drop_value(live(&mut src));
    }
    assert_eq!(DROPS.get(), 2);
    assert_eq!(LIVE.get(), 0);
    assert_eq!(VAlloc::stats().deallocs, 2);
    VAlloc::assert_no_leaks();
}

#[test]
fn owned_move_then_drop_destination_only() {
    fresh();
    let ty = &V_OWNED_BOX_TYPE;
    let mut src = owned_tracked(9);
    let block = src;
    let mut dst = ptr::null_mut();

    unsafe { ty.move_value(uninit(&mut dst), live(&mut src)) };
    assert_eq!(dst, block);
    assert!(unsafe { OwnedBox::<VAlloc>::is_moved_from(konst(&src)) });

    // Dropping the moved-from handle is a no-op.
    unsafe { ty.drop_value(live(&mut src)) };
    assert_eq!(DROPS.get(), 0);
    assert!(VAlloc::is_live(block));

    unsafe { ty.drop_value(live(&mut dst)) };
    assert_eq!(DROPS.get(), 1);
    assert_eq!(VAlloc::stats().deallocs, 1);
    VAlloc::assert_no_leaks();
}

#[test]
fn owned_move_round_trip_matches_direct_drop() {
    fresh();
    let ty = &V_OWNED_BOX_TYPE;
    let mut direct = owned_tracked(1);
    unsafe { ty.drop_value(live(&mut direct)) };
    let direct_stats = VAlloc::stats();
    let direct_drops = DROPS.get();

    fresh();
    let mut src = owned_tracked(1);
    let mut dst = ptr::null_mut();
    unsafe {
        ty.move_value(uninit(&mut dst), live(&mut src));
        ty.drop_value(live(&mut dst));
    }
    assert_eq!(VAlloc::stats(), direct_stats);
    assert_eq!(DROPS.get(), direct_drops);
}

#[test]
fn owned_copy_is_deep() {
    fresh();
    let ty = &V_OWNED_BOX_TYPE;
    let mut src = owned_u32(0xDEAD_BEEF);
    let mut dst = ptr::null_mut();

    unsafe {
        ty.copy(uninit(&mut dst), konst(&src));
        let copy_payload = OwnedBox::<VAlloc>::payload_ptr(konst(&dst)).unwrap();
        copy_payload.overwrite(1u32);

        let src_payload = OwnedBox::<VAlloc>::payload_ptr(konst(&src)).unwrap();
        assert_eq!(src_payload.as_const().read::<u32>(), 0xDEAD_BEEF);
        assert_eq!(copy_payload.as_const().read::<u32>(), 1);

        ty.drop_value(live(&mut src));
        ty.drop_value(live(&mut dst));
    }
    VAlloc::assert_no_leaks();
}

#[test]
fn owned_try_copy_reports_exhaustion() {
    fresh();
    let mut src = owned_tracked(3);
    let mut dst = ptr::null_mut();

    VAlloc::fail_next_allocs(1);
    let err = unsafe { OwnedBox::<VAlloc>::try_copy(uninit(&mut dst), konst(&src)) }.unwrap_err();
    assert!(matches!(err, AllocError::Exhausted { .. }));
    assert!(dst.is_null());
    assert_eq!(CLONES.get(), 0);

    unsafe { V_OWNED_BOX_TYPE.drop_value(live(&mut src)) };
    assert_eq!(LIVE.get(), 0);
    VAlloc::assert_no_leaks();
}

#[test]
fn owned_try_new_leaves_payload_with_caller_on_failure() {
    fresh();
    let mut payload = MaybeUninit::new(Tracked::new(4));
    let mut handle = ptr::null_mut();

    VAlloc::fail_next_allocs(1);
    let result = unsafe {
        OwnedBox::<VAlloc>::try_new_in(
            uninit(&mut handle),
            &TRACKED,
            PtrMut::new(payload.as_mut_ptr().cast::<u8>()),
        )
    };
    assert!(result.is_err());
    assert_eq!(LIVE.get(), 1);

    unsafe { payload.assume_init_drop() };
    assert_eq!(LIVE.get(), 0);
    VAlloc::assert_no_leaks();
}

/// Payload whose clone always panics.
struct CloneBomb(#[allow(dead_code)] u64);

impl Clone for CloneBomb {
    fn clone(&self) -> Self {
        panic!("clone refused");
    }
}

crate::native_type!(static CLONE_BOMB: CloneBomb);

#[test]
fn owned_copy_frees_its_block_when_payload_clone_panics() {
    fresh();
    let ty = &V_OWNED_BOX_TYPE;
    let mut payload = MaybeUninit::new(CloneBomb(9));
    let mut src = ptr::null_mut();
    unsafe {
        OwnedBox::<VAlloc>::new_in(
            uninit(&mut src),
            &CLONE_BOMB,
            PtrMut::new(payload.as_mut_ptr().cast::<u8>()),
        );
    }
    let live_before = VAlloc::stats().live;

    let mut dst = ptr::null_mut();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        ty.copy(uninit(&mut dst), konst(&src));
    }));
    assert!(result.is_err());
    assert!(dst.is_null());
    assert_eq!(VAlloc::stats().live, live_before);

    unsafe { ty.drop_value(live(&mut src)) };
    VAlloc::assert_no_leaks();
}

#[test]
fn owned_copy_of_moved_from_stays_moved_from() {
    fresh();
    let ty = &V_OWNED_BOX_TYPE;
    let moved_from: *mut u8 = ptr::null_mut();
    let mut dst = 0x1 as *mut u8;

    unsafe { ty.copy(uninit(&mut dst), konst(&moved_from)) };
    assert!(dst.is_null());
    assert_eq!(VAlloc::stats(), VAllocStats::default());
}

#[test]
fn owned_payload_is_aligned_for_wide_classes() {
    fresh();
    let mut payload = [0xABu8; 16];
    let mut handle = ptr::null_mut();
    unsafe {
        OwnedBox::<VAlloc>::new_in(
            uninit(&mut handle),
            TrivialClass::B16.ty(),
            PtrMut::new(payload.as_mut_ptr()),
        );
        let stored = OwnedBox::<VAlloc>::payload_ptr(konst(&handle)).unwrap();
        assert_eq!(stored.as_mut_byte_ptr() as usize % 16, 0);
        assert_eq!(stored.as_const().read::<[u8; 16]>(), [0xAB; 16]);
        assert!(
            OwnedBox::<VAlloc>::payload_type(konst(&handle))
                .unwrap()
                .same(TrivialClass::B16.ty())
        );
        V_OWNED_BOX_TYPE.drop_value(live(&mut handle));
    }
    VAlloc::assert_no_leaks();
}

// ==================================================================
// Reference-counted
// ==================================================================

#[test]
fn rc_n_copies_then_n_plus_one_drops_release_once() {
    fresh();
    const N: usize = 5;
    let ty = &V_RC_BOX_TYPE;
    let first = rc_tracked(7);
    let block = first;
    let mut handles = vec![first];

    for _ in 0..N {
        let mut copy = ptr::null_mut();
        unsafe { ty.copy(uninit(&mut copy), konst(&handles[0])) };
        assert_eq!(copy, block);
        handles.push(copy);
    }
    assert_eq!(unsafe { RcBox::<VAlloc>::strong_count(konst(&handles[0])) }, N + 1);
    assert_eq!(CLONES.get(), 0);

    while let Some(mut handle) = handles.pop() {
        let last = handles.is_empty();
        if !last {
            assert_eq!(
                unsafe { RcBox::<VAlloc>::strong_count(konst(&handle)) },
                handles.len() + 1
            );
        }
        unsafe { ty.drop_value(live(&mut handle)) };
        if last {
            assert_eq!(DROPS.get(), 1);
            assert!(!VAlloc::is_live(block));
        } else {
            assert_eq!(DROPS.get(), 0);
            assert!(VAlloc::is_live(block));
        }
    }
    assert_eq!(VAlloc::stats().deallocs, 1);
    VAlloc::assert_no_leaks();
}

#[test]
fn rc_move_leaves_count_alone() {
    fresh();
    let ty = &V_RC_BOX_TYPE;
    let mut src = rc_tracked(2);
    let mut dst = ptr::null_mut();

    unsafe {
        ty.move_value(uninit(&mut dst), live(&mut src));
        assert_eq!(RcBox::<VAlloc>::strong_count(konst(&dst)), 1);
        ty.drop_value(live(&mut dst));
    }
    assert_eq!(DROPS.get(), 1);
    VAlloc::assert_no_leaks();
}

#[test]
fn rc_try_new_leaves_payload_with_caller_on_failure() {
    fresh();
    let mut payload = MaybeUninit::new(Tracked::new(6));
    let mut handle = ptr::null_mut();

    VAlloc::fail_next_allocs(1);
    let result = unsafe {
        RcBox::<VAlloc>::try_new_in(
            uninit(&mut handle),
            &TRACKED,
            PtrMut::new(payload.as_mut_ptr().cast::<u8>()),
        )
    };
    assert!(matches!(result, Err(AllocError::Exhausted { .. })));
    assert!(handle.is_null());
    assert_eq!(LIVE.get(), 1);
    assert_eq!(VAlloc::stats().allocs, 0);

    unsafe { payload.assume_init_drop() };
    assert_eq!(LIVE.get(), 0);
    VAlloc::assert_no_leaks();
}

#[test]
fn rc_copies_share_one_payload() {
    fresh();
    let ty = &V_RC_BOX_TYPE;
    let mut a = rc_tracked(11);
    let mut b = ptr::null_mut();

    unsafe {
        ty.copy(uninit(&mut b), konst(&a));
        let pa = RcBox::<VAlloc>::payload_ptr(konst(&a));
        let pb = RcBox::<VAlloc>::payload_ptr(konst(&b));
        assert_eq!(pa.as_mut_byte_ptr(), pb.as_mut_byte_ptr());
        assert_eq!(pa.as_const().get::<Tracked>().0, 11);
        assert!(RcBox::<VAlloc>::payload_type(konst(&b)).same(&TRACKED));

        ty.drop_value(live(&mut a));
        assert_eq!(pb.as_const().get::<Tracked>().0, 11);
        ty.drop_value(live(&mut b));
    }
    assert_eq!(DROPS.get(), 1);
    VAlloc::assert_no_leaks();
}

static SHARED_DROPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone)]
struct Shared(#[allow(dead_code)] u64);

impl Drop for Shared {
    fn drop(&mut self) {
        SHARED_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

crate::native_type!(static SHARED: Shared);

#[test]
fn rc_concurrent_copies_and_drops_release_exactly_once() {
    init_tracing();
    const THREADS: usize = 8;
    const ROUNDS: usize = 1_000;

    let mut payload = MaybeUninit::new(Shared(42));
    let mut root = ptr::null_mut();
    unsafe {
        RcBox::<LAlloc>::new_in(uninit(&mut root), &SHARED, PtrMut::new(payload.as_mut_ptr().cast::<u8>()));
    }
    let root_addr = root as usize;

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(move || {
                let root = root_addr as *mut u8;
                for _ in 0..ROUNDS {
                    let mut copy = ptr::null_mut();
                    unsafe {
                        RC_BOX_TYPE.copy(uninit(&mut copy), konst(&root));
                        RC_BOX_TYPE.drop_value(live(&mut copy));
                    }
                }
            });
        }
    });

    assert_eq!(unsafe { RcBox::<LAlloc>::strong_count(konst(&root)) }, 1);
    assert_eq!(SHARED_DROPS.load(Ordering::SeqCst), 0);
    unsafe { RC_BOX_TYPE.drop_value(live(&mut root)) };
    assert_eq!(SHARED_DROPS.load(Ordering::SeqCst), 1);
}

// ==================================================================
// Unowned
// ==================================================================

#[test]
fn unowned_never_allocates_or_touches_the_referent() {
    fresh();
    let ty = &UNOWNED_BOX_TYPE;
    let referent = 0x0123_4567_89AB_CDEF_u64;
    let referent_ptr = PtrConst::new((&raw const referent).cast::<u8>());

    let mut a = ptr::null_mut();
    let mut b = ptr::null_mut();
    let mut c = ptr::null_mut();
    unsafe {
        UnownedBox::new_in(uninit(&mut a), referent_ptr);
        ty.copy(uninit(&mut b), konst(&a));
        ty.move_value(uninit(&mut c), live(&mut b));
        assert_eq!(
            UnownedBox::payload_ptr(konst(&c)).as_byte_ptr(),
            referent_ptr.as_byte_ptr()
        );

        ty.drop_value(live(&mut a));
        ty.drop_value(live(&mut c));
    }
    assert_eq!(referent, 0x0123_4567_89AB_CDEF);
    assert_eq!(VAlloc::stats(), VAllocStats::default());
}

// ==================================================================
// Tables
// ==================================================================

#[test]
fn box_tables_are_one_word() {
    for kind in [BoxKind::Owned, BoxKind::Unowned, BoxKind::Rc] {
        let vwt = kind.vwt();
        assert_eq!(vwt.size(), size_of::<usize>());
        assert_eq!(vwt.align(), align_of::<usize>());
        assert_eq!(vwt.stride(), size_of::<usize>());
        assert!(core::ptr::eq(kind.ty().vwt(), vwt));
        assert_eq!(BoxKind::of(kind.ty()), Some(kind));
    }
    assert!(UNOWNED_BOX_TYPE.is_trivial());
    assert!(!OWNED_BOX_TYPE.is_trivial());
    assert!(!RC_BOX_TYPE.is_trivial());
    assert_eq!(BoxKind::of(TrivialClass::B8.ty()), None);
}
