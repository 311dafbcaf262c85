//! Kani proofs for the witness families.

use core::ptr;

use crate::alloc::LAlloc;
use crate::boxes::{OWNED_BOX_TYPE, OwnedBox, UNOWNED_BOX_TYPE};
use crate::metadata::Type;
use crate::ptr::{PtrConst, PtrMut, PtrUninit};
use crate::trivial::{TRIVIAL_METAS, TRIVIAL_SIZES, TrivialClass};
use crate::witness::ValueWitness;

/// Prove: copy and move of any trivial class produce identical bytes
#[kani::proof]
#[kani::unwind(17)]
fn trivial_copy_equals_move() {
    let index: usize = kani::any();
    kani::assume(index < TRIVIAL_METAS.len());
    let ty: &Type = &TRIVIAL_METAS[index];

    let src: [u8; 16] = kani::any();
    let mut by_copy = [0u8; 16];
    let mut by_move = [0u8; 16];
    let mut moved_src = src;

    unsafe {
        ty.copy(PtrUninit::new(by_copy.as_mut_ptr()), PtrConst::new(src.as_ptr()));
        ty.move_value(
            PtrUninit::new(by_move.as_mut_ptr()),
            PtrMut::new(moved_src.as_mut_ptr()),
        );
    }

    kani::assert(by_copy == by_move, "copy and move must agree");
    let size = ty.size();
    kani::assert(by_copy[..size] == src[..size], "copy must reproduce the source");
    kani::assert(
        by_copy[size..].iter().all(|&b| b == 0),
        "bytes past the class size are untouched",
    );
}

/// Prove: class lookup by exact size only answers for listed sizes
#[kani::proof]
#[kani::unwind(8)]
fn from_size_is_exact() {
    let size: usize = kani::any();
    kani::assume(size <= 32);
    match TrivialClass::from_size(size) {
        Some(class) => kani::assert(class.size() == size, "class size must match"),
        None => kani::assert(!TRIVIAL_SIZES.contains(&size), "listed size must resolve"),
    }
}

/// Prove: moving an owned box leaves the null sentinel, and dropping it is a no-op
#[kani::proof]
fn owned_move_leaves_sentinel() {
    let addr: usize = kani::any();
    kani::assume(addr != 0);
    let mut src = ptr::without_provenance_mut::<u8>(addr);
    let mut dst = ptr::null_mut::<u8>();

    unsafe {
        <OwnedBox<LAlloc> as ValueWitness>::move_to(
            PtrUninit::new((&raw mut dst).cast::<u8>()),
            PtrMut::new((&raw mut src).cast::<u8>()),
            &OWNED_BOX_TYPE,
        );
    }
    kani::assert(dst as usize == addr, "destination takes the block");
    kani::assert(src.is_null(), "source becomes the sentinel");

    unsafe {
        <OwnedBox<LAlloc> as ValueWitness>::drop(PtrMut::new((&raw mut src).cast::<u8>()), &OWNED_BOX_TYPE);
    }
}

/// Prove: unowned box copy and move are the identity on the address
#[kani::proof]
fn unowned_copy_is_identity() {
    let addr: usize = kani::any();
    let src = ptr::without_provenance::<u8>(addr);
    let mut dst = ptr::null::<u8>();
    unsafe {
        UNOWNED_BOX_TYPE.copy(
            PtrUninit::new((&raw mut dst).cast::<u8>()),
            PtrConst::new((&raw const src).cast::<u8>()),
        );
    }
    kani::assert(dst as usize == addr, "copy keeps the referent");
}
