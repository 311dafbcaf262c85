use core::alloc::Layout;

use crate::metadata::Type;
use crate::ptr::{PtrConst, PtrMut, PtrUninit, PtrUninitExt};
use crate::witness::ValueWitness;

/// Non-owning box: a view of a referent whose lifetime is governed elsewhere.
///
/// Nothing here enforces that the referent outlives the box.
pub struct UnownedBox;

impl UnownedBox {
    /// Point a new box at `referent`.
    ///
    /// # Safety
    /// `dst` is uninitialized, pointer-sized and aligned.
    pub unsafe fn new_in(dst: PtrUninit, referent: PtrConst) -> PtrMut {
        unsafe { dst.write_value(referent.as_byte_ptr()) }
    }

    /// Address of the payload the box refers to.
    ///
    /// The box does not own it, so the address is read-only.
    ///
    /// # Safety
    /// `boxed` holds an unowned-box handle.
    pub unsafe fn payload_ptr(boxed: PtrConst) -> PtrConst {
        PtrConst::new(unsafe { boxed.read::<*const u8>() })
    }
}

impl ValueWitness for UnownedBox {
    const LAYOUT: Layout = Layout::new::<*const u8>();

    unsafe fn copy(dst: PtrUninit, src: PtrConst, _t: &Type) {
        unsafe { dst.write_value(src.read::<*const u8>()) };
    }

    unsafe fn move_to(dst: PtrUninit, src: PtrMut, _t: &Type) {
        unsafe { dst.write_value(src.as_const().read::<*const u8>()) };
    }

    unsafe fn drop(_val: PtrMut, _t: &Type) {}
}
