//! Witnesses as a trait.
//!
//! A [`ValueWitness`] implementation is the Rust-side form of a witness
//! table: three operations over typed addresses. [`witness_table`] turns any
//! implementation into the `#[repr(C)]` table consumers dispatch through.

use core::alloc::Layout;
use core::marker::PhantomData;

use crate::metadata::{Type, ValueWitnessTable};
use crate::ptr::{Opaque, OpaquePtr, PtrConst, PtrMut, PtrUninit, PtrUninitExt};
use crate::trivial::TrivialClass;

/// The three lifecycle operations of one representation.
///
/// Operations are total: they have no error channel. An implementation that
/// cannot complete (allocation failure) terminates the process.
pub trait ValueWitness {
    /// Layout of one value of this representation.
    const LAYOUT: Layout;

    /// Initialize `dst` as an independent duplicate of `src`.
    ///
    /// # Safety
    /// `src` holds a live value described by `t`; `dst` is uninitialized,
    /// sized and aligned for `t`, and does not overlap `src`.
    unsafe fn copy(dst: PtrUninit, src: PtrConst, t: &Type);

    /// Initialize `dst` from `src`, ending `src`'s lifecycle.
    ///
    /// # Safety
    /// Same as [`ValueWitness::copy`]. The caller never reads or drops `src`
    /// afterwards.
    unsafe fn move_to(dst: PtrUninit, src: PtrMut, t: &Type);

    /// Release everything `val` owns.
    ///
    /// # Safety
    /// `val` holds a live value described by `t`.
    unsafe fn drop(val: PtrMut, t: &Type);
}

unsafe extern "C-unwind" fn copy_thunk<W: ValueWitness>(
    dst: *mut Opaque,
    src: *mut Opaque,
    t: *const Type,
) {
    unsafe { W::copy(PtrUninit::from_opaque(dst), PtrConst::from_opaque(src), &*t) }
}

unsafe extern "C-unwind" fn move_thunk<W: ValueWitness>(
    dst: *mut Opaque,
    src: *mut Opaque,
    t: *const Type,
) {
    unsafe { W::move_to(PtrUninit::from_opaque(dst), PtrMut::from_opaque(src), &*t) }
}

unsafe extern "C-unwind" fn drop_thunk<W: ValueWitness>(val: *mut Opaque, t: *const Type) {
    unsafe { W::drop(PtrMut::from_opaque(val), &*t) }
}

/// Build the witness table for `W`.
pub const fn witness_table<W: ValueWitness>() -> ValueWitnessTable {
    ValueWitnessTable::new(
        W::LAYOUT,
        copy_thunk::<W>,
        move_thunk::<W>,
        drop_thunk::<W>,
    )
}

/// Witness derived from a Rust type: copy is `Clone`, move is a bitwise
/// relocation, drop is `drop_in_place`.
///
/// Use [`native_type!`](crate::native_type) to declare the descriptor.
pub struct Native<T>(PhantomData<fn() -> T>);

impl<T: Clone> ValueWitness for Native<T> {
    const LAYOUT: Layout = Layout::new::<T>();

    unsafe fn copy(dst: PtrUninit, src: PtrConst, _t: &Type) {
        unsafe {
            let value = src.get::<T>().clone();
            dst.write_value(value);
        }
    }

    unsafe fn move_to(dst: PtrUninit, src: PtrMut, _t: &Type) {
        unsafe {
            core::ptr::copy_nonoverlapping(
                src.as_mut_byte_ptr(),
                dst.as_mut_byte_ptr(),
                size_of::<T>(),
            );
        }
    }

    unsafe fn drop(val: PtrMut, _t: &Type) {
        unsafe { core::ptr::drop_in_place(val.as_mut_byte_ptr().cast::<T>()) }
    }
}

/// Declare a `static` [`Type`] whose witnesses come from a Rust type.
///
/// ```
/// vwt::native_type!(pub static STRING_TYPE: String);
/// assert_eq!(STRING_TYPE.size(), size_of::<String>());
/// ```
#[macro_export]
macro_rules! native_type {
    ($(#[$meta:meta])* $vis:vis static $name:ident: $ty:ty) => {
        $(#[$meta])*
        $vis static $name: $crate::Type = {
            static VWT: $crate::ValueWitnessTable =
                $crate::witness_table::<$crate::Native<$ty>>();
            $crate::Type::new(&VWT, $crate::TypeFlags::empty())
        };
    };
}

/// The trivial descriptor for `T`, if one of the trivial classes matches it.
///
/// `T`'s size and alignment must both equal the class's, so that storage
/// laid out for `T` meets the alignment the class table declares.
pub fn trivial_type_of<T: Copy>() -> Option<&'static Type> {
    let class = TrivialClass::from_size(size_of::<T>())?;
    (align_of::<T>() == class.align()).then(|| class.ty())
}
