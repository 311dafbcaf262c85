//! Type descriptors and the value witness tables they point at.

use core::alloc::Layout;

use bitflags::bitflags;

use crate::ptr::{Opaque, OpaquePtr, PtrConst, PtrMut, PtrMutExt, PtrUninit};

/// Initialize `dst` as an independent duplicate of `src`.
pub type CopyFn = unsafe extern "C-unwind" fn(dst: *mut Opaque, src: *mut Opaque, t: *const Type);

/// Initialize `dst` from `src`; `src`'s lifecycle ends.
pub type MoveFn = unsafe extern "C-unwind" fn(dst: *mut Opaque, src: *mut Opaque, t: *const Type);

/// Release whatever `val` owns.
pub type DropFn = unsafe extern "C-unwind" fn(val: *mut Opaque, t: *const Type);

bitflags! {
    /// Special-cased behavior of a representation.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeFlags: usize {
        /// Copy and move are a raw byte copy, drop has no effect.
        const TRIVIAL = 1 << 0;
    }
}

/// Layout facts and lifecycle operations for one representation.
///
/// Field order is part of the binary contract: `size`, `align`, `stride`,
/// `copy`, `move`, `drop`, one machine word each.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ValueWitnessTable {
    size: usize,
    align: usize,
    stride: usize,
    copy: CopyFn,
    r#move: MoveFn,
    drop: DropFn,
}

impl ValueWitnessTable {
    /// Build a table for values with the given layout.
    ///
    /// The stride is the size rounded up to the alignment, so a zero-size
    /// representation has stride 0.
    pub const fn new(layout: Layout, copy: CopyFn, r#move: MoveFn, drop: DropFn) -> Self {
        let size = layout.size();
        let align = layout.align();
        Self {
            size,
            align,
            stride: (size + align - 1) & !(align - 1),
            copy,
            r#move,
            drop,
        }
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub const fn align(&self) -> usize {
        self.align
    }

    /// Distance in bytes between consecutive elements of an array.
    #[inline]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub const fn layout(&self) -> Layout {
        // SAFETY: tables are only built from a `Layout`, whose size and align
        // already satisfy `from_size_align`.
        unsafe { Layout::from_size_align_unchecked(self.size, self.align) }
    }

    #[inline]
    pub const fn copy_fn(&self) -> CopyFn {
        self.copy
    }

    #[inline]
    pub const fn move_fn(&self) -> MoveFn {
        self.r#move
    }

    #[inline]
    pub const fn drop_fn(&self) -> DropFn {
        self.drop
    }
}

/// A type descriptor: a witness table plus flags.
///
/// Descriptors are compared by address; two descriptors describe the same
/// type only if they are the same descriptor.
#[repr(C)]
#[derive(Debug)]
pub struct Type {
    vwt: &'static ValueWitnessTable,
    flags: TypeFlags,
}

impl Type {
    pub const fn new(vwt: &'static ValueWitnessTable, flags: TypeFlags) -> Self {
        Self { vwt, flags }
    }

    #[inline]
    pub const fn vwt(&self) -> &'static ValueWitnessTable {
        self.vwt
    }

    #[inline]
    pub const fn flags(&self) -> TypeFlags {
        self.flags
    }

    #[inline]
    pub const fn is_trivial(&self) -> bool {
        self.flags.contains(TypeFlags::TRIVIAL)
    }

    #[inline]
    pub const fn size(&self) -> usize {
        self.vwt.size()
    }

    #[inline]
    pub const fn align(&self) -> usize {
        self.vwt.align()
    }

    #[inline]
    pub const fn stride(&self) -> usize {
        self.vwt.stride()
    }

    #[inline]
    pub const fn layout(&self) -> Layout {
        self.vwt.layout()
    }

    /// Whether `self` and `other` are the same descriptor.
    #[inline]
    pub fn same(&self, other: &Type) -> bool {
        core::ptr::eq(self, other)
    }

    /// Duplicate the value at `src` into `dst` through the copy witness.
    ///
    /// # Safety
    /// `src` must hold a live value of this type, `dst` must be uninitialized
    /// storage of at least `size()` bytes aligned to `align()`, and the two
    /// must not overlap.
    #[inline]
    pub unsafe fn copy(&self, dst: PtrUninit, src: PtrConst) -> PtrMut {
        unsafe {
            (self.vwt.copy)(dst.to_opaque(), src.to_opaque(), self);
            dst.assume_init()
        }
    }

    /// Relocate the value at `src` into `dst` through the move witness.
    ///
    /// # Safety
    /// Same as [`Type::copy`]. Afterwards `src` must never be read or
    /// dropped again.
    #[inline]
    pub unsafe fn move_value(&self, dst: PtrUninit, src: PtrMut) -> PtrMut {
        unsafe {
            (self.vwt.r#move)(dst.to_opaque(), src.to_opaque(), self);
            dst.assume_init()
        }
    }

    /// Release the value at `val` through the drop witness.
    ///
    /// # Safety
    /// `val` must hold a live value of this type that is not the source of
    /// an earlier move.
    #[inline]
    pub unsafe fn drop_value(&self, val: PtrMut) -> PtrUninit {
        unsafe { (self.vwt.drop)(val.to_opaque(), self) };
        val.into_uninit()
    }
}
