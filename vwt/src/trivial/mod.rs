//! The trivial witness family.
//!
//! Six precomputed tables and descriptors for small payloads whose copy and
//! move are a raw byte copy and whose drop does nothing. A consumer maps its
//! type's size to a [`TrivialClass`] instead of building a table.
//!
//! | class | size | align | stride | copy / move     |
//! |-------|------|-------|--------|-----------------|
//! | 0     | 0    | 1     | 0      | `copy_move_nop` |
//! | 1     | 1    | 1     | 1      | `copy_trivial`  |
//! | 2     | 2    | 2     | 2      | `copy_trivial`  |
//! | 3     | 4    | 4     | 4      | `copy_trivial`  |
//! | 4     | 8    | 8     | 8      | `copy_trivial`  |
//! | 5     | 16   | 16    | 16     | `copy_trivial`  |

use core::alloc::Layout;

use crate::metadata::{Type, TypeFlags, ValueWitnessTable};
use crate::ptr::Opaque;

/// Payload sizes covered by the trivial family, ascending.
pub const TRIVIAL_SIZES: [usize; 6] = [0, 1, 2, 4, 8, 16];

/// Copy exactly `t.vwt().size()` bytes from `src` to `dst`.
///
/// # Safety
/// `t` is a live descriptor; `src` and `dst` are valid for that many bytes
/// and do not overlap.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub unsafe extern "C-unwind" fn copy_trivial(dst: *mut Opaque, src: *mut Opaque, t: *const Type) {
    unsafe {
        let size = (*t).size();
        core::ptr::copy_nonoverlapping(src.cast::<u8>(), dst.cast::<u8>(), size);
    }
}

/// Identical to [`copy_trivial`]: trivial values have no distinct move.
///
/// # Safety
/// Same as [`copy_trivial`].
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub unsafe extern "C-unwind" fn move_trivial(dst: *mut Opaque, src: *mut Opaque, t: *const Type) {
    unsafe { copy_trivial(dst, src, t) }
}

/// Copy or move of a zero-size value: there are no bytes to touch.
///
/// # Safety
/// Always safe to call; `unsafe` only to fit the witness signature.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub unsafe extern "C-unwind" fn copy_move_nop(
    _dst: *mut Opaque,
    _src: *mut Opaque,
    _t: *const Type,
) {
}

/// Drop of a value that owns nothing.
///
/// # Safety
/// Always safe to call; `unsafe` only to fit the witness signature.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub unsafe extern "C-unwind" fn drop_nop(_val: *mut Opaque, _t: *const Type) {}

const fn trivial_vwt(size: usize) -> ValueWitnessTable {
    if size == 0 {
        return ValueWitnessTable::new(Layout::new::<()>(), copy_move_nop, copy_move_nop, drop_nop);
    }
    let layout = match Layout::from_size_align(size, size) {
        Ok(layout) => layout,
        Err(_) => panic!("trivial size classes are powers of two"),
    };
    ValueWitnessTable::new(layout, copy_trivial, move_trivial, drop_nop)
}

/// Witness tables of the trivial family, indexed by [`TrivialClass::index`].
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub static TRIVIAL_VWT: [ValueWitnessTable; 6] = [
    trivial_vwt(TRIVIAL_SIZES[0]),
    trivial_vwt(TRIVIAL_SIZES[1]),
    trivial_vwt(TRIVIAL_SIZES[2]),
    trivial_vwt(TRIVIAL_SIZES[3]),
    trivial_vwt(TRIVIAL_SIZES[4]),
    trivial_vwt(TRIVIAL_SIZES[5]),
];

/// Descriptors of the trivial family, each pointing at its table.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub static TRIVIAL_METAS: [Type; 6] = [
    Type::new(&TRIVIAL_VWT[0], TypeFlags::TRIVIAL),
    Type::new(&TRIVIAL_VWT[1], TypeFlags::TRIVIAL),
    Type::new(&TRIVIAL_VWT[2], TypeFlags::TRIVIAL),
    Type::new(&TRIVIAL_VWT[3], TypeFlags::TRIVIAL),
    Type::new(&TRIVIAL_VWT[4], TypeFlags::TRIVIAL),
    Type::new(&TRIVIAL_VWT[5], TypeFlags::TRIVIAL),
];

/// One size class of the trivial family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrivialClass {
    Empty,
    B1,
    B2,
    B4,
    B8,
    B16,
}

impl TrivialClass {
    pub const ALL: [TrivialClass; 6] = [
        TrivialClass::Empty,
        TrivialClass::B1,
        TrivialClass::B2,
        TrivialClass::B4,
        TrivialClass::B8,
        TrivialClass::B16,
    ];

    /// The class whose size is exactly `size`.
    pub fn from_size(size: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.size() == size)
    }

    /// The smallest class that can hold `size` bytes.
    ///
    /// Values copied through a wider class must live in storage padded to
    /// the class size.
    pub fn fitting(size: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.size() >= size)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn size(self) -> usize {
        TRIVIAL_SIZES[self.index()]
    }

    #[inline]
    pub fn align(self) -> usize {
        self.vwt().align()
    }

    #[inline]
    pub fn vwt(self) -> &'static ValueWitnessTable {
        &TRIVIAL_VWT[self.index()]
    }

    #[inline]
    pub fn ty(self) -> &'static Type {
        &TRIVIAL_METAS[self.index()]
    }
}
