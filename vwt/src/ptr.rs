//! Typed addresses into opaque storage.
//!
//! Inside the crate an address says what the caller promised about the bytes
//! behind it, using facet's pointer types: nothing yet ([`PtrUninit`]), a
//! live value we may consume or mutate ([`PtrMut`]), or a live value we may
//! only read ([`PtrConst`]). At the binary boundary values travel as
//! `*mut Opaque`; the traits here convert between the two and add the raw
//! writes witnesses perform.

use core::marker::{PhantomData, PhantomPinned};

pub use facet_core::{PtrConst, PtrMut, PtrUninit};

/// Storage of a statically-unknown type. Never constructed, only addressed.
#[repr(C)]
pub struct Opaque {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Conversion to and from the `*mut Opaque` form used by witness tables.
pub trait OpaquePtr: Copy {
    fn from_opaque(ptr: *mut Opaque) -> Self;

    fn to_opaque(self) -> *mut Opaque;
}

impl OpaquePtr for PtrUninit {
    #[inline]
    fn from_opaque(ptr: *mut Opaque) -> Self {
        PtrUninit::new(ptr.cast::<u8>())
    }

    #[inline]
    fn to_opaque(self) -> *mut Opaque {
        self.as_mut_byte_ptr().cast()
    }
}

impl OpaquePtr for PtrMut {
    #[inline]
    fn from_opaque(ptr: *mut Opaque) -> Self {
        PtrMut::new(ptr.cast::<u8>())
    }

    #[inline]
    fn to_opaque(self) -> *mut Opaque {
        self.as_mut_byte_ptr().cast()
    }
}

impl OpaquePtr for PtrConst {
    #[inline]
    fn from_opaque(ptr: *mut Opaque) -> Self {
        PtrConst::new(ptr.cast_const().cast::<u8>())
    }

    /// The binary contract passes sources as `*mut Opaque`; witnesses never
    /// write through a copy source.
    #[inline]
    fn to_opaque(self) -> *mut Opaque {
        self.as_byte_ptr().cast_mut().cast()
    }
}

/// Initialization of storage that holds no value yet.
pub trait PtrUninitExt {
    /// Write `value` and return the now-initialized address.
    ///
    /// # Safety
    /// The storage must be valid for writes of `T` and aligned for `T`.
    unsafe fn write_value<T>(self, value: T) -> PtrMut;
}

impl PtrUninitExt for PtrUninit {
    #[inline]
    unsafe fn write_value<T>(self, value: T) -> PtrMut {
        unsafe {
            self.as_mut_byte_ptr().cast::<T>().write(value);
            self.assume_init()
        }
    }
}

/// Raw updates of a live value.
pub trait PtrMutExt {
    /// Overwrite the value without dropping the old one.
    ///
    /// # Safety
    /// The address must be valid for writes of `T` and aligned for `T`.
    unsafe fn overwrite<T>(self, value: T);

    /// Forget the value: the caller has moved it out or dropped it.
    fn into_uninit(self) -> PtrUninit;
}

impl PtrMutExt for PtrMut {
    #[inline]
    unsafe fn overwrite<T>(self, value: T) {
        unsafe { self.as_mut_byte_ptr().cast::<T>().write(value) }
    }

    #[inline]
    fn into_uninit(self) -> PtrUninit {
        PtrUninit::new(self.as_mut_byte_ptr())
    }
}
