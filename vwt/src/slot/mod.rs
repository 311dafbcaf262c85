//! Runtime-checked handles over opaque storage.
//!
//! A [`Slot`] pairs storage with the descriptor it was sized for and tracks
//! whether it currently holds a value. The checks that raw witness calls
//! leave to the caller (matching descriptors, no use after move, no double
//! drop) become [`SlotError`]s here.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::alloc::{IAlloc, LAlloc, alloc_storage, dealloc_storage};
use crate::error::SlotError;
use crate::metadata::Type;
use crate::ptr::{Opaque, PtrConst, PtrMut, PtrUninit};

/// Storage for one value of a runtime-described type.
pub struct Slot<A: IAlloc = LAlloc> {
    ty: &'static Type,
    ptr: NonNull<u8>,
    init: bool,
    _alloc: PhantomData<A>,
}

impl Slot<LAlloc> {
    /// An empty slot for values of `ty`.
    pub fn new(ty: &'static Type) -> Result<Self, SlotError> {
        Self::new_in(ty)
    }

    /// A slot initialized from raw bytes. `ty` must be trivial.
    pub fn from_bytes(ty: &'static Type, bytes: &[u8]) -> Result<Self, SlotError> {
        Self::from_bytes_in(ty, bytes)
    }
}

impl<A: IAlloc> Slot<A> {
    /// An empty slot for values of `ty`, with storage from `A`.
    pub fn new_in(ty: &'static Type) -> Result<Self, SlotError> {
        let ptr = alloc_storage::<A>(ty.layout())?;
        Ok(Self {
            ty,
            ptr,
            init: false,
            _alloc: PhantomData,
        })
    }

    /// A slot initialized from raw bytes, with storage from `A`.
    pub fn from_bytes_in(ty: &'static Type, bytes: &[u8]) -> Result<Self, SlotError> {
        let mut slot = Self::new_in(ty)?;
        slot.write_bytes(bytes)?;
        Ok(slot)
    }

    #[inline]
    pub fn ty(&self) -> &'static Type {
        self.ty
    }

    #[inline]
    pub fn is_init(&self) -> bool {
        self.init
    }

    /// Address of the storage, for handing to witness-level code.
    #[inline]
    pub fn as_ptr(&self) -> *mut Opaque {
        self.ptr.as_ptr().cast()
    }

    /// Overwrite the value with `bytes`. Only trivial types have a byte
    /// representation that is also their value.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SlotError> {
        self.check_trivial()?;
        if bytes.len() != self.ty.size() {
            return Err(SlotError::SizeMismatch {
                expected: self.ty.size(),
                actual: bytes.len(),
            });
        }
        // SAFETY: storage holds `size` bytes; trivial values need no drop
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr(), bytes.len());
        }
        self.init = true;
        Ok(())
    }

    /// The value's bytes. Only for trivial types.
    pub fn bytes(&self) -> Result<&[u8], SlotError> {
        self.check_trivial()?;
        if !self.init {
            return Err(SlotError::Empty);
        }
        // SAFETY: initialized storage of `size` bytes
        Ok(unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.ty.size()) })
    }

    /// Initialize the slot with a raw initializer.
    ///
    /// # Safety
    /// `init` must leave a complete, live value of `self.ty()` at the address
    /// it receives.
    pub unsafe fn init_with(&mut self, init: impl FnOnce(PtrUninit)) -> Result<(), SlotError> {
        if self.init {
            return Err(SlotError::Occupied);
        }
        init(self.uninit_ptr());
        self.init = true;
        Ok(())
    }

    /// Duplicate `src`'s value into this empty slot.
    pub fn copy_from<B: IAlloc>(&mut self, src: &Slot<B>) -> Result<(), SlotError> {
        self.check_transfer(src.ty, src.init)?;
        // SAFETY: same descriptor, `src` live, `self` empty and distinct
        unsafe { self.ty.copy(self.uninit_ptr(), src.const_ptr()) };
        self.init = true;
        Ok(())
    }

    /// Relocate `src`'s value into this empty slot, leaving `src` empty.
    pub fn move_from<B: IAlloc>(&mut self, src: &mut Slot<B>) -> Result<(), SlotError> {
        self.check_transfer(src.ty, src.init)?;
        // SAFETY: same descriptor, `src` live, `self` empty and distinct
        unsafe { self.ty.move_value(self.uninit_ptr(), src.mut_ptr()) };
        src.init = false;
        self.init = true;
        Ok(())
    }

    /// A new slot holding a copy of this one's value.
    pub fn duplicate(&self) -> Result<Self, SlotError> {
        let mut copy = Self::new_in(self.ty)?;
        copy.copy_from(self)?;
        Ok(copy)
    }

    /// Drop the value, if any. Returns whether a value was dropped.
    pub fn clear(&mut self) -> bool {
        if !self.init {
            return false;
        }
        self.init = false;
        // SAFETY: live value of `ty`, never the source of a move
        unsafe { self.ty.drop_value(self.mut_ptr()) };
        true
    }

    /// The initialized value's address.
    pub fn value_ptr(&self) -> Result<PtrMut, SlotError> {
        if !self.init {
            return Err(SlotError::Empty);
        }
        Ok(self.mut_ptr())
    }

    /// Give up the value without dropping it, returning its address.
    ///
    /// The slot becomes empty. The caller takes over the value and must
    /// consume it with a move, or it leaks.
    pub fn take_value_ptr(&mut self) -> Result<PtrMut, SlotError> {
        let ptr = self.value_ptr()?;
        self.init = false;
        Ok(ptr)
    }

    fn check_trivial(&self) -> Result<(), SlotError> {
        if self.ty.is_trivial() {
            Ok(())
        } else {
            Err(SlotError::NotTrivial)
        }
    }

    fn check_transfer(&self, src_ty: &Type, src_init: bool) -> Result<(), SlotError> {
        if !self.ty.same(src_ty) {
            return Err(SlotError::TypeMismatch);
        }
        if !src_init {
            return Err(SlotError::SourceEmpty);
        }
        if self.init {
            return Err(SlotError::Occupied);
        }
        Ok(())
    }

    fn uninit_ptr(&self) -> PtrUninit {
        PtrUninit::new(self.ptr.as_ptr())
    }

    fn mut_ptr(&self) -> PtrMut {
        PtrMut::new(self.ptr.as_ptr())
    }

    fn const_ptr(&self) -> PtrConst {
        PtrConst::new(self.ptr.as_ptr().cast_const())
    }
}

impl<A: IAlloc> Drop for Slot<A> {
    fn drop(&mut self) {
        self.clear();
        // SAFETY: storage came from `alloc_storage::<A>` for this layout
        unsafe { dealloc_storage::<A>(self.ptr, self.ty.layout()) };
    }
}

impl<A: IAlloc> core::fmt::Debug for Slot<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Slot")
            .field("ptr", &self.ptr)
            .field("size", &self.ty.size())
            .field("align", &self.ty.align())
            .field("trivial", &self.ty.is_trivial())
            .field("init", &self.init)
            .finish()
    }
}
