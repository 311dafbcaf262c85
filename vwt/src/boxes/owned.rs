use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use tracing::trace;

use super::{BlockGuard, BlockLayout};
use crate::alloc::{IAlloc, LAlloc, alloc_failure};
use crate::error::AllocError;
use crate::metadata::Type;
use crate::ptr::{PtrConst, PtrMut, PtrMutExt, PtrUninit, PtrUninitExt};
use crate::witness::ValueWitness;

#[repr(C)]
struct OwnedHeader {
    payload: &'static Type,
}

/// Exclusively owned box.
///
/// The handle is either live (points at a block it alone owns) or moved-from
/// (null). Dropping a moved-from handle does nothing.
pub struct OwnedBox<A: IAlloc = LAlloc>(PhantomData<A>);

impl<A: IAlloc> OwnedBox<A> {
    /// Box the value at `payload_src`: allocate a block and relocate the value
    /// into it through `payload`'s move witness.
    ///
    /// On error nothing was moved and `payload_src` still belongs to the caller.
    ///
    /// # Safety
    /// `dst` is uninitialized, pointer-sized and aligned. `payload_src` holds
    /// a live value described by `payload`.
    pub unsafe fn try_new_in(
        dst: PtrUninit,
        payload: &'static Type,
        payload_src: PtrMut,
    ) -> Result<PtrMut, AllocError> {
        let block = BlockLayout::new::<OwnedHeader>(payload)?;
        let guard = BlockGuard::<A>::new(A::alloc(block.layout)?, block.layout);
        unsafe {
            let base = guard.ptr_for_init();
            base.cast::<OwnedHeader>().write(OwnedHeader { payload });
            payload.move_value(PtrUninit::new(base.add(block.payload_offset)), payload_src);
        }
        let base = guard.disarm();
        trace!(block = ?base, size = block.layout.size(), "owned box: alloc");
        Ok(unsafe { dst.write_value(base.as_ptr()) })
    }

    /// Like [`OwnedBox::try_new_in`], with allocation failure fatal.
    ///
    /// # Safety
    /// Same as [`OwnedBox::try_new_in`].
    pub unsafe fn new_in(dst: PtrUninit, payload: &'static Type, payload_src: PtrMut) -> PtrMut {
        unsafe { Self::try_new_in(dst, payload, payload_src) }.unwrap_or_else(|err| alloc_failure(err))
    }

    /// Duplicate `src` into a fresh block, reporting allocation failure.
    ///
    /// Copying a moved-from handle yields another moved-from handle. On error
    /// `dst` is left uninitialized.
    ///
    /// # Safety
    /// Same contract as [`ValueWitness::copy`].
    pub unsafe fn try_copy(dst: PtrUninit, src: PtrConst) -> Result<PtrMut, AllocError> {
        let src_block = unsafe { src.read::<*mut u8>() };
        if src_block.is_null() {
            return Ok(unsafe { dst.write_value(ptr::null_mut::<u8>()) });
        }

        let payload = unsafe { Self::header(src_block) }.payload;
        let block = BlockLayout::new::<OwnedHeader>(payload)?;
        let guard = BlockGuard::<A>::new(A::alloc(block.layout)?, block.layout);
        unsafe {
            let base = guard.ptr_for_init();
            base.cast::<OwnedHeader>().write(OwnedHeader { payload });
            payload.copy(
                PtrUninit::new(base.add(block.payload_offset)),
                PtrConst::new(src_block.add(block.payload_offset).cast_const()),
            );
        }
        let base = guard.disarm();
        trace!(from = ?src_block, to = ?base, "owned box: deep copy");
        Ok(unsafe { dst.write_value(base.as_ptr()) })
    }

    /// Address of the payload, or `None` for a moved-from handle.
    ///
    /// # Safety
    /// `boxed` holds an owned-box handle.
    pub unsafe fn payload_ptr(boxed: PtrConst) -> Option<PtrMut> {
        let block = NonNull::new(unsafe { boxed.read::<*mut u8>() })?;
        let payload = unsafe { Self::header(block.as_ptr()) }.payload;
        let offset = BlockLayout::existing::<OwnedHeader>(payload).payload_offset;
        Some(PtrMut::new(unsafe { block.as_ptr().add(offset) }))
    }

    /// Descriptor of the payload, or `None` for a moved-from handle.
    ///
    /// # Safety
    /// `boxed` holds an owned-box handle.
    pub unsafe fn payload_type(boxed: PtrConst) -> Option<&'static Type> {
        let block = NonNull::new(unsafe { boxed.read::<*mut u8>() })?;
        Some(unsafe { Self::header(block.as_ptr()) }.payload)
    }

    /// Whether the handle was the source of a move.
    ///
    /// # Safety
    /// `boxed` holds an owned-box handle.
    pub unsafe fn is_moved_from(boxed: PtrConst) -> bool {
        unsafe { boxed.read::<*mut u8>() }.is_null()
    }

    unsafe fn header<'a>(block: *mut u8) -> &'a OwnedHeader {
        unsafe { &*block.cast::<OwnedHeader>() }
    }
}

impl<A: IAlloc> ValueWitness for OwnedBox<A> {
    const LAYOUT: Layout = Layout::new::<*mut u8>();

    unsafe fn copy(dst: PtrUninit, src: PtrConst, _t: &Type) {
        if let Err(err) = unsafe { Self::try_copy(dst, src) } {
            alloc_failure(err);
        }
    }

    unsafe fn move_to(dst: PtrUninit, src: PtrMut, _t: &Type) {
        unsafe {
            let block = src.as_const().read::<*mut u8>();
            dst.write_value(block);
            src.overwrite(ptr::null_mut::<u8>());
        }
    }

    unsafe fn drop(val: PtrMut, _t: &Type) {
        let Some(block) = NonNull::new(unsafe { val.as_const().read::<*mut u8>() }) else {
            return;
        };
        let payload = unsafe { Self::header(block.as_ptr()) }.payload;
        let layout = BlockLayout::existing::<OwnedHeader>(payload);
        unsafe {
            payload.drop_value(PtrMut::new(block.as_ptr().add(layout.payload_offset)));
            A::dealloc(block, layout.layout);
        }
        trace!(?block, "owned box: release");
    }
}
