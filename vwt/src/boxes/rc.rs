use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering, fence};

use tracing::{error, trace};

use super::{BlockGuard, BlockLayout};
use crate::alloc::{IAlloc, LAlloc, alloc_failure};
use crate::error::AllocError;
use crate::metadata::Type;
use crate::ptr::{PtrConst, PtrMut, PtrUninit, PtrUninitExt};
use crate::witness::ValueWitness;

/// Counts above this abort the process rather than risk wrapping.
const MAX_REFCOUNT: usize = isize::MAX as usize;

#[repr(C)]
struct RcHeader {
    strong: AtomicUsize,
    payload: &'static Type,
}

/// Reference-counted box.
///
/// Handles may be copied and dropped from any thread: the count is always
/// updated with atomic read-modify-write operations, and only the drop that
/// takes the count from one to zero releases the payload.
pub struct RcBox<A: IAlloc = LAlloc>(PhantomData<A>);

impl<A: IAlloc> RcBox<A> {
    /// Box the value at `payload_src` with a count of one.
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
        let block = BlockLayout::new::<RcHeader>(payload)?;
        let guard = BlockGuard::<A>::new(A::alloc(block.layout)?, block.layout);
        unsafe {
            let base = guard.ptr_for_init();
            base.cast::<RcHeader>().write(RcHeader {
                strong: AtomicUsize::new(1),
                payload,
            });
            payload.move_value(PtrUninit::new(base.add(block.payload_offset)), payload_src);
        }
        let base = guard.disarm();
        trace!(block = ?base, size = block.layout.size(), "rc box: alloc");
        Ok(unsafe { dst.write_value(base.as_ptr()) })
    }

    /// Like [`RcBox::try_new_in`], with allocation failure fatal.
    ///
    /// # Safety
    /// Same as [`RcBox::try_new_in`].
    pub unsafe fn new_in(dst: PtrUninit, payload: &'static Type, payload_src: PtrMut) -> PtrMut {
        unsafe { Self::try_new_in(dst, payload, payload_src) }.unwrap_or_else(|err| alloc_failure(err))
    }

    /// Address of the shared payload.
    ///
    /// # Safety
    /// `boxed` holds a live rc-box handle.
    pub unsafe fn payload_ptr(boxed: PtrConst) -> PtrMut {
        unsafe {
            let block = boxed.read::<*mut u8>();
            let offset = BlockLayout::existing::<RcHeader>(Self::header(block).payload).payload_offset;
            PtrMut::new(block.add(offset))
        }
    }

    /// # Safety
    /// `boxed` holds a live rc-box handle.
    pub unsafe fn payload_type(boxed: PtrConst) -> &'static Type {
        unsafe { Self::header(boxed.read::<*mut u8>()) }.payload
    }

    /// Number of live handles sharing the block.
    ///
    /// # Safety
    /// `boxed` holds a live rc-box handle.
    pub unsafe fn strong_count(boxed: PtrConst) -> usize {
        unsafe { Self::header(boxed.read::<*mut u8>()) }
            .strong
            .load(Ordering::Relaxed)
    }

    unsafe fn header<'a>(block: *mut u8) -> &'a RcHeader {
        unsafe { &*block.cast::<RcHeader>() }
    }
}

impl<A: IAlloc> ValueWitness for RcBox<A> {
    const LAYOUT: Layout = Layout::new::<*mut u8>();

    unsafe fn copy(dst: PtrUninit, src: PtrConst, _t: &Type) {
        unsafe {
            let block = src.read::<*mut u8>();
            // A new handle can only be made from an existing one, so no
            // ordering with other memory is needed here.
            let old = Self::header(block).strong.fetch_add(1, Ordering::Relaxed);
            if old > MAX_REFCOUNT {
                error!(?block, count = old, "rc box: reference count overflow");
                std::process::abort();
            }
            dst.write_value(block);
        }
    }

    unsafe fn move_to(dst: PtrUninit, src: PtrMut, _t: &Type) {
        unsafe { dst.write_value(src.as_const().read::<*mut u8>()) };
    }

    unsafe fn drop(val: PtrMut, _t: &Type) {
        let block = unsafe { val.as_const().read::<*mut u8>() };
        let header = block.cast::<RcHeader>();
        // Release publishes this handle's writes to whoever frees the block.
        if unsafe { (*header).strong.fetch_sub(1, Ordering::Release) } != 1 {
            return;
        }
        fence(Ordering::Acquire);

        unsafe {
            let payload = (*header).payload;
            let layout = BlockLayout::existing::<RcHeader>(payload);
            payload.drop_value(PtrMut::new(block.add(layout.payload_offset)));
            A::dealloc(NonNull::new_unchecked(block), layout.layout);
        }
        trace!(?block, "rc box: release");
    }
}
