//! The allocation boundary.
//!
//! Box witnesses are plain functions stored in static tables, so they cannot
//! carry an allocator value. They are instead generic over an allocator
//! *type* with static methods: [`LAlloc`] for real memory, [`VAlloc`] when
//! every block should be accounted for.

use core::alloc::Layout;
use core::ptr::NonNull;

use tracing::error;

use crate::error::AllocError;

mod verified;

pub use verified::{V_OWNED_BOX_TYPE, V_OWNED_BOX_VWT, V_RC_BOX_TYPE, V_RC_BOX_VWT, VAlloc, VAllocStats};

/// Backing storage for box blocks and slots.
pub trait IAlloc {
    /// Allocate a block for `layout`. `layout` never has size 0.
    fn alloc(layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Release a block.
    ///
    /// # Safety
    /// `ptr` was returned by [`IAlloc::alloc`] on this allocator for exactly
    /// `layout` and has not been released since.
    unsafe fn dealloc(ptr: NonNull<u8>, layout: Layout);
}

/// Live allocator over `std::alloc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LAlloc;

impl IAlloc for LAlloc {
    fn alloc(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0, "zero-size layouts never reach the allocator");
        // SAFETY: layout.size() > 0
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::exhausted(layout))
    }

    unsafe fn dealloc(ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: caller guarantees this is a live allocation for `layout`
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

/// Allocate storage for `layout`, resolving zero-size requests to an aligned
/// dangling address without touching the allocator.
pub(crate) fn alloc_storage<A: IAlloc>(layout: Layout) -> Result<NonNull<u8>, AllocError> {
    if layout.size() == 0 {
        // SAFETY: alignments are non-zero
        return Ok(unsafe { NonNull::new_unchecked(core::ptr::without_provenance_mut(layout.align())) });
    }
    A::alloc(layout)
}

/// Counterpart of [`alloc_storage`].
///
/// # Safety
/// `ptr` came from `alloc_storage::<A>(layout)` and was not released since.
pub(crate) unsafe fn dealloc_storage<A: IAlloc>(ptr: NonNull<u8>, layout: Layout) {
    if layout.size() > 0 {
        unsafe { A::dealloc(ptr, layout) }
    }
}

/// The fatal policy: a witness operation could not allocate.
#[cold]
pub(crate) fn alloc_failure(err: AllocError) -> ! {
    error!(%err, "allocation failed inside a witness operation");
    match err.layout() {
        Some(layout) => std::alloc::handle_alloc_error(layout),
        None => std::process::abort(),
    }
}

#[cfg(test)]
mod tests;
