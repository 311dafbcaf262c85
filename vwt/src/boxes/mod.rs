//! The box witness family.
//!
//! A box is a one-word handle standing for a payload stored elsewhere. The
//! three canonical tables implement the three ownership disciplines:
//!
//! - [`OwnedBox`]: exclusive ownership; copy is a deep duplicate.
//! - [`UnownedBox`]: a borrowed view; never allocates or frees.
//! - [`RcBox`]: shared ownership through an embedded atomic count.
//!
//! Owned and reference-counted blocks start with a header that records the
//! payload's descriptor, so one table serves every payload type:
//!
//! ```text
//! owned block: [ payload: &Type | pad | payload bytes ]
//! rc block:    [ strong: AtomicUsize | payload: &Type | pad | payload bytes ]
//! ```

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::alloc::{IAlloc, LAlloc, alloc_failure};
use crate::error::AllocError;
use crate::metadata::{Type, TypeFlags, ValueWitnessTable};
use crate::witness::witness_table;

mod owned;
mod rc;
mod unowned;

pub use owned::OwnedBox;
pub use rc::RcBox;
pub use unowned::UnownedBox;

/// Table for exclusively owned boxes.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub static OWNED_BOX_VWT: ValueWitnessTable = witness_table::<OwnedBox<LAlloc>>();

/// Table for non-owning boxes.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub static UNOWNED_BOX_VWT: ValueWitnessTable = witness_table::<UnownedBox>();

/// Table for reference-counted boxes.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub static RC_BOX_VWT: ValueWitnessTable = witness_table::<RcBox<LAlloc>>();

pub static OWNED_BOX_TYPE: Type = Type::new(&OWNED_BOX_VWT, TypeFlags::empty());

/// Unowned boxes copy bitwise and drop to nothing, which is exactly trivial.
pub static UNOWNED_BOX_TYPE: Type = Type::new(&UNOWNED_BOX_VWT, TypeFlags::TRIVIAL);

pub static RC_BOX_TYPE: Type = Type::new(&RC_BOX_VWT, TypeFlags::empty());

/// The ownership discipline a box follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxKind {
    Owned,
    Unowned,
    Rc,
}

impl BoxKind {
    /// The canonical table for this discipline.
    pub fn vwt(self) -> &'static ValueWitnessTable {
        match self {
            BoxKind::Owned => &OWNED_BOX_VWT,
            BoxKind::Unowned => &UNOWNED_BOX_VWT,
            BoxKind::Rc => &RC_BOX_VWT,
        }
    }

    /// The canonical descriptor for this discipline.
    pub fn ty(self) -> &'static Type {
        match self {
            BoxKind::Owned => &OWNED_BOX_TYPE,
            BoxKind::Unowned => &UNOWNED_BOX_TYPE,
            BoxKind::Rc => &RC_BOX_TYPE,
        }
    }

    /// Recover the discipline from one of the canonical descriptors.
    pub fn of(ty: &Type) -> Option<Self> {
        [BoxKind::Owned, BoxKind::Unowned, BoxKind::Rc]
            .into_iter()
            .find(|kind| kind.ty().same(ty))
    }
}

/// Layout of a heap block: header `H`, then the payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockLayout {
    pub layout: Layout,
    pub payload_offset: usize,
}

impl BlockLayout {
    pub(crate) fn new<H>(payload: &Type) -> Result<Self, AllocError> {
        let payload_layout = payload.layout();
        let (layout, payload_offset) = Layout::new::<H>()
            .extend(payload_layout)
            .map_err(|_| AllocError::layout_overflow(payload_layout))?;
        Ok(Self {
            layout: layout.pad_to_align(),
            payload_offset,
        })
    }

    /// Layout of a block that was already allocated once, so it cannot fail.
    pub(crate) fn existing<H>(payload: &Type) -> Self {
        Self::new::<H>(payload).unwrap_or_else(|err| alloc_failure(err))
    }
}

/// Releases a freshly allocated block if payload initialization unwinds.
pub(crate) struct BlockGuard<A: IAlloc> {
    ptr: NonNull<u8>,
    layout: Layout,
    _alloc: core::marker::PhantomData<A>,
}

impl<A: IAlloc> BlockGuard<A> {
    pub(crate) fn new(ptr: NonNull<u8>, layout: Layout) -> Self {
        Self {
            ptr,
            layout,
            _alloc: core::marker::PhantomData,
        }
    }

    pub(crate) fn ptr_for_init(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Payload is in place: the block now belongs to the box.
    pub(crate) fn disarm(self) -> NonNull<u8> {
        let ptr = self.ptr;
        core::mem::forget(self);
        ptr
    }
}

impl<A: IAlloc> Drop for BlockGuard<A> {
    fn drop(&mut self) {
        // SAFETY: the block was allocated for `layout` and never handed out
        unsafe { A::dealloc(self.ptr, self.layout) }
    }
}

#[cfg(test)]
mod tests;
