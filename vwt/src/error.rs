use core::alloc::Layout;

use thiserror::Error;

/// An allocation at the allocation boundary could not be satisfied.
///
/// Witness operations never return this: they treat it as fatal. It only
/// surfaces from the `try_*` entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The allocator had no memory for the request.
    #[error("allocation of {size} bytes (align {align}) failed")]
    Exhausted { size: usize, align: usize },
    /// The block needed to hold a payload of this layout overflows `isize`.
    #[error("block for a {size}-byte payload (align {align}) overflows the address space")]
    LayoutOverflow { size: usize, align: usize },
}

impl AllocError {
    pub(crate) fn exhausted(layout: Layout) -> Self {
        Self::Exhausted {
            size: layout.size(),
            align: layout.align(),
        }
    }

    pub(crate) fn layout_overflow(payload: Layout) -> Self {
        Self::LayoutOverflow {
            size: payload.size(),
            align: payload.align(),
        }
    }

    /// The layout the allocator refused, if the failure came from the allocator.
    pub fn layout(&self) -> Option<Layout> {
        match *self {
            Self::Exhausted { size, align } => Layout::from_size_align(size, align).ok(),
            Self::LayoutOverflow { .. } => None,
        }
    }
}

/// Misuse of a [`Slot`](crate::Slot), reported instead of undefined behavior.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// The two slots hold different type descriptors.
    #[error("type mismatch between slots")]
    TypeMismatch,
    /// The source slot holds no value.
    #[error("source slot holds no value")]
    SourceEmpty,
    /// The slot holds no value.
    #[error("slot holds no value")]
    Empty,
    /// The destination slot still holds a value.
    #[error("destination slot already holds a value")]
    Occupied,
    /// Raw byte access is only allowed for trivial types.
    #[error("byte access requires a trivial type")]
    NotTrivial,
    /// The byte buffer does not match the type's size.
    #[error("expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Alloc(#[from] AllocError),
}
