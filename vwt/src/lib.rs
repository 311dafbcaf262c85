//! # vwt
//!
//! Value witness tables: manipulate values of statically-unknown type through
//! a uniform, type-erased interface while honoring each representation's
//! copy, move and drop semantics.
//!
//! A consumer holds a `&'static Type`. Every lifecycle operation goes through
//! `type.vwt().{copy, move, drop}`, never through type-specific code.
//!
//! ## Layers
//!
//! 1. **Metadata** - [`Type`] and [`ValueWitnessTable`], a stable `#[repr(C)]`
//!    contract other code links against.
//! 2. **Witnesses** - the [`ValueWitness`] trait, from which tables are built,
//!    and the two canonical families: trivial payloads ([`trivial`]) and boxes
//!    ([`boxes`]).
//! 3. **Allocation** - the [`IAlloc`] boundary. [`LAlloc`] performs real
//!    allocations, [`VAlloc`] tracks every block and catches double frees.
//! 4. **Slots** - [`Slot`], a runtime-checked handle that turns contract
//!    violations into errors instead of undefined behavior.

// Important rule: modules stay private unless they are part of the public
// interface on purpose.
mod error;
mod metadata;
mod ptr;
mod slot;
mod witness;

pub mod alloc;
pub mod boxes;
pub mod trivial;

#[cfg(kani)]
mod proofs;

pub use alloc::{IAlloc, LAlloc, VAlloc, VAllocStats};
pub use boxes::{
    BoxKind, OWNED_BOX_TYPE, OWNED_BOX_VWT, OwnedBox, RC_BOX_TYPE, RC_BOX_VWT, RcBox,
    UNOWNED_BOX_TYPE, UNOWNED_BOX_VWT, UnownedBox,
};
pub use error::{AllocError, SlotError};
pub use metadata::{CopyFn, DropFn, MoveFn, Type, TypeFlags, ValueWitnessTable};
pub use ptr::{Opaque, OpaquePtr, PtrConst, PtrMut, PtrMutExt, PtrUninit, PtrUninitExt};
pub use slot::Slot;
pub use trivial::{
    TRIVIAL_METAS, TRIVIAL_SIZES, TRIVIAL_VWT, TrivialClass, copy_move_nop, copy_trivial,
    drop_nop, move_trivial,
};
pub use witness::{Native, ValueWitness, trivial_type_of, witness_table};
