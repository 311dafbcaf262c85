//! Verified allocator: every block is recorded, every release is checked.
//!
//! The ledger is per thread. Blocks allocated through [`VAlloc`] must be
//! released on the thread that allocated them.

use core::alloc::Layout;
use core::ptr::NonNull;
use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::trace;

use super::{IAlloc, LAlloc};
use crate::boxes::{OwnedBox, RcBox};
use crate::error::AllocError;
use crate::metadata::{Type, TypeFlags, ValueWitnessTable};
use crate::witness::witness_table;

/// Owned-box table whose blocks go through [`VAlloc`].
pub static V_OWNED_BOX_VWT: ValueWitnessTable = witness_table::<OwnedBox<VAlloc>>();

/// Descriptor for [`V_OWNED_BOX_VWT`].
pub static V_OWNED_BOX_TYPE: Type = Type::new(&V_OWNED_BOX_VWT, TypeFlags::empty());

/// Reference-counted box table whose blocks go through [`VAlloc`].
pub static V_RC_BOX_VWT: ValueWitnessTable = witness_table::<RcBox<VAlloc>>();

/// Descriptor for [`V_RC_BOX_VWT`].
pub static V_RC_BOX_TYPE: Type = Type::new(&V_RC_BOX_VWT, TypeFlags::empty());

/// Counters of the current thread's ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VAllocStats {
    /// Blocks handed out.
    pub allocs: usize,
    /// Blocks released.
    pub deallocs: usize,
    /// Requests refused by fault injection.
    pub refused: usize,
    /// Blocks currently live.
    pub live: usize,
}

#[derive(Debug, Default)]
struct Ledger {
    live: BTreeMap<usize, Layout>,
    allocs: usize,
    deallocs: usize,
    refused: usize,
    fail_budget: usize,
}

thread_local! {
    static LEDGER: RefCell<Ledger> = RefCell::new(Ledger::default());
}

/// Allocator that tracks live blocks and panics on invalid releases.
#[derive(Debug, Clone, Copy, Default)]
pub struct VAlloc;

impl VAlloc {
    /// Forget everything recorded on this thread. Live blocks are leaked.
    pub fn reset() {
        LEDGER.with_borrow_mut(|ledger| *ledger = Ledger::default());
    }

    pub fn stats() -> VAllocStats {
        LEDGER.with_borrow(|ledger| VAllocStats {
            allocs: ledger.allocs,
            deallocs: ledger.deallocs,
            refused: ledger.refused,
            live: ledger.live.len(),
        })
    }

    /// Whether `ptr` is the start of a live block.
    pub fn is_live(ptr: *const u8) -> bool {
        LEDGER.with_borrow(|ledger| ledger.live.contains_key(&(ptr as usize)))
    }

    /// Refuse the next `count` allocation requests.
    pub fn fail_next_allocs(count: usize) {
        LEDGER.with_borrow_mut(|ledger| ledger.fail_budget = count);
    }

    /// # Panics
    /// Panics if any block allocated on this thread is still live.
    pub fn assert_no_leaks() {
        LEDGER.with_borrow(|ledger| {
            assert!(
                ledger.live.is_empty(),
                "leaked {} block(s): {:?}",
                ledger.live.len(),
                ledger.live
            );
        });
    }
}

impl IAlloc for VAlloc {
    fn alloc(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let refuse = LEDGER.with_borrow_mut(|ledger| {
            if ledger.fail_budget == 0 {
                return false;
            }
            ledger.fail_budget -= 1;
            ledger.refused += 1;
            true
        });
        if refuse {
            return Err(AllocError::exhausted(layout));
        }

        let ptr = LAlloc::alloc(layout)?;
        LEDGER.with_borrow_mut(|ledger| {
            let previous = ledger.live.insert(ptr.as_ptr() as usize, layout);
            assert!(previous.is_none(), "allocator handed out live block {ptr:p}");
            ledger.allocs += 1;
        });
        trace!(?ptr, size = layout.size(), "valloc: alloc");
        Ok(ptr)
    }

    unsafe fn dealloc(ptr: NonNull<u8>, layout: Layout) {
        LEDGER.with_borrow_mut(|ledger| {
            let Some(recorded) = ledger.live.remove(&(ptr.as_ptr() as usize)) else {
                panic!("double free or foreign pointer {ptr:p}");
            };
            assert_eq!(recorded, layout, "dealloc layout mismatch for {ptr:p}");
            ledger.deallocs += 1;
        });
        trace!(?ptr, size = layout.size(), "valloc: dealloc");
        unsafe { LAlloc::dealloc(ptr, layout) }
    }
}
