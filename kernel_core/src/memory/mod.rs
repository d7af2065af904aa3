//! Physical memory management: the page allocator (C1), the slab allocator
//! (C2) and the user-stack pool (C3).
//!
//! Page descriptors double as slab metadata (object size class, live count)
//! or block-cache metadata (dirty/locked/valid, owning device, LBA) — never
//! both at once. [`page::PageAllocator`] owns the descriptor table and the
//! free list of whole pages; [`slab::SlabAllocator`] carves pages from it
//! into cache-line-sized objects and doubles as the crate's [`GlobalAlloc`].
//!
//! [`GlobalAlloc`]: core::alloc::GlobalAlloc

pub mod page;
pub mod slab;
pub mod ustack;

pub use page::{PageAllocator, PageIndex, PageRole};
pub use slab::SlabAllocator;
pub use ustack::UserStackPool;
