//! A fixed-size heap with an explicit free list
//!
//! One arena is mapped up front and never grows. Every block starts with a
//! header holding its payload size, a free flag and the free-list links;
//! allocation is first fit over the free list, and released blocks are merged
//! with free neighbours straight away so no two free blocks ever touch.
//!
//! ```text
//!   | hdr | payload | hdr | payload  | hdr | payload ...          |
//!   ^ arena start                                     arena end ^
//! ```
//!
//! Blocks are addressed by byte offsets into the arena: a [`BlockId`] points
//! at a header, a [`Handle`] at the payload handed to callers.
//!
//! ```rust
//! use fixed_heap::{FreeListAllocator, HeapConfig};
//!
//! let mut heap = FreeListAllocator::new(HeapConfig::default()).unwrap();
//! let handle = heap.allocate(20).unwrap();
//! assert_eq!(heap.usable_size(handle).unwrap(), 24);
//!
//! heap.payload_mut(handle).unwrap()[..5].copy_from_slice(b"hello");
//! heap.deallocate(handle).unwrap();
//! assert_eq!(heap.blocks().count(), 1);
//! ```

mod allocator;
mod arena;
mod block;
mod config;
mod deallocator;
mod diagnostics;
mod error;
mod free_list_allocator;
pub mod global;
mod navigator;

pub use block::{ALIGNMENT, BlockId, HEADER_SIZE, Handle, round_up};
pub use config::{HeapConfig, MEM_SIZE, MEM_SIZE_ENV};
pub use diagnostics::{BlockInfo, Blocks, FreeBlocks, FreeList, HeapStats};
pub use error::{AllocError, HandleFault, Result};
pub use free_list_allocator::FreeListAllocator;
pub use global::LockedAllocator;
