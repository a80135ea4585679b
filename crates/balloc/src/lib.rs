//! A binary buddy allocator over a fixed, contiguous byte arena.
//!
//! The allocator partitions a power-of-two-sized arena into power-of-two blocks,
//! splitting a larger free block on demand and coalescing a freed block with its buddy
//! whenever that buddy is also free. It does not call into any system allocator or OS
//! facility after construction: the backing storage is reserved once, up front, and all
//! subsequent `alloc`/`free` traffic is pure bookkeeping over that fixed region.
//!
//! This crate has no thread-safety story: a `BuddyAllocator` is `!Sync` by convention of
//! use (nothing stops external synchronization, but none is provided here) and every
//! operation assumes exclusive access via `&mut self`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod allocator;
mod arena;
mod descriptor;
mod error;
mod human_size;
mod registry;

pub use allocator::BuddyAllocator;
pub use arena::{Arena, DEFAULT_MAX_ORDER, DEFAULT_MIN_ORDER};
pub use descriptor::{BlockDescriptor, BlockState};
pub use error::{AllocError, FreeError};
pub use human_size::HumanSize;
pub use registry::FreeListRegistry;
