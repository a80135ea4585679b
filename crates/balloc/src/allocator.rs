//! The buddy allocator engine: ties the arena, descriptor table, and free-list registry
//! together into `alloc`/`free`/`dump` operations.

use core::fmt;

use alloc::vec::Vec;

use crate::arena::Arena;
use crate::descriptor::{BlockDescriptor, BlockState};
use crate::error::{AllocError, FreeError};
use crate::registry::FreeListRegistry;

/// A binary buddy allocator over a fixed-size arena.
///
/// Construction reserves the entire backing arena up front as a single free block of
/// order `max_order`; no further system memory is requested over the allocator's
/// lifetime. `alloc` and `free` are both synchronous and non-reentrant: the allocator
/// carries no internal locking, matching the single-threaded scope this crate targets.
pub struct BuddyAllocator {
    arena: Arena,
    registry: FreeListRegistry,
    descriptors: Vec<BlockDescriptor>,
}

impl BuddyAllocator {
    /// Creates a new allocator managing `2^max_order` bytes, split no finer than
    /// `2^min_order`-byte pages.
    pub fn new(min_order: u32, max_order: u32) -> Self {
        let arena = Arena::new(min_order, max_order);
        let page_count = arena.page_count();

        let mut descriptors = Vec::with_capacity(page_count);
        for page in 0..page_count {
            descriptors.push(BlockDescriptor::dormant(arena.addr_of(page)));
        }

        let mut registry = FreeListRegistry::new(min_order, max_order);
        descriptors[0].set_free_head(max_order);
        registry.push(max_order, arena.base());

        log::info!(
            "initialized buddy allocator: base={:#x} size={} orders={}..={}",
            arena.base(),
            arena.arena_size(),
            min_order,
            max_order
        );

        Self {
            arena,
            registry,
            descriptors,
        }
    }

    /// The page size (size of a minimum-order block), in bytes.
    pub fn page_size(&self) -> usize {
        self.arena.page_size()
    }

    /// The total arena size, in bytes.
    pub fn arena_size(&self) -> usize {
        self.arena.arena_size()
    }

    /// The number of free blocks currently tracked at `order`.
    ///
    /// Returns 0 if `order` is outside `min_order..=max_order`.
    pub fn free_block_count(&self, order: u32) -> usize {
        if order < self.arena.min_order() || order > self.arena.max_order() {
            return 0;
        }
        self.registry.count(order)
    }

    fn target_order(&self, size: usize) -> Result<u32, AllocError> {
        let arena_size = self.arena.arena_size();
        if size == 0 || size > arena_size {
            return Err(AllocError::InvalidSize {
                requested: size,
                max_size: arena_size,
            });
        }

        let mut order = self.arena.min_order();
        while (1usize << order) < size {
            order += 1;
        }
        Ok(order)
    }

    /// Allocates a block of at least `size` bytes, returning its base address.
    ///
    /// The returned block is always a power-of-two size no smaller than `size` and no
    /// smaller than a page. If no free block is large enough, the arena is probed for the
    /// smallest available block at or above the target order and repeatedly split until
    /// a block of exactly the target order is produced.
    pub fn alloc(&mut self, size: usize) -> Result<usize, AllocError> {
        let target_order = self.target_order(size)?;

        let provider_order = self
            .registry
            .smallest_available_at_or_above(target_order, self.arena.max_order())
            .ok_or(AllocError::OutOfMemory { order: target_order })?;

        let addr = self
            .registry
            .pop_any(provider_order)
            .expect("registry reported a non-empty free list");

        let mut order = provider_order;
        while order > target_order {
            order -= 1;
            let right_addr = self.arena.buddy_of(addr, order);
            self.descriptors[self.arena.page_of(right_addr)].set_free_head(order);
            self.registry.push(order, right_addr);
        }

        self.descriptors[self.arena.page_of(addr)].set_allocated_head(target_order);
        log::debug!(
            "alloc({size}) -> {addr:#x} (order {target_order}, split from order {provider_order})"
        );
        Ok(addr)
    }

    /// Frees a block previously returned by `alloc`, coalescing with its buddy wherever
    /// possible.
    ///
    /// Returns an error, without mutating any state, if `address` is out of bounds,
    /// unaligned, was never allocated, has already been freed, or points into the
    /// interior of a block headed elsewhere.
    pub fn free(&mut self, address: usize) -> Result<(), FreeError> {
        if !self.arena.contains(address) || !self.arena.is_page_aligned(address) {
            return Err(FreeError::OutOfBounds { address });
        }

        let page = self.arena.page_of(address);
        let order = match self.descriptors[page].state() {
            BlockState::Dormant => return Err(FreeError::NotAllocated { address }),
            BlockState::Head { is_free: true, .. } => {
                return Err(FreeError::NotAllocated { address });
            }
            BlockState::Head {
                order,
                is_free: false,
            } => order,
        };

        let mut addr = address;
        let mut order = order;

        loop {
            if order == self.arena.max_order() {
                self.descriptors[self.arena.page_of(addr)].set_free_head(order);
                self.registry.push(order, addr);
                break;
            }

            let buddy_addr = self.arena.buddy_of(addr, order);
            let buddy_page = self.arena.page_of(buddy_addr);
            let buddy_matches = matches!(
                self.descriptors[buddy_page].state(),
                BlockState::Head { order: buddy_order, is_free: true } if buddy_order == order
            );

            if !buddy_matches {
                self.descriptors[self.arena.page_of(addr)].set_free_head(order);
                self.registry.push(order, addr);
                break;
            }

            self.registry.remove(order, buddy_addr);
            self.descriptors[buddy_page].set_dormant();

            let (survivor, loser) = if addr < buddy_addr {
                (addr, buddy_addr)
            } else {
                (buddy_addr, addr)
            };
            self.descriptors[self.arena.page_of(loser)].set_dormant();

            addr = survivor;
            order += 1;
        }

        log::debug!("free({address:#x})");
        Ok(())
    }

    /// Writes the free-list census to `writer`: for each order from `min_order` to
    /// `max_order`, the count of free blocks and their size in KiB, space-separated, with
    /// a trailing newline.
    pub fn dump<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        for order in self.arena.min_order()..=self.arena.max_order() {
            let count = self.registry.count(order);
            let size_kb = (1usize << order) >> 10;
            write!(writer, "{count}:{size_kb}K ")?;
        }
        writeln!(writer)
    }
}
