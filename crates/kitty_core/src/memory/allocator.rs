//! # Block Allocator
//!
//! Fixed-capacity pool of equally-sized byte blocks. All storage is reserved
//! at construction; blocks are handed out and returned through
//! [`BlockHandle`]s, never raw pointers.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::diag::DiagnosticSink;
use crate::error::{CoreError, CoreResult};

/// Source of per-allocator identities, so handles from one pool are
/// recognised as foreign by every other pool.
static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Handle to a block inside an [`Allocator`].
///
/// Carries the owning arena, the slot index and the slot generation at the
/// time of allocation. A handle whose block has been freed (and possibly
/// reused) is detected as stale instead of aliasing the new owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    arena: u32,
    index: u32,
    generation: u32,
}

impl BlockHandle {
    /// Returns the slot index of this block.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the generation of the slot when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

/// A pool allocator for fixed-size byte blocks.
///
/// The item size may be larger than any single record stored in the pool, so
/// one arena can back records of different shapes. Records are written and
/// read through [`Allocator::block`] / [`Allocator::block_mut`].
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Containers share it through a `RefCell`.
///
/// # Example
///
/// ```rust
/// use kitty_core::Allocator;
///
/// let mut pool = Allocator::new(4, 16);
/// let block = pool.allocate()?;
/// pool.block_mut(block)?[0] = 7;
/// assert_eq!(pool.live(), 1);
///
/// pool.deallocate(block)?;
/// assert_eq!(pool.high_water(), 1);
/// # Ok::<(), kitty_core::CoreError>(())
/// ```
pub struct Allocator {
    /// Identity checked against every handle.
    id: u32,
    /// `capacity * item_size` contiguous bytes.
    storage: Box<[u8]>,
    /// Size of one block in bytes.
    item_size: usize,
    /// Number of blocks.
    capacity: usize,
    /// In-use flag per block.
    in_use: Box<[bool]>,
    /// Bumped on every free.
    generations: Box<[u32]>,
    /// Free block indices; pops yield ascending indices on a fresh pool.
    free_list: Vec<u32>,
    /// Blocks currently handed out.
    live: usize,
    /// Highest `live` ever observed.
    high_water: usize,
}

impl Allocator {
    /// Creates a pool of `capacity` blocks of `item_size` bytes each.
    ///
    /// All memory is reserved upfront.
    ///
    /// # Panics
    ///
    /// Construction failure is fatal: panics if `capacity` or `item_size` is
    /// zero, if `capacity` does not fit a `u32`, or if the total byte size
    /// overflows.
    #[must_use]
    pub fn new(capacity: usize, item_size: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");
        assert!(item_size > 0, "Item size must be greater than zero");
        let Ok(last) = u32::try_from(capacity) else {
            panic!("Capacity {capacity} exceeds the handle range");
        };
        let Some(bytes) = capacity.checked_mul(item_size) else {
            panic!("Pool of {capacity} x {item_size} bytes overflows the address space");
        };

        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, capacity, item_size, "allocator reserved");

        Self {
            id,
            storage: vec![0u8; bytes].into_boxed_slice(),
            item_size,
            capacity,
            in_use: vec![false; capacity].into_boxed_slice(),
            generations: vec![0u32; capacity].into_boxed_slice(),
            free_list: (0..last).rev().collect(),
            live: 0,
            high_water: 0,
        }
    }

    /// Returns the number of blocks.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the size of one block in bytes.
    #[inline]
    #[must_use]
    pub const fn item_size(&self) -> usize {
        self.item_size
    }

    /// Returns the number of blocks currently allocated.
    #[inline]
    #[must_use]
    pub const fn live(&self) -> usize {
        self.live
    }

    /// Returns the number of free blocks.
    #[inline]
    #[must_use]
    pub const fn available(&self) -> usize {
        self.capacity - self.live
    }

    /// Returns the highest number of simultaneously allocated blocks.
    #[inline]
    #[must_use]
    pub const fn high_water(&self) -> usize {
        self.high_water
    }

    /// Returns `true` when no block is free.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.live == self.capacity
    }

    /// Takes a free block and returns its handle.
    ///
    /// The block is zeroed. Never blocks, grows or evicts.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoCapacity`] when every block is in use.
    pub fn allocate(&mut self) -> CoreResult<BlockHandle> {
        let Some(index) = self.free_list.pop() else {
            tracing::warn!(capacity = self.capacity, "allocator could not allocate new block from pool");
            return Err(CoreError::NoCapacity {
                arena: "allocator",
                capacity: self.capacity,
            });
        };

        let slot = index as usize;
        self.in_use[slot] = true;
        let range = self.byte_range(slot);
        self.storage[range].fill(0);
        self.live += 1;
        if self.live > self.high_water {
            self.high_water = self.live;
            tracing::trace!(high_water = self.high_water, "allocator reached new high-water mark");
        }

        Ok(BlockHandle {
            arena: self.id,
            index,
            generation: self.generations[slot],
        })
    }

    /// Returns a block to the pool.
    ///
    /// The block's contents are not cleared until it is handed out again.
    ///
    /// # Errors
    ///
    /// [`CoreError::ForeignHandle`] or [`CoreError::StaleHandle`] when the
    /// handle does not name a live block of this pool (foreign pointer,
    /// double free). No state changes in that case.
    pub fn deallocate(&mut self, handle: BlockHandle) -> CoreResult<()> {
        let slot = match self.resolve(handle) {
            Ok(slot) => slot,
            Err(err) => {
                tracing::warn!(%err, "block given to allocator to deallocate did not come from pool");
                return Err(err);
            }
        };

        self.in_use[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free_list.push(handle.index);
        self.live -= 1;
        Ok(())
    }

    /// Returns `true` if the handle names a live block of this pool.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: BlockHandle) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Returns the current handle for an allocated slot index.
    ///
    /// Ring containers store compact indices inside their blocks and turn
    /// them back into handles through this. Crate-private: a handle built
    /// from a bare index would pass the generation check for a block owned
    /// by someone else.
    #[must_use]
    pub(crate) fn handle_at(&self, index: u32) -> Option<BlockHandle> {
        let slot = index as usize;
        (*self.in_use.get(slot)?).then(|| BlockHandle {
            arena: self.id,
            index,
            generation: self.generations[slot],
        })
    }

    /// Gets the bytes of an allocated block.
    ///
    /// # Errors
    ///
    /// Same as [`Allocator::deallocate`] for handles that are not live.
    pub fn block(&self, handle: BlockHandle) -> CoreResult<&[u8]> {
        let slot = self.resolve(handle)?;
        Ok(&self.storage[self.byte_range(slot)])
    }

    /// Gets the bytes of an allocated block mutably.
    ///
    /// # Errors
    ///
    /// Same as [`Allocator::deallocate`] for handles that are not live.
    pub fn block_mut(&mut self, handle: BlockHandle) -> CoreResult<&mut [u8]> {
        let slot = self.resolve(handle)?;
        let range = self.byte_range(slot);
        Ok(&mut self.storage[range])
    }

    /// Writes live count and high-water mark.
    pub fn stat(&self, sink: &mut dyn DiagnosticSink) {
        sink.line(&format!(
            "Allocator: num taken = {}, max num taken = {}",
            self.live, self.high_water
        ));
    }

    /// Writes the arena base address and the offset and state of every block.
    pub fn dump_addresses(&self, sink: &mut dyn DiagnosticSink) {
        sink.line(&format!("Allocator: Pool address = {:p}", self.storage.as_ptr()));
        sink.line(&format!("Allocator: Taken address = {:p}", self.in_use.as_ptr()));
        sink.line("Allocator: Pool block addresses =");
        for (slot, used) in self.in_use.iter().enumerate() {
            sink.line(&format!(
                "  [{slot}] +{} {}",
                slot * self.item_size,
                if *used { "taken" } else { "free" }
            ));
        }
    }

    fn resolve(&self, handle: BlockHandle) -> CoreResult<usize> {
        let slot = handle.index as usize;
        if handle.arena != self.id || slot >= self.capacity {
            return Err(CoreError::ForeignHandle { index: handle.index });
        }
        let current = self.generations[slot];
        if current != handle.generation {
            return Err(CoreError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
                current,
            });
        }
        if !self.in_use[slot] {
            return Err(CoreError::ForeignHandle { index: handle.index });
        }
        Ok(slot)
    }

    #[inline]
    fn byte_range(&self, slot: usize) -> std::ops::Range<usize> {
        let start = slot * self.item_size;
        start..start + self.item_size
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("item_size", &self.item_size)
            .field("live", &self.live)
            .field("high_water", &self.high_water)
            .finish_non_exhaustive()
    }
}
