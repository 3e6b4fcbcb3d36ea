//! # Deque
//!
//! Double-ended queue built as a circular doubly-linked ring with a
//! permanent dummy head node. Nodes live in the blocks of a borrowed
//! [`Allocator`]; links are slot indices, not pointers.
//!
//! ```text
//!   block layout: [ next: u32 | prev: u32 | value: T ]
//!
//!        ┌──────────────────────────────────────┐
//!        ▼                                      │
//!     [head] ──next──> [a] ──next──> [b] ──next─┘
//! ```
//!
//! Push and pop at both ends are O(1). Positional access walks from the
//! front.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

use bytemuck::{bytes_of, pod_read_unaligned, Pod};

use super::allocator::{Allocator, BlockHandle};
use crate::error::{borrow_arena, borrow_arena_mut, CoreError, CoreResult};

const ARENA: &str = "node allocator";

/// Offset of the `next` link inside a node block.
const NEXT: usize = 0;
/// Offset of the `prev` link inside a node block.
const PREV: usize = 4;
/// Bytes taken by both links.
const LINKS: usize = 8;

/// Double-ended queue over a shared block allocator.
///
/// The allocator is borrowed for `'a`, so it outlives every deque built on
/// it. Dropping the deque returns every node, including the dummy head.
///
/// Operations never panic on the shared `RefCell`: while the caller holds a
/// borrow of the allocator they fail with [`CoreError::ArenaBusy`] (pops
/// return `None`).
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use kitty_core::Deque;
///
/// let nodes = RefCell::new(Deque::<u32>::create_allocator(4));
/// let mut deque = Deque::new(&nodes)?;
/// deque.push_back(1)?;
/// deque.push_front(0)?;
/// assert_eq!(deque.get(1)?, 1);
/// assert_eq!(deque.pop_front(), Some(0));
/// # Ok::<(), kitty_core::CoreError>(())
/// ```
pub struct Deque<'a, T: Pod> {
    /// Node storage.
    allocator: &'a RefCell<Allocator>,
    /// Dummy head, never holds a value.
    head: BlockHandle,
    /// Number of value nodes.
    len: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: Pod> Deque<'a, T> {
    /// Bytes one node needs in an allocator block.
    pub const NODE_SIZE: usize = LINKS + std::mem::size_of::<T>();

    /// Creates an allocator able to hold `max_len` values.
    ///
    /// One extra block is reserved for the dummy head.
    #[must_use]
    pub fn create_allocator(max_len: usize) -> Allocator {
        Allocator::new(max_len + 1, Self::NODE_SIZE)
    }

    /// Creates an empty deque, taking one block for the dummy head.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidConfig`] if the allocator's blocks are too small
    /// for a node, [`CoreError::NoCapacity`] if it has no free block,
    /// [`CoreError::ArenaBusy`] if the allocator is borrowed.
    pub fn new(allocator: &'a RefCell<Allocator>) -> CoreResult<Self> {
        let mut alloc = borrow_arena_mut(allocator, ARENA)?;
        if alloc.item_size() < Self::NODE_SIZE {
            return Err(CoreError::InvalidConfig(format!(
                "deque nodes need {} bytes, allocator blocks hold {}",
                Self::NODE_SIZE,
                alloc.item_size()
            )));
        }

        let head = alloc.allocate()?;
        let index = head.index();
        let block = alloc.block_mut(head)?;
        block[NEXT..PREV].copy_from_slice(bytes_of(&index));
        block[PREV..LINKS].copy_from_slice(bytes_of(&index));

        Ok(Self {
            allocator,
            head,
            len: 0,
            _marker: PhantomData,
        })
    }

    /// Returns the number of values.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the deque holds no value.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the allocator backing this deque.
    #[inline]
    #[must_use]
    pub const fn allocator(&self) -> &'a RefCell<Allocator> {
        self.allocator
    }

    /// Pushes a value to the front.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoCapacity`] when the allocator is exhausted. The deque
    /// is unchanged.
    pub fn push_front(&mut self, value: T) -> CoreResult<()> {
        let head = self.head.index();
        let mut alloc = borrow_arena_mut(self.allocator, ARENA)?;
        let next = read_link(&alloc, head, NEXT)?;
        insert_between(&mut alloc, head, next, value)?;
        self.len += 1;
        Ok(())
    }

    /// Pushes a value to the back.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoCapacity`] when the allocator is exhausted. The deque
    /// is unchanged.
    pub fn push_back(&mut self, value: T) -> CoreResult<()> {
        let head = self.head.index();
        let mut alloc = borrow_arena_mut(self.allocator, ARENA)?;
        let prev = read_link(&alloc, head, PREV)?;
        insert_between(&mut alloc, prev, head, value)?;
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the front value, or `None` if empty.
    pub fn pop_front(&mut self) -> Option<T> {
        self.unlink(NEXT)
    }

    /// Removes and returns the back value, or `None` if empty.
    pub fn pop_back(&mut self) -> Option<T> {
        self.unlink(PREV)
    }

    /// Returns the front value.
    ///
    /// # Errors
    ///
    /// [`CoreError::Empty`] if the deque is empty.
    pub fn front(&self) -> CoreResult<T> {
        self.end(NEXT)
    }

    /// Returns the back value.
    ///
    /// # Errors
    ///
    /// [`CoreError::Empty`] if the deque is empty.
    pub fn back(&self) -> CoreResult<T> {
        self.end(PREV)
    }

    /// Returns the value at `index`, walking from the front.
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexOutOfBounds`] if `index >= len()`.
    pub fn get(&self, index: usize) -> CoreResult<T> {
        let alloc = borrow_arena(self.allocator, ARENA)?;
        let node = self.walk(&alloc, index)?;
        read_value(&alloc, node)
    }

    /// Overwrites the value at `index`.
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexOutOfBounds`] if `index >= len()`.
    pub fn set(&mut self, index: usize, value: T) -> CoreResult<()> {
        let mut alloc = borrow_arena_mut(self.allocator, ARENA)?;
        let node = self.walk(&alloc, index)?;
        write_value(&mut alloc, node, &value)
    }

    /// Removes every value, returning the nodes to the allocator.
    pub fn clear(&mut self) {
        while !self.is_empty() {
            if self.pop_front().is_none() {
                break;
            }
        }
    }

    /// Iterates over the values from front to back.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, 'a, T> {
        let first = borrow_arena(self.allocator, ARENA)
            .and_then(|alloc| read_link(&alloc, self.head.index(), NEXT))
            .ok();
        Iter {
            deque: self,
            cursor: first,
            remaining: self.len,
        }
    }

    fn end(&self, field: usize) -> CoreResult<T> {
        if self.is_empty() {
            return Err(CoreError::Empty);
        }
        let alloc = borrow_arena(self.allocator, ARENA)?;
        let node = read_link(&alloc, self.head.index(), field)?;
        read_value(&alloc, node)
    }

    fn walk(&self, alloc: &Allocator, index: usize) -> CoreResult<u32> {
        if index >= self.len {
            return Err(CoreError::IndexOutOfBounds { index, len: self.len });
        }
        let mut node = read_link(alloc, self.head.index(), NEXT)?;
        for _ in 0..index {
            node = read_link(alloc, node, NEXT)?;
        }
        Ok(node)
    }

    /// Unlinks the node next to the head in direction `field`.
    fn unlink(&mut self, field: usize) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        match self.splice_out(field) {
            Ok(value) => {
                self.len -= 1;
                Some(value)
            }
            Err(err) => {
                tracing::error!(%err, "deque pop failed");
                None
            }
        }
    }

    fn splice_out(&self, field: usize) -> CoreResult<T> {
        let mut alloc = borrow_arena_mut(self.allocator, ARENA)?;
        let victim = read_link(&alloc, self.head.index(), field)?;
        let value = read_value(&alloc, victim)?;
        let next = read_link(&alloc, victim, NEXT)?;
        let prev = read_link(&alloc, victim, PREV)?;
        write_link(&mut alloc, prev, NEXT, next)?;
        write_link(&mut alloc, next, PREV, prev)?;
        let handle = node_handle(&alloc, victim)?;
        alloc.deallocate(handle)?;
        Ok(value)
    }
}

impl<T: Pod> Drop for Deque<'_, T> {
    fn drop(&mut self) {
        self.clear();
        let released = borrow_arena_mut(self.allocator, ARENA)
            .and_then(|mut alloc| alloc.deallocate(self.head));
        if let Err(err) = released {
            tracing::error!(%err, len = self.len, "deque dropped without returning its nodes");
        }
    }
}

impl<T: Pod> fmt::Debug for Deque<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deque")
            .field("head", &self.head.index())
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Front-to-back iterator over a [`Deque`].
#[derive(Debug)]
pub struct Iter<'d, 'a, T: Pod> {
    deque: &'d Deque<'a, T>,
    cursor: Option<u32>,
    remaining: usize,
}

impl<T: Pod> Iterator for Iter<'_, '_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.cursor?;
        let alloc = self.deque.allocator.try_borrow().ok()?;
        let value = read_value(&alloc, node).ok()?;
        self.cursor = read_link(&alloc, node, NEXT).ok();
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'d, 'a, T: Pod> IntoIterator for &'d Deque<'a, T> {
    type Item = T;
    type IntoIter = Iter<'d, 'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn node_handle(alloc: &Allocator, index: u32) -> CoreResult<BlockHandle> {
    alloc
        .handle_at(index)
        .ok_or(CoreError::ForeignHandle { index })
}

fn read_link(alloc: &Allocator, index: u32, field: usize) -> CoreResult<u32> {
    let block = alloc.block(node_handle(alloc, index)?)?;
    Ok(pod_read_unaligned(&block[field..field + 4]))
}

fn write_link(alloc: &mut Allocator, index: u32, field: usize, target: u32) -> CoreResult<()> {
    let handle = node_handle(alloc, index)?;
    alloc.block_mut(handle)?[field..field + 4].copy_from_slice(bytes_of(&target));
    Ok(())
}

fn read_value<T: Pod>(alloc: &Allocator, index: u32) -> CoreResult<T> {
    let block = alloc.block(node_handle(alloc, index)?)?;
    Ok(pod_read_unaligned(&block[LINKS..LINKS + std::mem::size_of::<T>()]))
}

fn write_value<T: Pod>(alloc: &mut Allocator, index: u32, value: &T) -> CoreResult<()> {
    let handle = node_handle(alloc, index)?;
    let bytes = bytes_of(value);
    alloc.block_mut(handle)?[LINKS..LINKS + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Allocates a node holding `value` and splices it between `prev` and `next`.
fn insert_between<T: Pod>(alloc: &mut Allocator, prev: u32, next: u32, value: T) -> CoreResult<()> {
    let node = alloc.allocate()?;
    let index = node.index();
    let block = alloc.block_mut(node)?;
    block[NEXT..PREV].copy_from_slice(bytes_of(&next));
    block[PREV..LINKS].copy_from_slice(bytes_of(&prev));
    write_value(alloc, index, &value)?;
    write_link(alloc, prev, NEXT, index)?;
    write_link(alloc, next, PREV, index)
}
