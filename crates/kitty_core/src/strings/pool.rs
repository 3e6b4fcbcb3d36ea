//! # String Pool
//!
//! A fixed arena of equally long, NUL-terminated string slots addressed by
//! [`StrHandle`]. Writes truncate silently; nothing ever grows.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{self, AtomicU16};

use bytemuck::{Pod, Zeroable};

use crate::diag::DiagnosticSink;
use crate::error::{CoreError, CoreResult};

/// Pool identities start at 1; id 0 is never bound to a pool.
static NEXT_POOL_ID: AtomicU16 = AtomicU16::new(1);

fn next_pool_id() -> u16 {
    loop {
        // Wraps after 65535 pools.
        let id = NEXT_POOL_ID.fetch_add(1, atomic::Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

/// Handle to a slot of a [`StringPool`].
///
/// Only the pool itself mints handles. A handle carries the identity of its
/// pool, so every other pool rejects it. [`StrHandle::NONE`] (and the
/// all-zero value) name no slot at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct StrHandle {
    pool: u16,
    index: u16,
}

impl StrHandle {
    /// Sentinel for "no slot".
    pub const NONE: Self = Self {
        pool: 0,
        index: u16::MAX,
    };

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u16 {
        self.index
    }

    /// Checks if this is the sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.index == u16::MAX
    }
}

impl Default for StrHandle {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for StrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// Fixed-capacity pool of fixed-length strings.
///
/// Each slot holds up to [`StringPool::max_str_len`] bytes plus a
/// terminator. A slot is either free, allocated, or allocated and owned by a
/// container ([`crate::PoolString`], [`crate::StringDeque`]); owned slots can
/// only be released by their owner.
///
/// # Example
///
/// ```rust
/// use kitty_core::StringPool;
///
/// let mut pool = StringPool::new(2, 5);
/// let h = pool.allocate_idx()?;
/// pool.strcpy(h, "kitty cat")?;
/// assert_eq!(pool.c_str(h)?, "kitty");
/// assert!(pool.deallocate_idx(h));
/// assert!(!pool.deallocate_idx(h));
/// # Ok::<(), kitty_core::CoreError>(())
/// ```
pub struct StringPool {
    /// Identity stamped into every handle.
    id: u16,
    /// `capacity * slot_len` bytes.
    slots: Box<[u8]>,
    /// Bytes per slot, terminator included.
    slot_len: usize,
    /// Number of slots.
    capacity: usize,
    /// Allocated flag per slot.
    in_use: Box<[bool]>,
    /// Owned-by-container flag per slot.
    claimed: Box<[bool]>,
    /// Allocated slots.
    live: usize,
    /// Highest `live` ever observed.
    high_water: usize,
}

impl StringPool {
    /// Creates a pool of `slots` strings of at most `max_str_len` bytes.
    ///
    /// # Panics
    ///
    /// Construction failure is fatal: panics if `slots` or `max_str_len` is
    /// zero, or if `slots` reaches the [`StrHandle::NONE`] sentinel.
    #[must_use]
    pub fn new(slots: usize, max_str_len: usize) -> Self {
        assert!(slots > 0, "Slot count must be greater than zero");
        assert!(max_str_len > 0, "String length must be greater than zero");
        assert!(
            slots < usize::from(u16::MAX),
            "Slot count {slots} collides with the none handle"
        );
        let slot_len = max_str_len + 1;
        let Some(bytes) = slots.checked_mul(slot_len) else {
            panic!("String pool of {slots} x {slot_len} bytes overflows the address space");
        };

        let id = next_pool_id();
        tracing::debug!(id, slots, max_str_len, "string pool reserved");

        Self {
            id,
            slots: vec![0u8; bytes].into_boxed_slice(),
            slot_len,
            capacity: slots,
            in_use: vec![false; slots].into_boxed_slice(),
            claimed: vec![false; slots].into_boxed_slice(),
            live: 0,
            high_water: 0,
        }
    }

    /// Returns the usable length of a slot (terminator excluded).
    #[inline]
    #[must_use]
    pub const fn max_str_len(&self) -> usize {
        self.slot_len - 1
    }

    /// Returns the number of slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub const fn available(&self) -> usize {
        self.capacity - self.live
    }

    /// Returns the number of slots currently owned by containers.
    #[must_use]
    pub fn owned(&self) -> usize {
        self.claimed.iter().filter(|c| **c).count()
    }

    /// Returns the highest number of simultaneously allocated slots.
    #[inline]
    #[must_use]
    pub const fn high_water(&self) -> usize {
        self.high_water
    }

    /// Returns `true` if `handle` names an allocated slot.
    #[must_use]
    pub fn in_use(&self, handle: StrHandle) -> bool {
        self.slot(handle).is_ok()
    }

    /// Returns `true` if `handle` is owned by a container.
    #[must_use]
    pub fn is_owned(&self, handle: StrHandle) -> bool {
        self.slot(handle).is_ok_and(|slot| self.claimed[slot])
    }

    /// Allocates the lowest free slot, holding the empty string.
    ///
    /// # Errors
    ///
    /// [`CoreError::NoCapacity`] when every slot is taken.
    pub fn allocate_idx(&mut self) -> CoreResult<StrHandle> {
        let Some(slot) = self.in_use.iter().position(|used| !used) else {
            tracing::warn!(capacity = self.capacity, "string pool has no free slot");
            return Err(CoreError::NoCapacity {
                arena: "string pool",
                capacity: self.capacity,
            });
        };

        self.in_use[slot] = true;
        let start = slot * self.slot_len;
        self.slots[start] = 0;
        self.live += 1;
        if self.live > self.high_water {
            self.high_water = self.live;
            tracing::trace!(high_water = self.high_water, "string pool reached new high-water mark");
        }

        // `slot < capacity < u16::MAX` by construction.
        Ok(StrHandle {
            pool: self.id,
            index: u16::try_from(slot).unwrap_or(u16::MAX),
        })
    }

    /// Frees a slot.
    ///
    /// Returns `false`, changing nothing, if `handle` belongs to another
    /// pool, is the sentinel, is already free, or is owned by a container.
    pub fn deallocate_idx(&mut self, handle: StrHandle) -> bool {
        let Ok(slot) = self.slot(handle) else {
            tracing::warn!(%handle, "string handle to deallocate is not allocated");
            return false;
        };
        if self.claimed[slot] {
            tracing::warn!(%handle, "string handle is owned by a container");
            return false;
        }
        self.free(slot);
        true
    }

    /// Overwrites a slot, truncating to [`StringPool::max_str_len`] bytes.
    ///
    /// Truncation never splits a UTF-8 character and stops at an embedded
    /// NUL. Returns the number of bytes stored.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidHandle`] if the slot is not allocated.
    pub fn strcpy(&mut self, handle: StrHandle, text: &str) -> CoreResult<usize> {
        let slot = self.slot(handle)?;
        let start = slot * self.slot_len;
        let text = fit(text, self.max_str_len());
        self.slots[start..start + text.len()].copy_from_slice(text.as_bytes());
        self.slots[start + text.len()] = 0;
        Ok(text.len())
    }

    /// Appends to a slot, truncating the result to
    /// [`StringPool::max_str_len`] bytes. Returns the new length.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidHandle`] if the slot is not allocated.
    pub fn strcat(&mut self, handle: StrHandle, text: &str) -> CoreResult<usize> {
        let slot = self.slot(handle)?;
        let start = slot * self.slot_len;
        let current = self.content_len(slot);
        let text = fit(text, self.max_str_len() - current);
        let at = start + current;
        self.slots[at..at + text.len()].copy_from_slice(text.as_bytes());
        self.slots[at + text.len()] = 0;
        Ok(current + text.len())
    }

    /// Copies the content of `src` into `dst`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidHandle`] if either slot is not allocated.
    pub fn strcpy_from(&mut self, dst: StrHandle, src: StrHandle) -> CoreResult<usize> {
        let dst_slot = self.slot(dst)?;
        let src_slot = self.slot(src)?;
        let len = self.content_len(src_slot);
        let from = src_slot * self.slot_len;
        let to = dst_slot * self.slot_len;
        self.slots.copy_within(from..=from + len, to);
        Ok(len)
    }

    /// Returns the current content of a slot.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidHandle`] if the slot is not allocated.
    pub fn c_str(&self, handle: StrHandle) -> CoreResult<&str> {
        let slot = self.slot(handle)?;
        let start = slot * self.slot_len;
        let bytes = &self.slots[start..start + self.content_len(slot)];
        std::str::from_utf8(bytes).map_err(|_| CoreError::InvalidUtf8(handle.index))
    }

    /// Returns the content length of a slot in bytes.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidHandle`] if the slot is not allocated.
    pub fn str_len(&self, handle: StrHandle) -> CoreResult<usize> {
        self.slot(handle).map(|slot| self.content_len(slot))
    }

    /// Compares a slot byte-wise against `text`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidHandle`] if the slot is not allocated.
    pub fn strcmp(&self, handle: StrHandle, text: &str) -> CoreResult<Ordering> {
        Ok(self.c_str(handle)?.as_bytes().cmp(text.as_bytes()))
    }

    /// Writes usage counters.
    pub fn stat(&self, sink: &mut dyn DiagnosticSink) {
        sink.line(&format!(
            "StringPool: num taken = {}, max num taken = {}, available = {}",
            self.live,
            self.high_water,
            self.available()
        ));
    }

    /// Marks an allocated slot as owned by a container.
    pub(crate) fn claim(&mut self, handle: StrHandle) -> CoreResult<()> {
        let slot = self.slot(handle)?;
        if self.claimed[slot] {
            return Err(CoreError::AlreadyOwned(handle.index));
        }
        self.claimed[slot] = true;
        Ok(())
    }

    /// Gives a claimed slot back to its previous holder without freeing it.
    pub(crate) fn unclaim(&mut self, handle: StrHandle) {
        if let Ok(slot) = self.slot(handle) {
            self.claimed[slot] = false;
        }
    }

    /// Frees a slot on behalf of its owning container.
    pub(crate) fn release(&mut self, handle: StrHandle) -> bool {
        let Ok(slot) = self.slot(handle) else {
            tracing::warn!(%handle, "container released a string handle that is not allocated");
            return false;
        };
        self.free(slot);
        true
    }

    fn free(&mut self, slot: usize) {
        self.in_use[slot] = false;
        self.claimed[slot] = false;
        self.live -= 1;
    }

    fn slot(&self, handle: StrHandle) -> CoreResult<usize> {
        let slot = usize::from(handle.index);
        if handle.pool != self.id || slot >= self.capacity || !self.in_use[slot] {
            return Err(CoreError::InvalidHandle(handle.index));
        }
        Ok(slot)
    }

    fn content_len(&self, slot: usize) -> usize {
        let start = slot * self.slot_len;
        self.slots[start..start + self.slot_len]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.slot_len - 1)
    }
}

impl fmt::Debug for StringPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringPool")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("max_str_len", &self.max_str_len())
            .field("live", &self.live)
            .field("high_water", &self.high_water)
            .finish_non_exhaustive()
    }
}

/// Longest prefix of `text` that fits `max` bytes, ends on a character
/// boundary and contains no NUL.
fn fit(text: &str, max: usize) -> &str {
    let text = text.find('\0').map_or(text, |nul| &text[..nul]);
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_full() {
        let mut pool = StringPool::new(100, 20);
        assert_eq!(pool.max_str_len(), 20);

        let handles: Vec<StrHandle> = (0..100).map(|_| pool.allocate_idx().unwrap()).collect();
        assert_eq!(handles[0].index(), 0);
        assert_eq!(handles[99].index(), 99);
        assert!(pool.allocate_idx().unwrap_err().is_capacity());
        assert_eq!(pool.available(), 0);

        for h in handles {
            assert!(pool.deallocate_idx(h));
            assert!(!pool.deallocate_idx(h));
        }
        assert!(!pool.deallocate_idx(StrHandle::NONE));
        assert_eq!(pool.available(), 100);
    }

    #[test]
    fn test_lowest_free_slot_is_reused() {
        let mut pool = StringPool::new(3, 4);
        let a = pool.allocate_idx().unwrap();
        let _b = pool.allocate_idx().unwrap();
        assert!(pool.deallocate_idx(a));
        assert_eq!(pool.allocate_idx().unwrap(), a);
    }

    #[test]
    fn test_out_of_range_handle() {
        let mut pool = StringPool::new(2, 4);
        let past_end = StrHandle {
            pool: pool.id,
            index: 7,
        };
        assert!(!pool.deallocate_idx(past_end));
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.c_str(past_end), Err(CoreError::InvalidHandle(7)));
        assert!(pool.c_str(StrHandle::zeroed()).is_err());
    }

    #[test]
    fn test_handle_from_other_pool_is_rejected() {
        let mut a = StringPool::new(2, 8);
        let mut b = StringPool::new(2, 8);
        let from_a = a.allocate_idx().unwrap();
        let mine = b.allocate_idx().unwrap();
        b.strcpy(mine, "mine").unwrap();
        assert_eq!(from_a.index(), mine.index());

        assert_eq!(b.c_str(from_a), Err(CoreError::InvalidHandle(0)));
        assert!(b.strcpy(from_a, "theirs").is_err());
        assert_eq!(b.claim(from_a), Err(CoreError::InvalidHandle(0)));
        assert!(!b.deallocate_idx(from_a));
        assert_eq!(b.c_str(mine).unwrap(), "mine");
        assert_eq!(b.available(), 1);
    }

    #[test]
    fn test_strcpy_truncates() {
        let mut pool = StringPool::new(1, 10);
        let h = pool.allocate_idx().unwrap();
        assert_eq!(pool.strcpy(h, "12345678901234567890").unwrap(), 10);
        assert_eq!(pool.c_str(h).unwrap(), "1234567890");

        assert_eq!(pool.strcpy(h, "abc").unwrap(), 3);
        assert_eq!(pool.c_str(h).unwrap(), "abc");
    }

    #[test]
    fn test_truncation_keeps_utf8_whole() {
        let mut pool = StringPool::new(1, 4);
        let h = pool.allocate_idx().unwrap();
        pool.strcpy(h, "abcé").unwrap();
        assert_eq!(pool.c_str(h).unwrap(), "abc");
    }

    #[test]
    fn test_strcat_truncates() {
        let mut pool = StringPool::new(1, 10);
        let h = pool.allocate_idx().unwrap();
        pool.strcat(h, "12345").unwrap();
        assert_eq!(pool.strcat(h, "67890abc").unwrap(), 10);
        assert_eq!(pool.c_str(h).unwrap(), "1234567890");
    }

    #[test]
    fn test_freed_handle_is_rejected() {
        let mut pool = StringPool::new(2, 8);
        let h = pool.allocate_idx().unwrap();
        pool.strcpy(h, "x").unwrap();
        assert!(pool.deallocate_idx(h));

        assert_eq!(pool.c_str(h), Err(CoreError::InvalidHandle(0)));
        assert!(pool.strcpy(h, "y").is_err());
        assert!(pool.strcmp(h, "x").is_err());
    }

    #[test]
    fn test_fresh_slot_is_empty() {
        let mut pool = StringPool::new(1, 8);
        let h = pool.allocate_idx().unwrap();
        pool.strcpy(h, "stale").unwrap();
        pool.deallocate_idx(h);

        let h = pool.allocate_idx().unwrap();
        assert_eq!(pool.c_str(h).unwrap(), "");
    }

    #[test]
    fn test_strcmp_orders_bytes() {
        let mut pool = StringPool::new(1, 8);
        let h = pool.allocate_idx().unwrap();
        pool.strcpy(h, "bob").unwrap();
        assert_eq!(pool.strcmp(h, "bob").unwrap(), Ordering::Equal);
        assert_eq!(pool.strcmp(h, "alice").unwrap(), Ordering::Greater);
        assert_eq!(pool.strcmp(h, "bobby").unwrap(), Ordering::Less);
    }

    #[test]
    fn test_claimed_slot_cannot_be_freed_directly() {
        let mut pool = StringPool::new(2, 8);
        let h = pool.allocate_idx().unwrap();
        pool.claim(h).unwrap();
        assert_eq!(pool.claim(h), Err(CoreError::AlreadyOwned(0)));

        assert!(!pool.deallocate_idx(h));
        assert_eq!(pool.available(), 1);

        assert!(pool.release(h));
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.owned(), 0);
    }

    #[test]
    fn test_strcpy_from() {
        let mut pool = StringPool::new(2, 8);
        let a = pool.allocate_idx().unwrap();
        let b = pool.allocate_idx().unwrap();
        pool.strcpy(a, "hello").unwrap();
        pool.strcpy(b, "longer!").unwrap();
        assert_eq!(pool.strcpy_from(b, a).unwrap(), 5);
        assert_eq!(pool.c_str(b).unwrap(), "hello");
    }

    #[test]
    fn test_stat() {
        let mut pool = StringPool::new(4, 8);
        let _ = pool.allocate_idx().unwrap();
        let mut lines: Vec<String> = Vec::new();
        pool.stat(&mut lines);
        assert_eq!(
            lines,
            vec!["StringPool: num taken = 1, max num taken = 1, available = 3"]
        );
    }
}
