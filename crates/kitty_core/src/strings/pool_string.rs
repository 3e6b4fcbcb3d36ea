//! # Pool String
//!
//! A string that owns exactly one slot of a [`StringPool`] from construction
//! to drop. Assignment and append truncate silently to the pool's slot length.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::ops::AddAssign;

use super::pool::{StrHandle, StringPool};
use crate::error::{borrow_arena, borrow_arena_mut, CoreResult};

const POOL: &str = "string pool";

/// A fixed-capacity string backed by a borrowed [`StringPool`].
///
/// Methods that cannot return an error (assignment, comparison, display)
/// log a failed pool access and fall back to the empty string.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use kitty_core::{PoolString, StringPool};
///
/// let pool = RefCell::new(StringPool::new(2, 10));
/// let mut name = PoolString::new(&pool)?;
/// name += "12345";
/// name += "67890xyz";
/// assert!(name == "1234567890");
/// # Ok::<(), kitty_core::CoreError>(())
/// ```
pub struct PoolString<'a> {
    pool: &'a RefCell<StringPool>,
    handle: StrHandle,
}

impl<'a> PoolString<'a> {
    /// Creates an empty string, taking one slot of `pool`.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::NoCapacity`] if the pool is full,
    /// [`crate::CoreError::ArenaBusy`] if it is borrowed.
    pub fn new(pool: &'a RefCell<StringPool>) -> CoreResult<Self> {
        let mut strings = borrow_arena_mut(pool, POOL)?;
        let handle = strings.allocate_idx()?;
        if let Err(err) = strings.claim(handle) {
            strings.deallocate_idx(handle);
            return Err(err);
        }
        Ok(Self { pool, handle })
    }

    /// Creates a string holding (a truncated copy of) `text`.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::NoCapacity`] if the pool is full.
    pub fn from_str_in(pool: &'a RefCell<StringPool>, text: &str) -> CoreResult<Self> {
        let mut string = Self::new(pool)?;
        string.assign(text);
        Ok(string)
    }

    /// Returns the owned slot.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> StrHandle {
        self.handle
    }

    /// Returns the pool this string lives in.
    #[inline]
    #[must_use]
    pub const fn pool(&self) -> &'a RefCell<StringPool> {
        self.pool
    }

    /// Returns the maximum length in bytes.
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.report(borrow_arena(self.pool, POOL).map(|pool| pool.max_str_len()))
            .unwrap_or(0)
    }

    /// Returns the current length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.report(borrow_arena(self.pool, POOL).and_then(|pool| pool.str_len(self.handle)))
            .unwrap_or(0)
    }

    /// Returns `true` if the string is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the content with `text`, truncating silently.
    pub fn assign(&mut self, text: &str) {
        let written = borrow_arena_mut(self.pool, POOL)
            .and_then(|mut pool| pool.strcpy(self.handle, text));
        self.report(written);
    }

    /// Copies the content of `other` into this string.
    ///
    /// Only content is copied; both strings keep their own slots.
    pub fn assign_from(&mut self, other: &PoolString<'_>) {
        if std::ptr::eq(self.pool, other.pool) {
            let written = borrow_arena_mut(self.pool, POOL)
                .and_then(|mut pool| pool.strcpy_from(self.handle, other.handle));
            self.report(written);
        } else {
            let text = other.to_string();
            self.assign(&text);
        }
    }

    /// Appends `text`, truncating the result silently.
    pub fn strcat(&mut self, text: &str) {
        let written = borrow_arena_mut(self.pool, POOL)
            .and_then(|mut pool| pool.strcat(self.handle, text));
        self.report(written);
    }

    /// Compares the content byte-wise against `text`.
    #[must_use]
    pub fn strcmp(&self, text: &str) -> Ordering {
        self.with_str(|s| s.as_bytes().cmp(text.as_bytes()))
    }

    /// Calls `f` with the current content.
    pub fn with_str<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let pool = self.report(borrow_arena(self.pool, POOL));
        let text = pool
            .as_deref()
            .and_then(|pool| self.report(pool.c_str(self.handle)))
            .unwrap_or_default();
        f(text)
    }

    /// Creates a second string with the same content in its own slot.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::NoCapacity`] if the pool is full.
    pub fn try_clone(&self) -> CoreResult<Self> {
        let mut copy = Self::new(self.pool)?;
        copy.assign_from(self);
        Ok(copy)
    }

    fn report<T>(&self, result: CoreResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(%err, handle = %self.handle, "pool string access failed");
                None
            }
        }
    }
}

impl Drop for PoolString<'_> {
    fn drop(&mut self) {
        match borrow_arena_mut(self.pool, POOL) {
            Ok(mut pool) => {
                pool.release(self.handle);
            }
            Err(err) => {
                tracing::error!(%err, handle = %self.handle, "pool string dropped without releasing its slot");
            }
        }
    }
}

impl AddAssign<&str> for PoolString<'_> {
    fn add_assign(&mut self, text: &str) {
        self.strcat(text);
    }
}

impl PartialEq<str> for PoolString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.strcmp(other) == Ordering::Equal
    }
}

impl PartialEq<&str> for PoolString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.strcmp(other) == Ordering::Equal
    }
}

impl PartialEq for PoolString<'_> {
    fn eq(&self, other: &Self) -> bool {
        other.with_str(|text| self.strcmp(text) == Ordering::Equal)
    }
}

impl fmt::Display for PoolString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| f.write_str(s))
    }
}

impl fmt::Debug for PoolString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| {
            f.debug_struct("PoolString")
                .field("handle", &self.handle)
                .field("text", &s)
                .finish()
        })
    }
}
