//! # String Deque
//!
//! A [`Deque`] of [`StrHandle`]s that owns every handle it holds. Pushing a
//! handle transfers it to the deque; popping frees it back to the pool.
//!
//! For every pool, handles owned by containers plus `available()` always
//! equals the pool's capacity.

use std::cell::RefCell;
use std::fmt;

use super::pool::{StrHandle, StringPool};
use crate::error::{borrow_arena, borrow_arena_mut, CoreResult};

const POOL: &str = "string pool";
use crate::memory::{Allocator, Deque, Iter};

/// Sequence of pool strings with ownership-transfer semantics.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use kitty_core::{StringDeque, StringPool};
///
/// let nodes = RefCell::new(StringDeque::create_allocator(4));
/// let pool = RefCell::new(StringPool::new(4, 8));
/// let mut names = StringDeque::new(&nodes, &pool)?;
///
/// let h = pool.borrow_mut().allocate_idx()?;
/// pool.borrow_mut().strcpy(h, "x")?;
/// names.push_back(h)?;
/// assert_eq!(names.position("x"), Some(0));
///
/// names.pop_back();
/// assert_eq!(pool.borrow().available(), 4);
/// # Ok::<(), kitty_core::CoreError>(())
/// ```
pub struct StringDeque<'a> {
    handles: Deque<'a, StrHandle>,
    pool: &'a RefCell<StringPool>,
}

impl<'a> StringDeque<'a> {
    /// Creates an allocator able to hold `max_len` handles.
    #[must_use]
    pub fn create_allocator(max_len: usize) -> Allocator {
        Deque::<StrHandle>::create_allocator(max_len)
    }

    /// Creates an empty string deque.
    ///
    /// # Errors
    ///
    /// Same as [`Deque::new`].
    pub fn new(allocator: &'a RefCell<Allocator>, pool: &'a RefCell<StringPool>) -> CoreResult<Self> {
        Ok(Self {
            handles: Deque::new(allocator)?,
            pool,
        })
    }

    /// Returns the number of strings.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if the deque holds no string.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns the string pool the handles belong to.
    #[inline]
    #[must_use]
    pub const fn pool(&self) -> &'a RefCell<StringPool> {
        self.pool
    }

    /// Takes ownership of `handle` and appends it.
    ///
    /// # Errors
    ///
    /// - [`crate::CoreError::InvalidHandle`] if `handle` is not allocated in
    ///   this deque's pool
    /// - [`crate::CoreError::AlreadyOwned`] if another container owns it
    /// - [`crate::CoreError::NoCapacity`] if the node allocator is full
    /// - [`crate::CoreError::ArenaBusy`] if the caller holds a borrow of
    ///   either arena
    ///
    /// On error the caller keeps `handle`.
    pub fn push_back(&mut self, handle: StrHandle) -> CoreResult<()> {
        self.adopt(handle, |handles| handles.push_back(handle))
    }

    /// Takes ownership of `handle` and prepends it.
    ///
    /// # Errors
    ///
    /// Same as [`StringDeque::push_back`].
    pub fn push_front(&mut self, handle: StrHandle) -> CoreResult<()> {
        self.adopt(handle, |handles| handles.push_front(handle))
    }

    /// Allocates a slot holding `text` and appends it.
    ///
    /// Nothing leaks if the pool or the node allocator is full.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::NoCapacity`] or [`crate::CoreError::ArenaBusy`]
    /// from either arena.
    pub fn push_str(&mut self, text: &str) -> CoreResult<StrHandle> {
        let handle = {
            let mut pool = borrow_arena_mut(self.pool, POOL)?;
            let handle = pool.allocate_idx()?;
            pool.strcpy(handle, text)?;
            handle
        };
        if let Err(err) = self.push_back(handle) {
            if let Ok(mut pool) = borrow_arena_mut(self.pool, POOL) {
                pool.deallocate_idx(handle);
            }
            return Err(err);
        }
        Ok(handle)
    }

    /// Removes the last handle and frees it in the pool.
    ///
    /// The returned handle is no longer allocated. Returns `None` if the
    /// deque is empty or an arena is borrowed.
    pub fn pop_back(&mut self) -> Option<StrHandle> {
        self.pop_with(|handles| handles.pop_back())
    }

    /// Removes the first handle and frees it in the pool.
    ///
    /// The returned handle is no longer allocated. Returns `None` if the
    /// deque is empty or an arena is borrowed.
    pub fn pop_front(&mut self) -> Option<StrHandle> {
        self.pop_with(|handles| handles.pop_front())
    }

    /// Returns the first handle.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::Empty`] if the deque is empty.
    pub fn front(&self) -> CoreResult<StrHandle> {
        self.handles.front()
    }

    /// Returns the last handle.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::Empty`] if the deque is empty.
    pub fn back(&self) -> CoreResult<StrHandle> {
        self.handles.back()
    }

    /// Returns the handle at `index`.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::IndexOutOfBounds`] if `index >= len()`.
    pub fn get(&self, index: usize) -> CoreResult<StrHandle> {
        self.handles.get(index)
    }

    /// Returns a copy of the string at `index`.
    ///
    /// # Errors
    ///
    /// [`crate::CoreError::IndexOutOfBounds`] if `index >= len()`.
    pub fn text(&self, index: usize) -> CoreResult<String> {
        let handle = self.handles.get(index)?;
        borrow_arena(self.pool, POOL)?.c_str(handle).map(str::to_owned)
    }

    /// Returns the position of the first string equal to `text`.
    ///
    /// Returns `None` if the pool is mutably borrowed.
    #[must_use]
    pub fn position(&self, text: &str) -> Option<usize> {
        let pool = borrow_arena(self.pool, POOL).ok()?;
        self.handles
            .iter()
            .position(|handle| pool.c_str(handle).is_ok_and(|s| s == text))
    }

    /// Iterates over the handles from front to back.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, 'a, StrHandle> {
        self.handles.iter()
    }

    /// Pops every handle, freeing all of them.
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    fn adopt(
        &mut self,
        handle: StrHandle,
        push: impl FnOnce(&mut Deque<'a, StrHandle>) -> CoreResult<()>,
    ) -> CoreResult<()> {
        borrow_arena_mut(self.pool, POOL)?.claim(handle)?;
        if let Err(err) = push(&mut self.handles) {
            if let Ok(mut pool) = borrow_arena_mut(self.pool, POOL) {
                pool.unclaim(handle);
            }
            return Err(err);
        }
        Ok(())
    }

    fn pop_with(
        &mut self,
        pop: impl FnOnce(&mut Deque<'a, StrHandle>) -> Option<StrHandle>,
    ) -> Option<StrHandle> {
        let mut pool = match borrow_arena_mut(self.pool, POOL) {
            Ok(pool) => pool,
            Err(err) => {
                tracing::error!(%err, len = self.len(), "string deque pop refused");
                return None;
            }
        };
        let handle = pop(&mut self.handles)?;
        pool.release(handle);
        Some(handle)
    }
}

impl Drop for StringDeque<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for StringDeque<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(pool) = borrow_arena(self.pool, POOL) else {
            return f.debug_struct("StringDeque").field("len", &self.len()).finish_non_exhaustive();
        };
        f.debug_list()
            .entries(self.handles.iter().map(|h| pool.c_str(h).unwrap_or("<freed>")))
            .finish()
    }
}

impl From<StringDeque<'_>> for Vec<String> {
    fn from(deque: StringDeque<'_>) -> Self {
        let mut texts = Vec::with_capacity(deque.len());
        match borrow_arena(deque.pool, POOL) {
            Ok(pool) => {
                for handle in &deque.handles {
                    texts.push(pool.c_str(handle).map(str::to_owned).unwrap_or_default());
                }
            }
            Err(err) => tracing::error!(%err, "string deque contents unreadable"),
        }
        texts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn arenas(n: usize) -> (RefCell<Allocator>, RefCell<StringPool>) {
        (
            RefCell::new(StringDeque::create_allocator(n)),
            RefCell::new(StringPool::new(n, 20)),
        )
    }

    #[test]
    fn test_fill_and_drain() {
        let (nodes, pool) = arenas(10);
        let mut strings = StringDeque::new(&nodes, &pool).unwrap();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let h = pool.borrow_mut().allocate_idx().unwrap();
            strings.push_back(h).unwrap();
            handles.push(h);
        }
        assert_eq!(strings.len(), 10);
        assert_eq!(pool.borrow().available(), 0);
        assert!(pool.borrow_mut().allocate_idx().is_err());

        for (i, h) in handles.into_iter().enumerate() {
            pool.borrow_mut().strcpy(h, &i.to_string()).unwrap();
        }
        for i in 0..10 {
            assert_eq!(strings.text(i).unwrap(), i.to_string());
        }

        for _ in 0..10 {
            assert!(strings.pop_back().is_some());
        }
        assert_eq!(strings.len(), 0);
        assert_eq!(pool.borrow().available(), 10);
    }

    #[test]
    fn test_popped_handle_is_freed() {
        let (nodes, pool) = arenas(2);
        let mut strings = StringDeque::new(&nodes, &pool).unwrap();
        let h = strings.push_str("gone").unwrap();

        assert_eq!(strings.pop_front(), Some(h));
        assert!(pool.borrow().c_str(h).is_err());
        assert!(pool.borrow_mut().strcpy(h, "x").is_err());
        assert_eq!(strings.pop_front(), None);
    }

    #[test]
    fn test_double_push_is_rejected() {
        let (nodes, pool) = arenas(4);
        let mut strings = StringDeque::new(&nodes, &pool).unwrap();
        let h = pool.borrow_mut().allocate_idx().unwrap();
        strings.push_back(h).unwrap();

        assert_eq!(strings.push_back(h), Err(CoreError::AlreadyOwned(h.index())));
        assert_eq!(strings.len(), 1);

        let (other_nodes, _) = arenas(4);
        let mut other = StringDeque::new(&other_nodes, &pool).unwrap();
        assert_eq!(other.push_front(h), Err(CoreError::AlreadyOwned(h.index())));
    }

    #[test]
    fn test_unallocated_handle_is_rejected() {
        let (nodes, pool) = arenas(4);
        let mut strings = StringDeque::new(&nodes, &pool).unwrap();
        let freed = pool.borrow_mut().allocate_idx().unwrap();
        pool.borrow_mut().deallocate_idx(freed);

        assert_eq!(strings.push_back(StrHandle::NONE), Err(CoreError::InvalidHandle(u16::MAX)));
        assert_eq!(strings.push_back(freed), Err(CoreError::InvalidHandle(freed.index())));
        assert!(strings.is_empty());
    }

    #[test]
    fn test_handle_from_other_pool_is_rejected() {
        let (nodes, pool) = arenas(2);
        let other = RefCell::new(StringPool::new(2, 20));
        let mut strings = StringDeque::new(&nodes, &pool).unwrap();

        let mine = pool.borrow_mut().allocate_idx().unwrap();
        pool.borrow_mut().strcpy(mine, "mine").unwrap();
        let from_other = other.borrow_mut().allocate_idx().unwrap();
        assert_eq!(mine.index(), from_other.index());

        assert_eq!(
            strings.push_back(from_other),
            Err(CoreError::InvalidHandle(from_other.index()))
        );
        assert_eq!(strings.pop_back(), None);
        assert_eq!(pool.borrow().c_str(mine).unwrap(), "mine");
        assert!(!pool.borrow().is_owned(mine));
    }

    #[test]
    fn test_held_pool_borrow_is_an_error_not_a_panic() {
        let (nodes, pool) = arenas(2);
        let mut strings = StringDeque::new(&nodes, &pool).unwrap();
        strings.push_str("kept").unwrap();

        {
            let _peek = pool.borrow();
            assert_eq!(strings.push_str("x"), Err(CoreError::ArenaBusy("string pool")));
            assert_eq!(strings.pop_front(), None);
            assert_eq!(strings.position("kept"), Some(0));
        }
        {
            let _hold = pool.borrow_mut();
            assert_eq!(strings.text(0), Err(CoreError::ArenaBusy("string pool")));
            assert_eq!(strings.position("kept"), None);
            assert_eq!(format!("{strings:?}"), "StringDeque { len: 1, .. }");
        }

        assert_eq!(strings.len(), 1);
        assert_eq!(strings.text(0).unwrap(), "kept");
    }

    #[test]
    fn test_full_deque_returns_handle_to_caller() {
        let nodes = RefCell::new(StringDeque::create_allocator(1));
        let pool = RefCell::new(StringPool::new(4, 8));
        let mut strings = StringDeque::new(&nodes, &pool).unwrap();
        strings.push_str("a").unwrap();

        let h = pool.borrow_mut().allocate_idx().unwrap();
        assert!(strings.push_back(h).unwrap_err().is_capacity());
        assert!(!pool.borrow().is_owned(h));
        assert!(pool.borrow_mut().deallocate_idx(h));

        assert!(strings.push_str("b").unwrap_err().is_capacity());
        assert_eq!(pool.borrow().available(), 3);
    }

    #[test]
    fn test_position_and_front_back() {
        let (nodes, pool) = arenas(4);
        let mut vars = StringDeque::new(&nodes, &pool).unwrap();
        vars.push_str("x").unwrap();
        vars.push_str("y").unwrap();
        let z = pool.borrow_mut().allocate_idx().unwrap();
        pool.borrow_mut().strcpy(z, "z").unwrap();
        vars.push_front(z).unwrap();

        assert_eq!(vars.front().unwrap(), z);
        assert_eq!(vars.position("y"), Some(2));
        assert_eq!(vars.position("w"), None);
        assert_eq!(format!("{vars:?}"), r#"["z", "x", "y"]"#);
        assert_eq!(Vec::<String>::from(vars), vec!["z", "x", "y"]);
        assert_eq!(pool.borrow().available(), 4);
    }

    #[test]
    fn test_drop_frees_everything() {
        let (nodes, pool) = arenas(3);
        {
            let mut strings = StringDeque::new(&nodes, &pool).unwrap();
            strings.push_str("a").unwrap();
            strings.push_str("b").unwrap();
            assert_eq!(pool.borrow().owned(), 2);
        }
        assert_eq!(pool.borrow().available(), 3);
        assert_eq!(nodes.borrow().live(), 0);
    }
}
