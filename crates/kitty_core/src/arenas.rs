//! # Arenas
//!
//! Owner of the shared node allocator and string pool. Every container
//! borrows from an [`Arenas`] value, so the borrow checker guarantees the
//! arenas outlive all of them.

use std::cell::RefCell;

use bytemuck::Pod;

use crate::config::CoreConfig;
use crate::diag::DiagnosticSink;
use crate::error::CoreResult;
use crate::memory::{Allocator, Deque};
use crate::strings::{PoolString, StringDeque, StringPool};

/// Node block size used when the configuration does not set one.
///
/// Large enough for any deque of values up to eight bytes, so deques of
/// integers and deques of string handles share one allocator.
pub const DEFAULT_NODE_SIZE: usize = Deque::<u64>::NODE_SIZE;

/// The runtime's arenas, built once at startup.
///
/// # Example
///
/// ```rust
/// use kitty_core::{Arenas, CoreConfig};
///
/// let arenas = Arenas::from_config(&CoreConfig::default());
/// let mut values = arenas.deque::<i32>()?;
/// let mut names = arenas.string_deque()?;
///
/// values.push_back(42)?;
/// names.push_str("answer")?;
/// assert_eq!(names.position("answer"), Some(0));
/// # Ok::<(), kitty_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct Arenas {
    nodes: RefCell<Allocator>,
    strings: RefCell<StringPool>,
}

impl Arenas {
    /// Reserves every arena described by `config`.
    ///
    /// # Panics
    ///
    /// Construction failure is fatal; call [`CoreConfig::validate`] first
    /// for a recoverable check.
    #[must_use]
    pub fn from_config(config: &CoreConfig) -> Self {
        let blocks = config.nodes.max_len + config.nodes.max_deques;
        let item_size = config.nodes.item_size.unwrap_or(DEFAULT_NODE_SIZE);
        tracing::debug!(
            blocks,
            item_size,
            slots = config.strings.slots,
            max_str_len = config.strings.max_str_len,
            "reserving arenas"
        );
        Self {
            nodes: RefCell::new(Allocator::new(blocks, item_size)),
            strings: RefCell::new(StringPool::new(
                config.strings.slots,
                config.strings.max_str_len,
            )),
        }
    }

    /// Returns the shared node allocator.
    #[inline]
    #[must_use]
    pub const fn allocator(&self) -> &RefCell<Allocator> {
        &self.nodes
    }

    /// Returns the string pool.
    #[inline]
    #[must_use]
    pub const fn strings(&self) -> &RefCell<StringPool> {
        &self.strings
    }

    /// Creates a deque on the shared node allocator.
    ///
    /// # Errors
    ///
    /// Same as [`Deque::new`].
    pub fn deque<T: Pod>(&self) -> CoreResult<Deque<'_, T>> {
        Deque::new(&self.nodes)
    }

    /// Creates a string deque on the shared arenas.
    ///
    /// # Errors
    ///
    /// Same as [`StringDeque::new`].
    pub fn string_deque(&self) -> CoreResult<StringDeque<'_>> {
        StringDeque::new(&self.nodes, &self.strings)
    }

    /// Creates an empty pool string.
    ///
    /// # Errors
    ///
    /// Same as [`PoolString::new`].
    pub fn pool_string(&self) -> CoreResult<PoolString<'_>> {
        PoolString::new(&self.strings)
    }

    /// Writes usage counters of both arenas.
    ///
    /// An arena that is mutably borrowed reports itself as busy.
    pub fn stat(&self, sink: &mut dyn DiagnosticSink) {
        match self.nodes.try_borrow() {
            Ok(nodes) => nodes.stat(sink),
            Err(_) => sink.line("Allocator: busy"),
        }
        match self.strings.try_borrow() {
            Ok(strings) => strings.stat(sink),
            Err(_) => sink.line("StringPool: busy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeSizing, StringSizing};

    fn small() -> CoreConfig {
        CoreConfig {
            nodes: NodeSizing {
                max_len: 4,
                max_deques: 2,
                item_size: None,
            },
            strings: StringSizing {
                slots: 3,
                max_str_len: 10,
            },
        }
    }

    #[test]
    fn test_sizes_follow_config() {
        let arenas = Arenas::from_config(&small());
        assert_eq!(arenas.allocator().borrow().capacity(), 6);
        assert_eq!(arenas.allocator().borrow().item_size(), DEFAULT_NODE_SIZE);
        assert_eq!(arenas.strings().borrow().capacity(), 3);
        assert_eq!(arenas.strings().borrow().max_str_len(), 10);
    }

    #[test]
    fn test_mixed_deques_share_nodes() {
        let arenas = Arenas::from_config(&small());
        let mut numbers = arenas.deque::<u64>().unwrap();
        let mut names = arenas.string_deque().unwrap();

        numbers.push_back(u64::MAX).unwrap();
        names.push_str("a").unwrap();
        numbers.push_back(1).unwrap();
        names.push_str("b").unwrap();

        assert!(numbers.push_back(2).unwrap_err().is_capacity());
        assert_eq!(numbers.iter().collect::<Vec<_>>(), vec![u64::MAX, 1]);
        assert_eq!(names.text(1).unwrap(), "b");
    }

    #[test]
    fn test_pool_strings_and_deques_share_slots() {
        let arenas = Arenas::from_config(&small());
        let mut greeting = arenas.pool_string().unwrap();
        greeting.assign("hello");

        let mut names = arenas.string_deque().unwrap();
        names.push_str("x").unwrap();
        names.push_str("y").unwrap();
        assert!(names.push_str("z").unwrap_err().is_capacity());

        let strings = arenas.strings().borrow();
        assert_eq!(strings.owned() + strings.available(), strings.capacity());
    }

    #[test]
    fn test_stat_reports_both_arenas() {
        let arenas = Arenas::from_config(&small());
        let _d = arenas.deque::<u8>().unwrap();
        let mut lines: Vec<String> = Vec::new();
        arenas.stat(&mut lines);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Allocator: num taken = 1"));
        assert!(lines[1].starts_with("StringPool: num taken = 0"));

        lines.clear();
        let _hold = arenas.strings().borrow_mut();
        arenas.stat(&mut lines);
        assert_eq!(lines[1], "StringPool: busy");
    }
}
