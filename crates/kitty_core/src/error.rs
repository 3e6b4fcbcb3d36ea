//! # Core Error Types
//!
//! Every runtime condition in this crate is a recoverable error value.
//! Only construction of an arena is allowed to fail fatally.

use std::cell::{Ref, RefCell, RefMut};

use thiserror::Error;

/// Broad category of a [`CoreError`].
///
/// The interpreter maps [`ErrorClass::Capacity`] to a script-level
/// "out of memory" style message and [`ErrorClass::Misuse`] to an internal
/// error report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A fixed-size arena has no free slot left.
    Capacity,
    /// A handle, index or position was used outside its contract.
    Misuse,
    /// Startup configuration was unreadable or out of range.
    Config,
}

/// Errors that can occur in the memory primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Every block or slot of an arena is in use.
    #[error("no capacity left in {arena} (capacity {capacity})")]
    NoCapacity {
        /// Which arena ran out.
        arena: &'static str,
        /// Its fixed capacity.
        capacity: usize,
    },

    /// The handle was not produced by this arena, or its block is not in use.
    #[error("handle {index} does not belong to this allocator")]
    ForeignHandle {
        /// Slot index carried by the handle.
        index: u32,
    },

    /// The handle's block was freed and handed out again since.
    #[error("handle {index} is stale (generation {generation}, current {current})")]
    StaleHandle {
        /// Slot index carried by the handle.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
        /// Generation currently stored in the slot.
        current: u32,
    },

    /// The sequence holds no element.
    #[error("sequence is empty")]
    Empty,

    /// Positional access past the end of a sequence.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested position.
        index: usize,
        /// Current length.
        len: usize,
    },

    /// The string handle is out of range, the sentinel, or not allocated.
    #[error("string handle {0} is not allocated")]
    InvalidHandle(u16),

    /// The string handle is already owned by another container.
    #[error("string handle {0} is already owned by a container")]
    AlreadyOwned(u16),

    /// A string slot holds bytes that are not UTF-8.
    #[error("string slot {0} holds invalid UTF-8")]
    InvalidUtf8(u16),

    /// The arena is already borrowed by the caller.
    #[error("{0} is borrowed elsewhere")]
    ArenaBusy(&'static str),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("cannot read configuration: {0}")]
    ConfigIo(String),

    /// Configuration file is not valid TOML for this schema.
    #[error("cannot parse configuration: {0}")]
    ConfigParse(String),
}

impl CoreError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NoCapacity { .. } => ErrorClass::Capacity,
            Self::ForeignHandle { .. }
            | Self::StaleHandle { .. }
            | Self::Empty
            | Self::IndexOutOfBounds { .. }
            | Self::InvalidHandle(_)
            | Self::AlreadyOwned(_)
            | Self::InvalidUtf8(_)
            | Self::ArenaBusy(_) => ErrorClass::Misuse,
            Self::InvalidConfig(_) | Self::ConfigIo(_) | Self::ConfigParse(_) => ErrorClass::Config,
        }
    }

    /// Returns `true` for capacity exhaustion.
    #[inline]
    #[must_use]
    pub const fn is_capacity(&self) -> bool {
        matches!(self.class(), ErrorClass::Capacity)
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Borrows a shared arena, reporting a held mutable borrow as an error.
pub(crate) fn borrow_arena<'c, T>(
    cell: &'c RefCell<T>,
    arena: &'static str,
) -> CoreResult<Ref<'c, T>> {
    cell.try_borrow().map_err(|_| CoreError::ArenaBusy(arena))
}

/// Mutably borrows a shared arena, reporting any held borrow as an error.
pub(crate) fn borrow_arena_mut<'c, T>(
    cell: &'c RefCell<T>,
    arena: &'static str,
) -> CoreResult<RefMut<'c, T>> {
    cell.try_borrow_mut().map_err(|_| CoreError::ArenaBusy(arena))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let full = CoreError::NoCapacity { arena: "allocator", capacity: 4 };
        assert_eq!(full.class(), ErrorClass::Capacity);
        assert!(full.is_capacity());

        assert_eq!(CoreError::Empty.class(), ErrorClass::Misuse);
        assert_eq!(CoreError::InvalidHandle(3).class(), ErrorClass::Misuse);
        assert_eq!(
            CoreError::InvalidConfig("slots = 0".into()).class(),
            ErrorClass::Config
        );
    }

    #[test]
    fn test_busy_arena_is_misuse() {
        let cell = RefCell::new(0u8);
        let held = cell.borrow();
        assert_eq!(
            borrow_arena_mut(&cell, "allocator").unwrap_err(),
            CoreError::ArenaBusy("allocator")
        );
        assert!(borrow_arena(&cell, "allocator").is_ok());
        drop(held);
        assert!(borrow_arena_mut(&cell, "allocator").is_ok());
        assert_eq!(CoreError::ArenaBusy("string pool").class(), ErrorClass::Misuse);
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::IndexOutOfBounds { index: 5, len: 2 };
        assert_eq!(err.to_string(), "index 5 out of bounds for length 2");
    }
}
