//! # Memory Management
//!
//! Pre-sized block pools and the ring deque built on them.
//!
//! ## Design Philosophy
//!
//! All memory is reserved once at startup. Afterwards:
//! - No heap growth
//! - No fragmentation
//! - Exhaustion is an error value, not a crash

mod allocator;
mod deque;

pub use allocator::{Allocator, BlockHandle};
pub use deque::{Deque, Iter};
