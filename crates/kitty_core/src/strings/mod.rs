//! # Fixed-Length Strings
//!
//! String storage for identifiers and literals: a pool of equally sized
//! slots, a string that owns one slot, and a deque that owns many.

mod pool;
mod pool_string;
mod string_deque;

pub use pool::{StrHandle, StringPool};
pub use pool_string::PoolString;
pub use string_deque::StringDeque;
