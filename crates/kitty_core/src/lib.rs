//! # Kitty Core
//!
//! Memory foundation of the Kitty scripting runtime, designed for:
//! - Microcontrollers with a few kilobytes of RAM
//! - No heap compaction, no fragmentation
//! - Bounded, allocation-free container operations
//!
//! ## Architecture Rules
//!
//! 1. **Sized once** - every arena is reserved at startup and never grows
//! 2. **Handles, not pointers** - blocks and strings are addressed by index
//! 3. **Errors, not crashes** - exhaustion and misuse are `Result`s
//!
//! ## Example
//!
//! ```rust
//! use kitty_core::{Arenas, CoreConfig};
//!
//! let arenas = Arenas::from_config(&CoreConfig::default());
//! let mut tokens = arenas.string_deque()?;
//! tokens.push_str("print")?;
//! tokens.push_str("42")?;
//!
//! assert_eq!(tokens.text(0)?, "print");
//! # Ok::<(), kitty_core::CoreError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arenas;
pub mod config;
pub mod diag;
pub mod error;
pub mod memory;
pub mod strings;

pub use arenas::{Arenas, DEFAULT_NODE_SIZE};
pub use config::{CoreConfig, NodeSizing, StringSizing};
pub use diag::{DiagnosticSink, TracingSink};
pub use error::{CoreError, CoreResult, ErrorClass};
pub use memory::{Allocator, BlockHandle, Deque, Iter as DequeIter};
pub use strings::{PoolString, StrHandle, StringDeque, StringPool};
