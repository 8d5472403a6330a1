//! Scoped native memory.
//!
//! Memory is allocated from a [`Scope`], which owns a bump allocator and
//! decides whether its memory may still be accessed. Scopes form a tree
//! rooted at the two pinned scopes of a [`ScopeRegistry`]. Closing a scope
//! frees the memory of its whole subtree at once; merging hands it over to
//! the parent.
//!
//! Accesses go through [`MemorySegment`], which checks bounds, alignment and
//! liveness every time, and take the caller's [`ExecContext`] so that
//! confined scopes can reject foreign contexts.
pub mod address;
pub mod config;
pub mod context;
pub mod error;
pub mod flags;
pub mod region;
pub mod scope;
pub mod segment;
pub mod value;

pub use address::MemoryAddress;
pub use config::RegionConfig;
pub use context::{ContextId, ExecContext};
pub use error::{ErrorKind, MemoryError};
pub use flags::ScopeFlags;
pub use region::{Block, BlockSource, LimitedBlocks, RegionAllocator, RegionStats, SystemBlocks};
pub use scope::{CloseAction, Scope, ScopeId, ScopeRegistry, ScopeState};
pub use segment::MemorySegment;
pub use value::Value;
