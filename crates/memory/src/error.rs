use sluice_layout::LayoutError;
use thiserror::Error;

use crate::{ScopeId, ScopeState};

/// Coarse classification of a [`MemoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    InvalidState,
    ResourceExhausted,
    ArithmeticOverflow,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoryError {
    #[error("allocation size must be positive: but got `{0}`")]
    InvalidSize(u64),

    #[error("alignment must be a power of two: but got `{0}`")]
    InvalidAlignment(u64),

    #[error("alignment {align} exceeds the maximum supported alignment {max}")]
    AlignmentTooLarge { align: u64, max: u64 },

    #[error("unknown scope flag bits `{0:#x}`")]
    UnknownFlags(u32),

    #[error("invalid flag combination: {0}")]
    InvalidFlags(&'static str),

    #[error("invalid region configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("access of {length} bytes at offset {offset} is out of bounds for a segment of {size} bytes")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("access at address {address:#x} is not aligned to {align}")]
    Misaligned { address: u64, align: u64 },

    #[error("value `{value}` does not fit layout `{layout}`")]
    ValueMismatch { value: String, layout: String },

    #[error("{scope} is {state}")]
    NotAlive { scope: ScopeId, state: ScopeState },

    #[error("{0} is pinned")]
    Pinned(ScopeId),

    #[error("{0} is confined to another execution context")]
    WrongContext(ScopeId),

    #[error("{0} is read-only")]
    ReadOnly(ScopeId),

    #[error("heap memory has no native address")]
    NotNative,

    #[error("out of memory while reserving {0} bytes")]
    OutOfMemory(u64),

    #[error("segment bounds overflow 64 bits")]
    Overflow,

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSize(_)
            | Self::InvalidAlignment(_)
            | Self::AlignmentTooLarge { .. }
            | Self::UnknownFlags(_)
            | Self::InvalidFlags(_)
            | Self::InvalidConfig(_)
            | Self::OutOfBounds { .. }
            | Self::Misaligned { .. }
            | Self::ValueMismatch { .. } => ErrorKind::InvalidArgument,

            Self::NotAlive { .. } | Self::Pinned(_) | Self::WrongContext(_) => {
                ErrorKind::InvalidState
            }

            Self::ReadOnly(_) | Self::NotNative => ErrorKind::Unsupported,
            Self::OutOfMemory(_) => ErrorKind::ResourceExhausted,
            Self::Overflow => ErrorKind::ArithmeticOverflow,

            Self::Layout(LayoutError::SizeOverflow) => ErrorKind::ArithmeticOverflow,
            Self::Layout(err) if err.is_unsupported() => ErrorKind::Unsupported,
            Self::Layout(_) => ErrorKind::InvalidArgument,
        }
    }
}
