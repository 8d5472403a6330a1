use sluice_abi::AbiError;
use sluice_layout::LayoutError;
use sluice_memory::MemoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("argument {index} does not match layout `{expected}`: found {found}")]
    ArgumentMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("return value does not match layout `{expected}`: found {found}")]
    ReturnMismatch { expected: String, found: String },

    #[error("the host is not a supported target")]
    UnsupportedHost,

    #[error("no native code at {0:#x}")]
    UnknownFunction(u64),

    /// Raised by a managed upcall target.
    #[error("upcall target failed: {0}")]
    Target(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl InvokeError {
    pub fn target(reason: impl Into<String>) -> Self {
        Self::Target(reason.into())
    }
}
