use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("alignment must be a power of two: but got `{0}`")]
    InvalidAlignment(u64),

    #[error("layout `{0}` has no size")]
    Unsized(String),

    #[error("layout size overflows 64 bits")]
    SizeOverflow,

    #[error("cannot select {element} in layout `{layout}`")]
    UnsupportedPath { element: String, layout: String },

    #[error("layout `{layout}` has no member named `{name}`")]
    MissingMember { name: String, layout: String },

    #[error("index {index} is out of bounds for a sequence of {count} elements")]
    IndexOutOfBounds { index: u64, count: u64 },

    #[error("`{layout}` at byte offset {offset} is not aligned to {align}")]
    Misaligned {
        layout: String,
        offset: u64,
        align: u64,
    },

    #[error("alignment {inner} of `{layout}` exceeds the enclosing alignment {outer}")]
    AlignmentExceedsEnclosing {
        layout: String,
        inner: u64,
        outer: u64,
    },

    #[error("path has {expected} free dimensions but {found} indices were given")]
    FreeDimensionMismatch { expected: usize, found: usize },

    #[error("first variadic index {index} exceeds the argument count {count}")]
    InvalidVariadicIndex { index: usize, count: usize },
}

impl LayoutError {
    /// Returns `true` if the error reports a navigation the layout kind can
    /// never support, as opposed to a bad argument value.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedPath { .. }
                | Self::Misaligned { .. }
                | Self::AlignmentExceedsEnclosing { .. }
                | Self::Unsized(_)
        )
    }
}
