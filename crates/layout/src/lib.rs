//! Descriptions of native memory shapes.
//!
//! A [`MemoryLayout`] says how many bytes a native value occupies, how it must
//! be aligned and, for aggregates, where each member lives. Layouts are plain
//! values: they are compared structurally and never mutated in place.
pub mod error;
pub mod function;
pub mod layout;
pub mod path;
pub mod value;

pub use error::LayoutError;
pub use function::FunctionDescriptor;
pub use layout::{GroupKind, GroupLayout, MemoryLayout, PaddingLayout, SequenceLayout};
pub use path::{LayoutPath, PathElement};
pub use value::{ByteOrder, Carrier, ValueLayout};

pub mod prelude {
    pub use crate::{
        layout::MemoryLayout,
        path::PathElement,
        value::{ByteOrder, Carrier, ValueLayout},
        FunctionDescriptor,
    };
}
