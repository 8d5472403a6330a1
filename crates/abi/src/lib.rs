//! C calling conventions.
//!
//! A [`CallConvention`] classifies each argument and return layout of a
//! [`FunctionDescriptor`](sluice_layout::FunctionDescriptor); [`arrange`]
//! turns the classes into a [`CallingSequence`] that names the register or
//! stack slot of every word, and a [`ShuffleRecipe`] flattens that sequence
//! into word moves an invoker can replay.
pub mod arrange;
pub mod cache;
pub mod class;
pub mod convention;
pub mod error;
pub mod recipe;
pub mod sequence;
pub mod storage;
pub mod win64;

pub use arrange::arrange;
pub use cache::{Arrangement, SequenceCache};
pub use class::ArgumentClass;
pub use convention::{
    convention, convention_for, CallConvention, Position, RegisterAssignment, VarargPolicy,
};
pub use error::AbiError;
pub use recipe::{Move, ShuffleRecipe, Slot};
pub use sequence::{ArgumentBinding, BindingSource, CallingSequence, Direction};
pub use storage::{RegClass, Storage, StorageKind};
pub use win64::Win64;
