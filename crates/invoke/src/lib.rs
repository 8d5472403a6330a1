//! Calls between managed code and native code.
//!
//! A [`Linker`] arranges function shapes under one calling convention and
//! hands out [`DowncallHandle`]s, which call native functions, and upcall
//! stubs, which let native code call managed functions. Both replay a
//! shuffle recipe between managed words and a [`NativeFrame`]; entering
//! native code is left to a [`Trampoline`]. [`Machine`] is a trampoline
//! that runs Rust functions written against the register image.
pub mod config;
pub mod downcall;
pub mod error;
pub mod frame;
pub mod linker;
pub mod machine;
mod upcall;
pub mod value;

pub use config::{LinkerConfig, UpcallFailurePolicy};
pub use downcall::DowncallHandle;
pub use error::InvokeError;
pub use frame::NativeFrame;
pub use linker::Linker;
pub use machine::{CodeId, Machine, NativeCode, Trampoline};
pub use value::{Callback, ManagedValue, UpcallFn};
