use sluice_layout::MemoryLayout;
use sluice_triple::{CallConv, TargetTriple};

use crate::{win64::Win64, AbiError, ArgumentClass, RegClass};

/// How argument positions map to registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAssignment {
    /// Argument `n` may only use register `n` of its class, so every
    /// argument consumes one slot of every class.
    Positional,
    /// Each register class has its own cursor.
    PerClass,
}

/// What to do with a floating-point value passed as a variadic argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarargPolicy {
    /// Pass it in the vector register and copy it to the matching integer
    /// register.
    DuplicateInInteger,
    /// Pass it like any other float.
    VectorOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Argument { index: usize, variadic: bool },
    Return,
}

/// A C calling convention.
pub trait CallConvention: Send + Sync {
    fn call_conv(&self) -> CallConv;

    /// Registers used to pass arguments of `class`, in order.
    fn arg_registers(&self, class: RegClass) -> &'static [&'static str];

    /// Registers used to return values of `class`, in order.
    fn ret_registers(&self, class: RegClass) -> &'static [&'static str];

    fn register_assignment(&self) -> RegisterAssignment;

    fn vararg_policy(&self) -> VarargPolicy;

    /// Size of a stack argument slot. Never smaller than 8.
    fn stack_slot_size(&self) -> u64;

    /// Stack space the caller reserves for register arguments.
    fn shadow_space(&self) -> u64;

    fn classify(&self, layout: &MemoryLayout, position: Position)
        -> Result<ArgumentClass, AbiError>;
}

/// Returns the convention implementing `call_conv`.
pub fn convention(call_conv: CallConv) -> Result<&'static dyn CallConvention, AbiError> {
    match call_conv {
        CallConv::Win64 => {
            const WIN64: Win64 = Win64;
            Ok(&WIN64)
        }
        _ => Err(AbiError::UnsupportedConvention(call_conv)),
    }
}

/// Returns the default C convention of `triple`.
pub fn convention_for(triple: &TargetTriple) -> Result<&'static dyn CallConvention, AbiError> {
    convention(triple.default_call_conv())
}
