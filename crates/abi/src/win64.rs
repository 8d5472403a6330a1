//! The Microsoft x64 calling convention.
//!
//! The first four arguments go in `rcx`, `rdx`, `r8`, `r9` or `xmm0`-`xmm3`
//! by position, the rest in 8-byte stack slots above 32 bytes of shadow
//! space. Aggregates of 1, 2, 4 or 8 bytes travel as integers; anything
//! else is passed by reference to a caller-made copy, or returned through a
//! hidden pointer in `rcx` that the callee hands back in `rax`.
use sluice_layout::{Carrier, MemoryLayout};
use sluice_triple::CallConv;

use crate::{
    AbiError, ArgumentClass, CallConvention, Position, RegClass, RegisterAssignment,
    VarargPolicy,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Win64;

impl CallConvention for Win64 {
    fn call_conv(&self) -> CallConv {
        CallConv::Win64
    }

    fn arg_registers(&self, class: RegClass) -> &'static [&'static str] {
        match class {
            RegClass::Integer => &["rcx", "rdx", "r8", "r9"],
            RegClass::Vector => &["xmm0", "xmm1", "xmm2", "xmm3"],
        }
    }

    fn ret_registers(&self, class: RegClass) -> &'static [&'static str] {
        match class {
            RegClass::Integer => &["rax"],
            RegClass::Vector => &["xmm0"],
        }
    }

    fn register_assignment(&self) -> RegisterAssignment {
        RegisterAssignment::Positional
    }

    fn vararg_policy(&self) -> VarargPolicy {
        VarargPolicy::DuplicateInInteger
    }

    fn stack_slot_size(&self) -> u64 {
        8
    }

    fn shadow_space(&self) -> u64 {
        32
    }

    fn classify(
        &self,
        layout: &MemoryLayout,
        position: Position,
    ) -> Result<ArgumentClass, AbiError> {
        match layout {
            MemoryLayout::Value(value) => match (value.carrier(), position) {
                (Carrier::Address, _) => Ok(ArgumentClass::Pointer),
                (
                    Carrier::F32,
                    Position::Argument {
                        index,
                        variadic: true,
                    },
                ) => Err(AbiError::UnpromotedVariadic {
                    index,
                    layout: layout.to_string(),
                }),
                (Carrier::F64, Position::Argument { variadic: true, .. }) => {
                    Ok(ArgumentClass::VarargFloat)
                }
                (carrier, _) if carrier.is_float() => Ok(ArgumentClass::Float),
                _ => Ok(ArgumentClass::Integer),
            },

            MemoryLayout::Group(_) => {
                let size = layout.byte_size()?;
                Ok(match (size, position) {
                    (1 | 2 | 4 | 8, _) => ArgumentClass::StructRegister,
                    (_, Position::Return) => ArgumentClass::Memory,
                    (_, Position::Argument { .. }) => ArgumentClass::StructReference,
                })
            }

            MemoryLayout::Sequence(_) => match position {
                // Arrays decay to a pointer to their first element.
                Position::Argument { .. } => Ok(ArgumentClass::Integer),
                Position::Return => Err(AbiError::UnsupportedReturn {
                    layout: layout.to_string(),
                }),
            },

            MemoryLayout::Padding(_) => match position {
                Position::Argument { index, .. } => Err(AbiError::UnsupportedArgument {
                    index,
                    layout: layout.to_string(),
                }),
                Position::Return => Err(AbiError::UnsupportedReturn {
                    layout: layout.to_string(),
                }),
            },
        }
    }
}
