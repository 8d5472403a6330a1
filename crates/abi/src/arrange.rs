//! Assignment of classified arguments to registers and stack slots.
use sluice_layout::{FunctionDescriptor, MemoryLayout};
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    AbiError, ArgumentBinding, ArgumentClass, BindingSource, CallConvention, CallingSequence,
    Direction, Position, RegClass, RegisterAssignment, Storage, VarargPolicy,
};

const WORD: u64 = 8;

/// Builds the calling sequence of `descriptor` under `conv`.
///
/// The return value is arranged first, so that a hidden return buffer pointer
/// claims the first integer argument register. Arguments follow left to
/// right; once the registers of a class run out, the remaining arguments of
/// that class go to the stack.
pub fn arrange(
    conv: &'static dyn CallConvention,
    descriptor: &FunctionDescriptor,
    direction: Direction,
) -> Result<CallingSequence, AbiError> {
    let mut cursor = StorageCursor::new(conv);
    let mut arg_bindings = Vec::with_capacity(descriptor.args().len() + 1);
    let mut ret_bindings = Vec::new();

    let ret_class = match descriptor.ret() {
        Some(ret) => {
            let class = conv.classify(ret, Position::Return)?;
            arrange_return(conv, ret, class, &mut cursor, &mut arg_bindings, &mut ret_bindings)?;
            Some(class)
        }
        None => None,
    };

    let mut arg_classes = SmallVec::with_capacity(descriptor.args().len());
    for (index, layout) in descriptor.args().iter().enumerate() {
        let position = Position::Argument {
            index,
            variadic: descriptor.is_variadic_arg(index),
        };
        let class = conv.classify(layout, position)?;
        arrange_argument(index, layout, class, &mut cursor, &mut arg_bindings)?;
        arg_classes.push(class);
    }

    let stack_size = cursor.stack_size();
    debug!(
        conv = %conv.call_conv(),
        %direction,
        %descriptor,
        bindings = arg_bindings.len() + ret_bindings.len(),
        stack_size,
        "arranged calling sequence"
    );

    Ok(CallingSequence {
        conv,
        direction,
        descriptor: descriptor.clone(),
        arg_classes,
        ret_class,
        arg_bindings,
        ret_bindings,
        stack_size,
    })
}

fn arrange_return(
    conv: &dyn CallConvention,
    layout: &MemoryLayout,
    class: ArgumentClass,
    cursor: &mut StorageCursor,
    arg_bindings: &mut Vec<ArgumentBinding>,
    ret_bindings: &mut Vec<ArgumentBinding>,
) -> Result<(), AbiError> {
    let unsupported = || AbiError::UnsupportedReturn {
        layout: layout.to_string(),
    };

    match class {
        ArgumentClass::Integer | ArgumentClass::Pointer => ret_bindings.push(ArgumentBinding {
            storage: Storage::int(0),
            size: scalar_size(layout),
            source: BindingSource::Return,
            offset: 0,
            class,
        }),

        ArgumentClass::Float => ret_bindings.push(ArgumentBinding {
            storage: Storage::vec(0),
            size: scalar_size(layout),
            source: BindingSource::Return,
            offset: 0,
            class,
        }),

        ArgumentClass::StructRegister => {
            let size = layout.byte_size()?;
            let regs = conv.ret_registers(RegClass::Integer);
            if size.div_ceil(WORD) > regs.len() as u64 {
                return Err(unsupported());
            }
            for (index, (offset, size)) in chunks(size).enumerate() {
                ret_bindings.push(ArgumentBinding {
                    storage: Storage::int(index as u8),
                    size,
                    source: BindingSource::Return,
                    offset,
                    class,
                });
            }
        }

        ArgumentClass::Memory => {
            let storage = cursor.next_word(RegClass::Integer);
            arg_bindings.push(ArgumentBinding {
                storage,
                size: WORD,
                source: BindingSource::ReturnBuffer,
                offset: 0,
                class: ArgumentClass::Pointer,
            });
            // The callee hands the buffer address back.
            ret_bindings.push(ArgumentBinding {
                storage: Storage::int(0),
                size: WORD,
                source: BindingSource::ReturnBuffer,
                offset: 0,
                class,
            });
        }

        ArgumentClass::StructReference | ArgumentClass::VarargFloat => return Err(unsupported()),
    }

    Ok(())
}

fn arrange_argument(
    index: usize,
    layout: &MemoryLayout,
    class: ArgumentClass,
    cursor: &mut StorageCursor,
    bindings: &mut Vec<ArgumentBinding>,
) -> Result<(), AbiError> {
    let source = BindingSource::Argument(index);
    let word = |storage, size| ArgumentBinding {
        storage,
        size,
        source,
        offset: 0,
        class,
    };

    match class {
        ArgumentClass::Integer | ArgumentClass::Pointer => {
            let storage = cursor.next_word(RegClass::Integer);
            bindings.push(word(storage, scalar_size(layout)));
        }

        ArgumentClass::StructReference => {
            let storage = cursor.next_word(RegClass::Integer);
            bindings.push(word(storage, WORD));
        }

        ArgumentClass::Float => {
            let storage = cursor.next_word(RegClass::Vector);
            bindings.push(word(storage, scalar_size(layout)));
        }

        ArgumentClass::VarargFloat => {
            let size = scalar_size(layout);
            match cursor.next_vararg_float() {
                (storage, Some(duplicate)) => {
                    bindings.push(word(storage, size));
                    bindings.push(word(duplicate, size));
                }
                (storage, None) => bindings.push(word(storage, size)),
            }
        }

        ArgumentClass::StructRegister => {
            let size = layout.byte_size()?;
            let words = size.div_ceil(WORD) as usize;
            let storages = cursor.next_words(RegClass::Integer, words, layout.byte_alignment());
            for (storage, (offset, size)) in storages.into_iter().zip(chunks(size)) {
                bindings.push(ArgumentBinding {
                    storage,
                    size,
                    source,
                    offset,
                    class,
                });
            }
        }

        ArgumentClass::Memory => {
            return Err(AbiError::UnsupportedArgument {
                index,
                layout: layout.to_string(),
            })
        }
    }

    Ok(())
}

/// Bytes carried by a scalar binding. Non-scalar layouts passed as a single
/// word are addresses.
fn scalar_size(layout: &MemoryLayout) -> u64 {
    match layout {
        MemoryLayout::Value(value) => value.byte_size(),
        _ => WORD,
    }
}

/// Splits `size` bytes into word-sized `(offset, size)` chunks.
fn chunks(size: u64) -> impl Iterator<Item = (u64, u64)> {
    (0..size.div_ceil(WORD)).map(move |i| {
        let offset = i * WORD;
        (offset, (size - offset).min(WORD))
    })
}

/// Hands out argument storage in order.
struct StorageCursor {
    conv: &'static dyn CallConvention,
    /// Next argument position, used by positional assignment.
    position: usize,
    /// Next register of each class, used by per-class assignment.
    int: usize,
    vec: usize,
    /// End of the outgoing stack area so far.
    stack: u64,
}

impl StorageCursor {
    fn new(conv: &'static dyn CallConvention) -> Self {
        Self {
            conv,
            position: 0,
            int: 0,
            vec: 0,
            stack: conv.shadow_space(),
        }
    }

    fn next_word(&mut self, class: RegClass) -> Storage {
        self.next_words(class, 1, WORD)[0]
    }

    /// Storage for `words` consecutive words of one argument. Either all of
    /// them go in registers or all of them go on the stack.
    fn next_words(&mut self, class: RegClass, words: usize, align: u64) -> SmallVec<[Storage; 2]> {
        match self.take_registers(class, words) {
            Some(first) => (first..first + words)
                .map(|index| Storage::Reg {
                    class,
                    index: index as u8,
                })
                .collect(),
            None => {
                let base = self.stack_slot(words as u64 * WORD, align);
                (0..words as u64)
                    .map(|i| Storage::stack((base + i * WORD) as u32))
                    .collect()
            }
        }
    }

    /// Storage for a variadic float, and the integer register it is
    /// duplicated in if the convention asks for one.
    fn next_vararg_float(&mut self) -> (Storage, Option<Storage>) {
        if self.conv.vararg_policy() == VarargPolicy::VectorOnly {
            return (self.next_word(RegClass::Vector), None);
        }

        match self.conv.register_assignment() {
            RegisterAssignment::Positional => {
                let storage = self.next_word(RegClass::Vector);
                let duplicate = match storage {
                    Storage::Reg { index, .. }
                        if (index as usize) < self.conv.arg_registers(RegClass::Integer).len() =>
                    {
                        Some(Storage::int(index))
                    }
                    _ => None,
                };
                (storage, duplicate)
            }
            RegisterAssignment::PerClass => {
                let storage = self.next_word(RegClass::Vector);
                if storage.reg_class().is_none() {
                    return (storage, None);
                }
                let duplicate = self
                    .take_registers(RegClass::Integer, 1)
                    .map(|index| Storage::int(index as u8));
                (storage, duplicate)
            }
        }
    }

    /// Returns the index of the first of `count` registers of `class`, or
    /// `None` if they do not fit.
    fn take_registers(&mut self, class: RegClass, count: usize) -> Option<usize> {
        let available = self.conv.arg_registers(class).len();
        match self.conv.register_assignment() {
            RegisterAssignment::Positional => {
                let first = self.position;
                self.position += count;
                (first + count <= available).then_some(first)
            }
            RegisterAssignment::PerClass => {
                let next = match class {
                    RegClass::Integer => &mut self.int,
                    RegClass::Vector => &mut self.vec,
                };
                let first = *next;
                if first + count <= available {
                    *next += count;
                    Some(first)
                } else {
                    None
                }
            }
        }
    }

    /// Reserves stack slots for `size` bytes and returns their offset.
    fn stack_slot(&mut self, size: u64, align: u64) -> u64 {
        let slot = self.conv.stack_slot_size();
        let offset = self.stack.next_multiple_of(align.max(slot));
        self.stack = offset + size.max(slot).next_multiple_of(slot);
        offset
    }

    fn stack_size(&self) -> u64 {
        self.stack.next_multiple_of(16)
    }
}
