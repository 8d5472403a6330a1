use std::fmt;

use indexmap::IndexMap;
use sluice_layout::FunctionDescriptor;
use smallvec::SmallVec;

use crate::{ArgumentClass, CallConvention, Storage, StorageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Managed code calls native code.
    Downcall,
    /// Native code calls managed code.
    Upcall,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downcall => write!(f, "downcall"),
            Self::Upcall => write!(f, "upcall"),
        }
    }
}

/// Where the bytes of a binding come from, or go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSource {
    Argument(usize),
    /// The buffer a `Memory` class return value is written to.
    ReturnBuffer,
    Return,
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(idx) => write!(f, "arg{idx}"),
            Self::ReturnBuffer => write!(f, "retbuf"),
            Self::Return => write!(f, "ret"),
        }
    }
}

/// One word of an argument or return value and where it is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgumentBinding {
    pub storage: Storage,
    /// Bytes carried, at most one word.
    pub size: u64,
    pub source: BindingSource,
    /// Byte offset of the word within its aggregate.
    pub offset: u64,
    pub class: ArgumentClass,
}

/// The complete passing plan of one function shape under one convention.
#[derive(Clone)]
pub struct CallingSequence {
    pub(crate) conv: &'static dyn CallConvention,
    pub(crate) direction: Direction,
    pub(crate) descriptor: FunctionDescriptor,
    pub(crate) arg_classes: SmallVec<[ArgumentClass; 8]>,
    pub(crate) ret_class: Option<ArgumentClass>,
    pub(crate) arg_bindings: Vec<ArgumentBinding>,
    pub(crate) ret_bindings: Vec<ArgumentBinding>,
    pub(crate) stack_size: u64,
}

impl CallingSequence {
    pub fn convention(&self) -> &'static dyn CallConvention {
        self.conv
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    pub fn arg_class(&self, idx: usize) -> ArgumentClass {
        self.arg_classes[idx]
    }

    pub fn ret_class(&self) -> Option<ArgumentClass> {
        self.ret_class
    }

    /// Bindings of the native argument list, hidden return pointer included.
    pub fn arg_bindings(&self) -> &[ArgumentBinding] {
        &self.arg_bindings
    }

    pub fn ret_bindings(&self) -> &[ArgumentBinding] {
        &self.ret_bindings
    }

    /// Bindings of argument `idx`, in word order.
    pub fn bindings_of(&self, idx: usize) -> impl Iterator<Item = &ArgumentBinding> + '_ {
        self.arg_bindings
            .iter()
            .filter(move |b| b.source == BindingSource::Argument(idx))
    }

    /// Argument bindings grouped by the kind of storage they use.
    pub fn bindings_by_kind(&self) -> IndexMap<StorageKind, SmallVec<[&ArgumentBinding; 4]>> {
        let mut groups: IndexMap<_, SmallVec<[_; 4]>> = IndexMap::new();
        for binding in &self.arg_bindings {
            groups.entry(binding.storage.kind()).or_default().push(binding);
        }
        groups.sort_keys();
        groups
    }

    /// Returns `true` if the callee writes the return value through a hidden
    /// pointer argument.
    pub fn returns_in_memory(&self) -> bool {
        self.ret_class == Some(ArgumentClass::Memory)
    }

    /// Bytes of outgoing stack arguments, shadow space included.
    pub fn stack_size(&self) -> u64 {
        self.stack_size
    }

    fn storage_name(&self, storage: Storage, ret: bool) -> String {
        match storage {
            Storage::Reg { class, index } => {
                let names = if ret {
                    self.conv.ret_registers(class)
                } else {
                    self.conv.arg_registers(class)
                };
                names[index as usize].to_string()
            }
            Storage::Stack { offset } => format!("stack+{offset}"),
        }
    }
}

impl fmt::Debug for CallingSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallingSequence")
            .field("conv", &self.conv.call_conv())
            .field("direction", &self.direction)
            .field("descriptor", &self.descriptor)
            .field("arg_bindings", &self.arg_bindings)
            .field("ret_bindings", &self.ret_bindings)
            .field("stack_size", &self.stack_size)
            .finish()
    }
}

impl fmt::Display for CallingSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} {}",
            self.conv.call_conv(),
            self.direction,
            self.descriptor
        )?;

        let bindings = self
            .arg_bindings
            .iter()
            .map(|b| (b, false))
            .chain(self.ret_bindings.iter().map(|b| (b, true)));
        for (binding, ret) in bindings {
            let side = if ret { "ret" } else { "arg" };
            writeln!(
                f,
                "  {side} {:<16} {:<8} {}[{}..{}]",
                binding.class,
                self.storage_name(binding.storage, ret),
                binding.source,
                binding.offset,
                binding.offset + binding.size,
            )?;
        }
        write!(f, "  stack {}", self.stack_size)
    }
}
