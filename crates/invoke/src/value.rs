use std::{fmt, sync::Arc};

use byteorder::{ByteOrder, NativeEndian};
use sluice_layout::{Carrier, FunctionDescriptor, MemoryLayout};
use sluice_memory::{ExecContext, MemoryAddress, MemorySegment, Scope, Value};

use crate::InvokeError;

/// The managed side of an upcall: receives the call's context, a scope that
/// lives for the duration of the call, and the boxed arguments.
pub type UpcallFn = Arc<
    dyn Fn(&ExecContext, &Scope, &[ManagedValue]) -> Result<Option<ManagedValue>, InvokeError>
        + Send
        + Sync,
>;

/// A managed function passed where native code expects a function pointer.
/// It is turned into an upcall stub that lives for one downcall.
#[derive(Clone)]
pub struct Callback {
    pub target: UpcallFn,
    pub descriptor: FunctionDescriptor,
}

impl Callback {
    pub fn new(
        descriptor: FunctionDescriptor,
        target: impl Fn(&ExecContext, &Scope, &[ManagedValue]) -> Result<Option<ManagedValue>, InvokeError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            target: Arc::new(target),
            descriptor,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// A value on the managed side of a call.
#[derive(Debug, Clone)]
pub enum ManagedValue {
    Scalar(Value),
    Address(MemoryAddress),
    /// An aggregate, by its backing memory.
    Struct(MemorySegment),
    Callback(Callback),
}

impl ManagedValue {
    pub fn as_scalar(&self) -> Option<Value> {
        match self {
            Self::Scalar(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&MemoryAddress> {
        match self {
            Self::Address(address) => Some(address),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&MemorySegment> {
        match self {
            Self::Struct(segment) => Some(segment),
            _ => None,
        }
    }

    /// Returns `true` if the value can be passed as `layout`.
    pub fn matches(&self, layout: &MemoryLayout) -> bool {
        match (layout, self) {
            (MemoryLayout::Value(value), _) if value.carrier() == Carrier::Address => {
                matches!(self, Self::Address(_) | Self::Callback(_))
            }
            (MemoryLayout::Value(value), Self::Scalar(scalar)) => {
                scalar.carrier() == value.carrier()
            }
            (MemoryLayout::Group(_), Self::Struct(segment)) => {
                layout.byte_size().ok() == Some(segment.byte_size())
            }
            (MemoryLayout::Sequence(_), Self::Struct(segment)) => match layout.byte_size() {
                Ok(size) => size == segment.byte_size(),
                Err(_) => true,
            },
            (MemoryLayout::Sequence(_), Self::Address(_)) => true,
            _ => false,
        }
    }

    /// A short description for mismatch errors.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Scalar(value) => format!("{value:?}"),
            Self::Address(address) => format!("address {address}"),
            Self::Struct(segment) => format!("{} byte struct", segment.byte_size()),
            Self::Callback(callback) => format!("callback {}", callback.descriptor),
        }
    }
}

impl From<Value> for ManagedValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<MemoryAddress> for ManagedValue {
    fn from(address: MemoryAddress) -> Self {
        Self::Address(address)
    }
}

impl From<MemorySegment> for ManagedValue {
    fn from(segment: MemorySegment) -> Self {
        Self::Struct(segment)
    }
}

impl From<Callback> for ManagedValue {
    fn from(callback: Callback) -> Self {
        Self::Callback(callback)
    }
}

/// Boxes a word holding a scalar, or an address, of `layout`.
pub(crate) fn box_word(layout: &MemoryLayout, word: u64, unchecked: &Scope) -> ManagedValue {
    match layout {
        MemoryLayout::Value(value) if value.carrier() != Carrier::Address => {
            ManagedValue::Scalar(Value::from_bits(value.carrier(), word))
        }
        _ => ManagedValue::Address(MemoryAddress::native(word, unchecked.clone())),
    }
}

/// Reads `size` bytes at `offset` of `segment` as the low bytes of a word.
pub(crate) fn load_word(
    cx: &ExecContext,
    segment: &MemorySegment,
    offset: u64,
    size: u64,
) -> Result<u64, InvokeError> {
    let mut buf = [0u8; 8];
    let buf = &mut buf[..size as usize];
    segment.read_bytes(cx, offset, buf)?;
    Ok(NativeEndian::read_uint(buf, buf.len()))
}

/// Writes the low `size` bytes of `word` at `offset` of `segment`.
pub(crate) fn store_word(
    cx: &ExecContext,
    segment: &MemorySegment,
    offset: u64,
    size: u64,
    word: u64,
) -> Result<(), InvokeError> {
    let mask = match size {
        8 => u64::MAX,
        _ => (1u64 << (size * 8)) - 1,
    };
    let mut buf = [0u8; 8];
    let buf = &mut buf[..size as usize];
    NativeEndian::write_uint(buf, word & mask, buf.len());
    segment.write_bytes(cx, offset, buf)?;
    Ok(())
}
