use std::fmt;

use byteorder::{BigEndian, LittleEndian};
use sluice_layout::{ByteOrder, Carrier, ValueLayout};

use crate::MemoryError;

/// A scalar read from or written to native memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char16(u16),
    /// A raw native address.
    Address(u64),
}

impl Value {
    pub fn carrier(&self) -> Carrier {
        match self {
            Self::Bool(_) => Carrier::Bool,
            Self::I8(_) => Carrier::I8,
            Self::I16(_) => Carrier::I16,
            Self::I32(_) => Carrier::I32,
            Self::I64(_) => Carrier::I64,
            Self::F32(_) => Carrier::F32,
            Self::F64(_) => Carrier::F64,
            Self::Char16(_) => Carrier::Char16,
            Self::Address(_) => Carrier::Address,
        }
    }

    /// The value as a raw 64-bit word, zero extended for unsigned carriers
    /// and sign extended for signed ones. Floats keep their bit pattern.
    pub fn to_bits(self) -> u64 {
        match self {
            Self::Bool(v) => v as u64,
            Self::I8(v) => v as i64 as u64,
            Self::I16(v) => v as i64 as u64,
            Self::I32(v) => v as i64 as u64,
            Self::I64(v) => v as u64,
            Self::F32(v) => v.to_bits() as u64,
            Self::F64(v) => v.to_bits(),
            Self::Char16(v) => v as u64,
            Self::Address(v) => v,
        }
    }

    /// Reads a value of `carrier` from the low bits of `bits`.
    pub fn from_bits(carrier: Carrier, bits: u64) -> Self {
        match carrier {
            Carrier::Bool => Self::Bool(bits as u8 != 0),
            Carrier::I8 => Self::I8(bits as i8),
            Carrier::I16 => Self::I16(bits as i16),
            Carrier::I32 => Self::I32(bits as i32),
            Carrier::I64 => Self::I64(bits as i64),
            Carrier::F32 => Self::F32(f32::from_bits(bits as u32)),
            Carrier::F64 => Self::F64(f64::from_bits(bits)),
            Carrier::Char16 => Self::Char16(bits as u16),
            Carrier::Address => Self::Address(bits),
        }
    }

    /// Writes the value into `buf` following `layout`'s byte order.
    ///
    /// `buf` must be exactly `layout.byte_size()` bytes long.
    pub fn encode(&self, layout: &ValueLayout, buf: &mut [u8]) -> Result<(), MemoryError> {
        if self.carrier() != layout.carrier() {
            return Err(MemoryError::ValueMismatch {
                value: self.to_string(),
                layout: layout.to_string(),
            });
        }
        debug_assert_eq!(buf.len() as u64, layout.byte_size());

        match layout.order() {
            ByteOrder::Little => self.write::<LittleEndian>(buf),
            ByteOrder::Big => self.write::<BigEndian>(buf),
        }
        Ok(())
    }

    pub fn decode(layout: &ValueLayout, buf: &[u8]) -> Self {
        debug_assert_eq!(buf.len() as u64, layout.byte_size());
        match layout.order() {
            ByteOrder::Little => Self::read::<LittleEndian>(layout.carrier(), buf),
            ByteOrder::Big => Self::read::<BigEndian>(layout.carrier(), buf),
        }
    }

    fn write<B: byteorder::ByteOrder>(&self, buf: &mut [u8]) {
        match *self {
            Self::Bool(v) => buf[0] = v as u8,
            Self::I8(v) => buf[0] = v as u8,
            Self::I16(v) => B::write_i16(buf, v),
            Self::I32(v) => B::write_i32(buf, v),
            Self::I64(v) => B::write_i64(buf, v),
            Self::F32(v) => B::write_f32(buf, v),
            Self::F64(v) => B::write_f64(buf, v),
            Self::Char16(v) => B::write_u16(buf, v),
            Self::Address(v) => B::write_u64(buf, v),
        }
    }

    fn read<B: byteorder::ByteOrder>(carrier: Carrier, buf: &[u8]) -> Self {
        match carrier {
            Carrier::Bool => Self::Bool(buf[0] != 0),
            Carrier::I8 => Self::I8(buf[0] as i8),
            Carrier::I16 => Self::I16(B::read_i16(buf)),
            Carrier::I32 => Self::I32(B::read_i32(buf)),
            Carrier::I64 => Self::I64(B::read_i64(buf)),
            Carrier::F32 => Self::F32(B::read_f32(buf)),
            Carrier::F64 => Self::F64(B::read_f64(buf)),
            Carrier::Char16 => Self::Char16(B::read_u16(buf)),
            Carrier::Address => Self::Address(B::read_u64(buf)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}.i8"),
            Self::I16(v) => write!(f, "{v}.i16"),
            Self::I32(v) => write!(f, "{v}.i32"),
            Self::I64(v) => write!(f, "{v}.i64"),
            Self::F32(v) => write!(f, "{v}.f32"),
            Self::F64(v) => write!(f, "{v}.f64"),
            Self::Char16(v) => write!(f, "{v:#06x}.c16"),
            Self::Address(v) => write!(f, "{v:#x}"),
        }
    }
}
