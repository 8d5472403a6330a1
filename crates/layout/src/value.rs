use std::fmt;

use crate::LayoutError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub const NATIVE: Self = if cfg!(target_endian = "big") {
        Self::Big
    } else {
        Self::Little
    };
}

/// The numeric kind carried by a scalar layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Carrier {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char16,
    Address,
}

impl Carrier {
    pub const fn byte_size(self) -> u64 {
        match self {
            Self::Bool | Self::I8 => 1,
            Self::I16 | Self::Char16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 | Self::Address => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_address(self) -> bool {
        matches!(self, Self::Address)
    }

    fn prefix(self) -> char {
        match self {
            Self::Bool => 'z',
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 'i',
            Self::F32 | Self::F64 => 'f',
            Self::Char16 => 'c',
            Self::Address => 'a',
        }
    }
}

/// A scalar layout.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueLayout {
    carrier: Carrier,
    order: ByteOrder,
    align: u64,
    name: Option<Box<str>>,
}

impl ValueLayout {
    pub const BOOL: Self = Self::natural(Carrier::Bool);
    pub const I8: Self = Self::natural(Carrier::I8);
    pub const I16: Self = Self::natural(Carrier::I16);
    pub const I32: Self = Self::natural(Carrier::I32);
    pub const I64: Self = Self::natural(Carrier::I64);
    pub const F32: Self = Self::natural(Carrier::F32);
    pub const F64: Self = Self::natural(Carrier::F64);
    pub const CHAR16: Self = Self::natural(Carrier::Char16);
    pub const ADDRESS: Self = Self::natural(Carrier::Address);

    const fn natural(carrier: Carrier) -> Self {
        Self {
            carrier,
            order: ByteOrder::NATIVE,
            align: carrier.byte_size(),
            name: None,
        }
    }

    pub fn carrier(&self) -> Carrier {
        self.carrier
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn byte_size(&self) -> u64 {
        self.carrier.byte_size()
    }

    pub fn byte_alignment(&self) -> u64 {
        self.align
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_name(mut self, name: impl Into<Box<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn with_byte_alignment(mut self, align: u64) -> Result<Self, LayoutError> {
        if !align.is_power_of_two() {
            return Err(LayoutError::InvalidAlignment(align));
        }
        self.align = align;
        Ok(self)
    }

    /// Same layout with byte alignment.
    pub fn unaligned(mut self) -> Self {
        self.align = 1;
        self
    }
}

impl fmt::Display for ValueLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.align != self.byte_size() {
            write!(f, "{}%", self.align)?;
        }
        let prefix = match self.order {
            ByteOrder::Little => self.carrier.prefix(),
            ByteOrder::Big => self.carrier.prefix().to_ascii_uppercase(),
        };
        write!(f, "{prefix}{}", self.byte_size() * 8)?;
        if let Some(name) = &self.name {
            write!(f, "({name})")?;
        }
        Ok(())
    }
}
