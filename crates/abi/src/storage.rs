use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    Integer,
    Vector,
}

/// A physical location a word of an argument is passed in.
///
/// Stack offsets are relative to the start of the outgoing argument area,
/// shadow space included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    Reg { class: RegClass, index: u8 },
    Stack { offset: u32 },
}

impl Storage {
    pub fn int(index: u8) -> Self {
        Self::Reg {
            class: RegClass::Integer,
            index,
        }
    }

    pub fn vec(index: u8) -> Self {
        Self::Reg {
            class: RegClass::Vector,
            index,
        }
    }

    pub fn stack(offset: u32) -> Self {
        Self::Stack { offset }
    }

    pub fn reg_class(self) -> Option<RegClass> {
        match self {
            Self::Reg { class, .. } => Some(class),
            Self::Stack { .. } => None,
        }
    }

    pub fn kind(self) -> StorageKind {
        match self {
            Self::Reg {
                class: RegClass::Integer,
                ..
            } => StorageKind::Integer,
            Self::Reg {
                class: RegClass::Vector,
                ..
            } => StorageKind::Vector,
            Self::Stack { .. } => StorageKind::Stack,
        }
    }
}

/// Storage grouped the way bindings are queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKind {
    Integer,
    Vector,
    Stack,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Vector => write!(f, "vector"),
            Self::Stack => write!(f, "stack"),
        }
    }
}
