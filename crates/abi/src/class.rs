use std::fmt;

/// How an argument or return value travels between caller and callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentClass {
    /// A scalar in an integer register.
    Integer,
    /// An address in an integer register.
    Pointer,
    /// A scalar in a vector register.
    Float,
    /// An aggregate packed into integer registers.
    StructRegister,
    /// An aggregate copied by the caller and passed by address.
    StructReference,
    /// A variadic float; may need a duplicate in an integer register.
    VarargFloat,
    /// A return value written through a hidden pointer argument.
    Memory,
}

impl ArgumentClass {
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Self::StructRegister | Self::StructReference | Self::Memory
        )
    }
}

impl fmt::Display for ArgumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "INTEGER",
            Self::Pointer => "POINTER",
            Self::Float => "FLOAT",
            Self::StructRegister => "STRUCT_REGISTER",
            Self::StructReference => "STRUCT_REFERENCE",
            Self::VarargFloat => "VARARG_FLOAT",
            Self::Memory => "MEMORY",
        };
        f.pad(s)
    }
}
