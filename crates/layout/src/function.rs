use std::{
    fmt,
    hash::{Hash, Hasher},
};

use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::{LayoutError, MemoryLayout};

/// Shape of a native function: argument layouts, an optional return layout
/// and, for variadic functions, the index of the first variadic argument.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionDescriptor {
    args: SmallVec<[MemoryLayout; 8]>,
    ret: Option<MemoryLayout>,
    first_variadic: Option<usize>,
}

impl FunctionDescriptor {
    pub fn of<I, L>(ret: impl Into<MemoryLayout>, args: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ret: Some(ret.into()),
            first_variadic: None,
        }
    }

    pub fn of_void<I, L>(args: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ret: None,
            first_variadic: None,
        }
    }

    /// Marks arguments from `index` onwards as variadic.
    ///
    /// `index` may equal the argument count, which describes a variadic
    /// function called with no variadic arguments.
    pub fn with_first_variadic(mut self, index: usize) -> Result<Self, LayoutError> {
        if index > self.args.len() {
            return Err(LayoutError::InvalidVariadicIndex {
                index,
                count: self.args.len(),
            });
        }
        self.first_variadic = Some(index);
        Ok(self)
    }

    pub fn args(&self) -> &[MemoryLayout] {
        &self.args
    }

    pub fn ret(&self) -> Option<&MemoryLayout> {
        self.ret.as_ref()
    }

    pub fn first_variadic(&self) -> Option<usize> {
        self.first_variadic
    }

    pub fn is_variadic(&self) -> bool {
        self.first_variadic.is_some()
    }

    pub fn is_variadic_arg(&self, idx: usize) -> bool {
        self.first_variadic.is_some_and(|first| idx >= first)
    }

    pub fn without_names(&self) -> Self {
        Self {
            args: self.args.iter().map(MemoryLayout::without_names).collect(),
            ret: self.ret.as_ref().map(MemoryLayout::without_names),
            first_variadic: self.first_variadic,
        }
    }

    /// A hash of the structure of the descriptor. Names are ignored.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.without_names().hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.first_variadic == Some(i) {
                write!(f, "...")?;
            }
            write!(f, "{arg}")?;
        }
        if self.first_variadic == Some(self.args.len()) {
            write!(f, "...")?;
        }
        write!(f, ")")?;
        match &self.ret {
            Some(ret) => write!(f, "{ret}"),
            None => write!(f, "v"),
        }
    }
}
