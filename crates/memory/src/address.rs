use std::{fmt, hash};

use crate::{segment::Base, ExecContext, MemoryError, MemorySegment, Scope};

/// A location in memory: an absolute native address, or an offset into a
/// heap buffer. Two addresses are equal when they share a base and offset,
/// whatever their scopes.
#[derive(Clone)]
pub struct MemoryAddress {
    base: Base,
    offset: u64,
    scope: Scope,
}

impl MemoryAddress {
    pub(crate) fn new(base: Base, offset: u64, scope: Scope) -> Self {
        Self {
            base,
            offset,
            scope,
        }
    }

    /// A native address belonging to `scope`. Raw addresses coming back from
    /// native code usually belong to the registry's unchecked scope.
    pub fn native(address: u64, scope: Scope) -> Self {
        Self::new(Base::Native, address, scope)
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The absolute address for native memory, the buffer offset for heap
    /// memory.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_native(&self) -> bool {
        matches!(self.base, Base::Native)
    }

    pub fn is_null(&self) -> bool {
        self.is_native() && self.offset == 0
    }

    pub(crate) fn base_identity(&self) -> usize {
        self.base.identity()
    }

    pub fn add_offset(&self, delta: i64) -> Result<Self, MemoryError> {
        let offset = self
            .offset
            .checked_add_signed(delta)
            .ok_or(MemoryError::Overflow)?;
        Ok(Self::new(self.base.clone(), offset, self.scope.clone()))
    }

    /// The raw native address, after checking that `cx` may still use it.
    pub fn to_raw(&self, cx: &ExecContext) -> Result<u64, MemoryError> {
        if !self.is_native() {
            return Err(MemoryError::NotNative);
        }
        self.scope.check_access(cx)?;
        Ok(self.offset)
    }

    /// A segment of `byte_count` bytes starting at this address.
    ///
    /// # Safety
    /// For native addresses the memory must stay valid for reads and writes
    /// while the address's scope is alive. Heap addresses are bounds checked
    /// against their buffer.
    pub unsafe fn as_direct_view(&self, byte_count: u64) -> Result<MemorySegment, MemoryError> {
        if let Some(buf_len) = self.base.heap_len() {
            match self.offset.checked_add(byte_count) {
                Some(end) if end <= buf_len => {}
                _ => {
                    return Err(MemoryError::OutOfBounds {
                        offset: self.offset,
                        length: byte_count,
                        size: buf_len,
                    })
                }
            }
        }
        MemorySegment::new(self.base.clone(), self.offset, byte_count, self.scope.clone())
    }
}

impl PartialEq for MemoryAddress {
    fn eq(&self, other: &Self) -> bool {
        self.base.identity() == other.base.identity() && self.offset == other.offset
    }
}

impl Eq for MemoryAddress {}

impl hash::Hash for MemoryAddress {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.base.identity().hash(state);
        self.offset.hash(state);
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base {
            Base::Native => write!(f, "{:#x}", self.offset),
            Base::Heap(_) => write!(f, "heap@{:#x}+{}", self.base.identity(), self.offset),
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryAddress({self})")
    }
}
