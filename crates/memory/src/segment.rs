use std::{fmt, ptr, sync::Arc};

use parking_lot::RwLock;
use sluice_layout::ValueLayout;

use crate::{ExecContext, MemoryAddress, MemoryError, Scope, ScopeFlags, Value};

/// What a segment's offsets are relative to.
#[derive(Clone)]
pub(crate) enum Base {
    /// Offsets are absolute native addresses.
    Native,
    /// Offsets index into a heap buffer.
    Heap(Arc<RwLock<Box<[u8]>>>),
}

impl Base {
    pub(crate) fn identity(&self) -> usize {
        match self {
            Self::Native => 0,
            Self::Heap(buf) => Arc::as_ptr(buf) as *const () as usize,
        }
    }

    pub(crate) fn heap_len(&self) -> Option<u64> {
        match self {
            Self::Native => None,
            Self::Heap(buf) => Some(buf.read().len() as u64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// A bounds-checked view of memory owned by a scope.
///
/// Every access checks the scope's liveness and the caller's context before
/// touching memory.
#[derive(Clone)]
pub struct MemorySegment {
    base: Base,
    min: u64,
    len: u64,
    scope: Scope,
}

impl MemorySegment {
    pub(crate) fn new(
        base: Base,
        min: u64,
        len: u64,
        scope: Scope,
    ) -> Result<Self, MemoryError> {
        if len > 0 {
            min.checked_add(len - 1).ok_or(MemoryError::Overflow)?;
        }
        Ok(Self {
            base,
            min,
            len,
            scope,
        })
    }

    pub(crate) fn native(address: u64, len: u64, scope: Scope) -> Result<Self, MemoryError> {
        Self::new(Base::Native, address, len, scope)
    }

    /// Views `len` bytes of native memory at `address` as a segment of `scope`.
    ///
    /// # Safety
    /// The memory must stay valid for reads and writes for as long as `scope`
    /// is alive.
    pub unsafe fn from_raw_parts(
        address: u64,
        len: u64,
        scope: Scope,
    ) -> Result<Self, MemoryError> {
        Self::native(address, len, scope)
    }

    /// A segment over a heap buffer. The segment keeps the buffer alive.
    pub fn of_bytes(scope: &Scope, bytes: impl Into<Vec<u8>>) -> Result<Self, MemoryError> {
        let bytes: Box<[u8]> = bytes.into().into_boxed_slice();
        let len = bytes.len() as u64;
        Self::new(Base::Heap(Arc::new(RwLock::new(bytes))), 0, len, scope.clone())
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn byte_size(&self) -> u64 {
        self.len
    }

    pub fn is_native(&self) -> bool {
        matches!(self.base, Base::Native)
    }

    pub fn address(&self) -> MemoryAddress {
        MemoryAddress::new(self.base.clone(), self.min, self.scope.clone())
    }

    /// Offset of `address` from the start of this segment, if the address
    /// points into it.
    pub fn offset_of(&self, address: &MemoryAddress) -> Option<u64> {
        if address.base_identity() != self.base.identity() {
            return None;
        }
        let offset = address.offset().checked_sub(self.min)?;
        (offset <= self.len).then_some(offset)
    }

    /// A view of `len` bytes starting at `offset` in the same scope.
    pub fn resize(&self, offset: u64, len: u64) -> Result<Self, MemoryError> {
        self.check_bounds(offset, len)?;
        Self::new(self.base.clone(), self.min + offset, len, self.scope.clone())
    }

    pub fn get(
        &self,
        cx: &ExecContext,
        layout: &ValueLayout,
        offset: u64,
    ) -> Result<Value, MemoryError> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..layout.byte_size() as usize];
        let (len, align) = (layout.byte_size(), layout.byte_alignment());
        self.access(cx, Access::Read, offset, len, align, |pos| self.copy_out(pos, buf))?;
        Ok(Value::decode(layout, buf))
    }

    pub fn set(
        &self,
        cx: &ExecContext,
        layout: &ValueLayout,
        offset: u64,
        value: Value,
    ) -> Result<(), MemoryError> {
        let mut buf = [0u8; 8];
        let buf = &mut buf[..layout.byte_size() as usize];
        value.encode(layout, buf)?;
        let (len, align) = (layout.byte_size(), layout.byte_alignment());
        self.access(cx, Access::Write, offset, len, align, |pos| self.copy_in(pos, buf))
    }

    pub fn read_bytes(
        &self,
        cx: &ExecContext,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<(), MemoryError> {
        self.access(cx, Access::Read, offset, dst.len() as u64, 1, |pos| {
            self.copy_out(pos, dst)
        })
    }

    pub fn write_bytes(
        &self,
        cx: &ExecContext,
        offset: u64,
        src: &[u8],
    ) -> Result<(), MemoryError> {
        self.access(cx, Access::Write, offset, src.len() as u64, 1, |pos| {
            self.copy_in(pos, src)
        })
    }

    pub fn fill(&self, cx: &ExecContext, byte: u8) -> Result<(), MemoryError> {
        self.access(cx, Access::Write, 0, self.len, 1, |pos| match &self.base {
            // SAFETY: bounds were checked and the scope is live.
            Base::Native => unsafe {
                ptr::write_bytes(pos as usize as *mut u8, byte, self.len as usize)
            },
            Base::Heap(buf) => {
                let pos = pos as usize;
                buf.write()[pos..pos + self.len as usize].fill(byte)
            }
        })
    }

    /// Copies all of `src` to the start of this segment.
    pub fn copy_from(&self, cx: &ExecContext, src: &MemorySegment) -> Result<(), MemoryError> {
        let bytes = src.to_bytes(cx)?;
        self.write_bytes(cx, 0, &bytes)
    }

    pub fn to_bytes(&self, cx: &ExecContext) -> Result<Vec<u8>, MemoryError> {
        let mut bytes = vec![0u8; self.len as usize];
        self.read_bytes(cx, 0, &mut bytes)?;
        Ok(bytes)
    }

    fn check_bounds(&self, offset: u64, length: u64) -> Result<(), MemoryError> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(MemoryError::OutOfBounds {
                offset,
                length,
                size: self.len,
            }),
        }
    }

    /// Validates an access and runs `f` with the absolute position of
    /// `offset` while the scope cannot be closed.
    fn access<R>(
        &self,
        cx: &ExecContext,
        mode: Access,
        offset: u64,
        length: u64,
        align: u64,
        f: impl FnOnce(u64) -> R,
    ) -> Result<R, MemoryError> {
        self.scope.with_live(cx, |flags| {
            if mode == Access::Write && flags.contains(ScopeFlags::IMMUTABLE) {
                return Err(MemoryError::ReadOnly(self.scope.id()));
            }
            self.check_bounds(offset, length)?;

            let pos = self.min + offset;
            if !flags.contains(ScopeFlags::UNALIGNED) && pos % align != 0 {
                return Err(MemoryError::Misaligned {
                    address: pos,
                    align,
                });
            }
            Ok(f(pos))
        })
    }

    fn copy_out(&self, pos: u64, dst: &mut [u8]) {
        match &self.base {
            // SAFETY: bounds were checked and the scope is live.
            Base::Native => unsafe {
                ptr::copy_nonoverlapping(pos as usize as *const u8, dst.as_mut_ptr(), dst.len())
            },
            Base::Heap(buf) => {
                let pos = pos as usize;
                dst.copy_from_slice(&buf.read()[pos..pos + dst.len()])
            }
        }
    }

    fn copy_in(&self, pos: u64, src: &[u8]) {
        match &self.base {
            // SAFETY: bounds were checked and the scope is live.
            Base::Native => unsafe {
                ptr::copy_nonoverlapping(src.as_ptr(), pos as usize as *mut u8, src.len())
            },
            Base::Heap(buf) => {
                let pos = pos as usize;
                buf.write()[pos..pos + src.len()].copy_from_slice(src)
            }
        }
    }
}

impl fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySegment")
            .field("address", &self.address())
            .field("len", &self.len)
            .field("scope", &self.scope)
            .finish()
    }
}
