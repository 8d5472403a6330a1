//! Bump allocation over blocks of raw memory.
//!
//! A [`RegionAllocator`] hands out memory from a current unit block and never
//! frees individual allocations. Exhausted blocks are kept until the whole
//! region is freed at once.
use std::{
    alloc::{self, Layout},
    fmt,
    ptr::NonNull,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::{trace, warn};

use crate::{config::MIN_ALIGNMENT, MemoryError, RegionConfig};

/// A zeroed chunk of memory obtained from the system allocator.
pub struct Block {
    ptr: NonNull<u8>,
    size: u64,
    /// Bytes handed out from the block so far.
    used: u64,
}

// The block exclusively owns its allocation.
unsafe impl Send for Block {}
unsafe impl Sync for Block {}

impl Block {
    pub fn allocate(size: u64) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize(size));
        }
        let layout = usize::try_from(size)
            .ok()
            .and_then(|size| Layout::from_size_align(size, MIN_ALIGNMENT as usize).ok())
            .ok_or(MemoryError::OutOfMemory(size))?;

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(MemoryError::OutOfMemory(size))?;
        Ok(Self { ptr, size, used: 0 })
    }

    pub fn base(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    fn at(&self, offset: u64) -> NonNull<u8> {
        debug_assert!(offset < self.size);
        // SAFETY: `offset` is inside the allocation, so the result is non-null.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset as usize)) }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: the same layout was accepted by `Block::allocate`.
        unsafe {
            let layout =
                Layout::from_size_align_unchecked(self.size as usize, MIN_ALIGNMENT as usize);
            alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("size", &self.size)
            .field("used", &self.used)
            .finish()
    }
}

/// Where regions get their blocks from.
pub trait BlockSource: Send + Sync {
    fn acquire(&self, size: u64) -> Result<Block, MemoryError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBlocks;

impl BlockSource for SystemBlocks {
    fn acquire(&self, size: u64) -> Result<Block, MemoryError> {
        Block::allocate(size)
    }
}

/// A block source with a fixed budget of bytes.
///
/// Acquisitions past the budget fail with [`MemoryError::OutOfMemory`].
/// Dropped blocks are not credited back.
#[derive(Debug)]
pub struct LimitedBlocks {
    limit: u64,
    acquired: AtomicU64,
}

impl LimitedBlocks {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            acquired: AtomicU64::new(0),
        }
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Acquire)
    }
}

impl BlockSource for LimitedBlocks {
    fn acquire(&self, size: u64) -> Result<Block, MemoryError> {
        self.acquired
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |acquired| {
                acquired.checked_add(size).filter(|&total| total <= self.limit)
            })
            .map_err(|_| MemoryError::OutOfMemory(size))?;
        Block::allocate(size)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionStats {
    pub blocks: usize,
    /// Bytes obtained from the block source.
    pub reserved_bytes: u64,
    /// Bytes handed out, including alignment padding.
    pub used_bytes: u64,
}

/// State to restore when a block switch fails half way.
#[derive(Debug, Clone, Copy)]
struct Origin {
    free_offset: u64,
    used: usize,
}

pub struct RegionAllocator {
    config: RegionConfig,
    source: Arc<dyn BlockSource>,
    current: Option<Block>,
    free_offset: u64,
    used: Vec<Block>,
}

impl RegionAllocator {
    pub fn new(config: RegionConfig, source: Arc<dyn BlockSource>) -> Self {
        Self {
            config,
            source,
            current: None,
            free_offset: 0,
            used: Vec::new(),
        }
    }

    /// Offset of the bump cursor in the current block.
    pub fn free_offset(&self) -> u64 {
        self.free_offset
    }

    pub fn allocate(&mut self, size: u64, align: u64) -> Result<NonNull<u8>, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize(size));
        }
        if !align.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(align));
        }
        if align > self.config.max_alignment {
            return Err(MemoryError::AlignmentTooLarge {
                align,
                max: self.config.max_alignment,
            });
        }
        let align = align.max(MIN_ALIGNMENT);

        if let Some(ptr) = self.bump(size, align) {
            return Ok(ptr);
        }

        // Blocks are only 8-byte aligned, so reserve room to round up.
        let padded = size
            .checked_add(align - 1)
            .ok_or(MemoryError::OutOfMemory(size))?;

        if padded >= self.config.dedicated_threshold() {
            let mut block = self.source.acquire(padded)?;
            let start = align_offset(block.base(), align);
            block.used = padded;
            let ptr = block.at(start);
            trace!(size, align, block = block.size(), "dedicated block");
            self.used.push(block);
            return Ok(ptr);
        }

        let origin = self.origin();
        self.retire();
        match self.source.acquire(self.config.block_size) {
            Ok(block) => {
                trace!(size = block.size(), "new unit block");
                self.current = Some(block);
                self.free_offset = 0;
            }
            Err(err) => {
                self.rollback(origin);
                warn!(size, align, %err, "block switch rolled back");
                return Err(err);
            }
        }

        Ok(self
            .bump(size, align)
            .expect("a fresh unit block must fit a small request"))
    }

    fn bump(&mut self, size: u64, align: u64) -> Option<NonNull<u8>> {
        let block = self.current.as_mut()?;
        let start = self.free_offset + align_offset(block.base() + self.free_offset, align);
        let end = start.checked_add(size)?;
        if end > block.size() {
            return None;
        }

        self.free_offset = end;
        block.used = end;
        trace!(size, align, offset = start, "bump");
        Some(block.at(start))
    }

    fn retire(&mut self) {
        if let Some(mut block) = self.current.take() {
            block.used = self.free_offset;
            self.used.push(block);
        }
        self.free_offset = 0;
    }

    fn origin(&self) -> Origin {
        Origin {
            free_offset: self.free_offset,
            used: self.used.len(),
        }
    }

    fn rollback(&mut self, origin: Origin) {
        if self.used.len() > origin.used {
            self.current = self.used.pop();
        }
        self.free_offset = origin.free_offset;
    }

    /// Takes over every block of `other`.
    pub fn absorb(&mut self, mut other: RegionAllocator) {
        other.retire();
        self.used.append(&mut other.used);
    }

    /// Releases every block at once and returns what was held.
    pub fn free(&mut self) -> RegionStats {
        let stats = self.stats();
        self.current = None;
        self.used.clear();
        self.free_offset = 0;
        stats
    }

    pub fn stats(&self) -> RegionStats {
        self.used
            .iter()
            .chain(self.current.as_ref())
            .fold(RegionStats::default(), |stats, block| RegionStats {
                blocks: stats.blocks + 1,
                reserved_bytes: stats.reserved_bytes + block.size(),
                used_bytes: stats.used_bytes + block.used(),
            })
    }
}

impl fmt::Debug for RegionAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionAllocator")
            .field("config", &self.config)
            .field("current", &self.current)
            .field("free_offset", &self.free_offset)
            .field("used", &self.used)
            .finish()
    }
}

fn align_offset(addr: u64, align: u64) -> u64 {
    (align - addr % align) % align
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(source: Arc<dyn BlockSource>) -> RegionAllocator {
        RegionAllocator::new(RegionConfig::default(), source)
    }

    #[test]
    fn bump_allocations_do_not_overlap() {
        let mut region = region(Arc::new(SystemBlocks));
        let a = region.allocate(3, 1).unwrap().as_ptr() as u64;
        let b = region.allocate(16, 16).unwrap().as_ptr() as u64;
        let c = region.allocate(1, 1).unwrap().as_ptr() as u64;

        assert_eq!(a % MIN_ALIGNMENT, 0);
        assert_eq!(b % 16, 0);
        assert!(a + 3 <= b);
        assert!(b + 16 <= c);
        assert_eq!(region.stats().blocks, 1);
    }

    #[test]
    fn invalid_requests() {
        let mut region = region(Arc::new(SystemBlocks));
        assert_eq!(region.allocate(0, 8), Err(MemoryError::InvalidSize(0)));
        assert_eq!(region.allocate(8, 3), Err(MemoryError::InvalidAlignment(3)));
        assert_eq!(
            region.allocate(8, 8192),
            Err(MemoryError::AlignmentTooLarge {
                align: 8192,
                max: 4096
            })
        );
        assert_eq!(region.stats(), RegionStats::default());
    }

    #[test]
    fn large_requests_get_a_dedicated_block() {
        let mut region = region(Arc::new(SystemBlocks));
        region.allocate(16, 8).unwrap();
        let offset = region.free_offset();

        let big = region.allocate(100 * 1024, 4096).unwrap().as_ptr() as u64;
        assert_eq!(big % 4096, 0);
        assert_eq!(region.free_offset(), offset);
        assert_eq!(region.stats().blocks, 2);
    }

    #[test]
    fn full_block_is_retired() {
        let mut region = region(Arc::new(SystemBlocks));
        for _ in 0..3 {
            region.allocate(25 * 1024, 8).unwrap();
        }
        let stats = region.stats();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.reserved_bytes, 128 * 1024);
        assert_eq!(stats.used_bytes, 75 * 1024);
        assert_eq!(region.free_offset(), 25 * 1024);
    }

    #[test]
    fn failed_block_switch_rolls_back() {
        let source = Arc::new(LimitedBlocks::new(64 * 1024));
        let mut region = region(source.clone());

        region.allocate(30 * 1024, 8).unwrap();
        region.allocate(30 * 1024, 8).unwrap();
        let offset = region.free_offset();

        let err = region.allocate(8 * 1024, 8).unwrap_err();
        assert_eq!(err, MemoryError::OutOfMemory(64 * 1024));
        assert_eq!(region.free_offset(), offset);
        assert_eq!(region.stats().blocks, 1);

        // The current block is still usable after the rollback.
        region.allocate(1024, 8).unwrap();
        assert_eq!(region.free_offset(), offset + 1024);
        assert_eq!(source.acquired(), 64 * 1024);
    }

    #[test]
    fn absorb_and_free() {
        let mut parent = region(Arc::new(SystemBlocks));
        let mut child = region(Arc::new(SystemBlocks));
        parent.allocate(8, 8).unwrap();
        child.allocate(8, 8).unwrap();
        child.allocate(100 * 1024, 8).unwrap();

        parent.absorb(child);
        assert_eq!(parent.stats().blocks, 3);

        let released = parent.free();
        assert_eq!(released.blocks, 3);
        assert_eq!(parent.stats(), RegionStats::default());
    }
}
