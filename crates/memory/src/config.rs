use crate::MemoryError;

/// Every block and every allocation is aligned to at least this many bytes.
pub const MIN_ALIGNMENT: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionConfig {
    /// Size of the unit block a region bumps through.
    pub block_size: u64,
    /// Largest alignment an allocation may request.
    pub max_alignment: u64,
}

impl RegionConfig {
    pub fn validate(&self) -> Result<(), MemoryError> {
        if !self.max_alignment.is_power_of_two() || self.max_alignment < MIN_ALIGNMENT {
            return Err(MemoryError::InvalidConfig(
                "max_alignment must be a power of two no smaller than 8",
            ));
        }
        if self.block_size < self.max_alignment || self.block_size % MIN_ALIGNMENT != 0 {
            return Err(MemoryError::InvalidConfig(
                "block_size must be a multiple of 8 no smaller than max_alignment",
            ));
        }
        Ok(())
    }

    /// Requests at least this large get a block of their own.
    pub(crate) fn dedicated_threshold(&self) -> u64 {
        self.block_size / 2
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            block_size: 64 * 1024,
            max_alignment: 4096,
        }
    }
}
