use bitflags::bitflags;

use crate::MemoryError;

bitflags! {
    /// Characteristics of a scope, fixed when the scope is created.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScopeFlags: u32 {
        /// Only the creating execution context may use the scope.
        const CONFINED = 0x01;
        /// The scope can be neither closed nor merged.
        const PINNED = 0x02;
        /// Segments of the scope reject writes.
        const IMMUTABLE = 0x04;
        /// Accesses skip the alignment check.
        const UNALIGNED = 0x08;
        /// Accesses skip the liveness check. Only allowed together with `PINNED`.
        const UNCHECKED = 0x10;
    }
}

impl ScopeFlags {
    /// Builds flags from raw bits, rejecting unknown bits and combinations
    /// that could expose freed memory.
    pub fn parse(bits: u32) -> Result<Self, MemoryError> {
        let flags = Self::from_bits(bits)
            .ok_or(MemoryError::UnknownFlags(bits & !Self::all().bits()))?;
        flags.validate()?;
        Ok(flags)
    }

    pub(crate) fn validate(self) -> Result<(), MemoryError> {
        let unknown = self.bits() & !Self::all().bits();
        if unknown != 0 {
            return Err(MemoryError::UnknownFlags(unknown));
        }
        if self.contains(Self::UNCHECKED) && !self.contains(Self::PINNED) {
            return Err(MemoryError::InvalidFlags("UNCHECKED requires PINNED"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bits_are_rejected() {
        assert_eq!(ScopeFlags::parse(0x40), Err(MemoryError::UnknownFlags(0x40)));
        assert_eq!(
            ScopeFlags::parse(0x41),
            Err(MemoryError::UnknownFlags(0x40))
        );
        assert_eq!(
            ScopeFlags::parse(0x05),
            Ok(ScopeFlags::CONFINED | ScopeFlags::IMMUTABLE)
        );
    }

    #[test]
    fn unchecked_requires_pinned() {
        assert!(ScopeFlags::parse(0x10).is_err());
        assert_eq!(
            ScopeFlags::parse(0x12),
            Ok(ScopeFlags::PINNED | ScopeFlags::UNCHECKED)
        );
    }

    #[test]
    fn retained_unknown_bits_fail_validation() {
        let flags = ScopeFlags::from_bits_retain(0x41);
        assert_eq!(flags.validate(), Err(MemoryError::UnknownFlags(0x40)));
        assert_eq!(ScopeFlags::CONFINED.validate(), Ok(()));
    }
}
