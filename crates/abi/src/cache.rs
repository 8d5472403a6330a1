use std::sync::Arc;

use dashmap::DashMap;
use sluice_layout::FunctionDescriptor;
use sluice_triple::CallConv;

use crate::{arrange, AbiError, CallConvention, CallingSequence, Direction, ShuffleRecipe};

/// A calling sequence together with the recipe derived from it.
#[derive(Debug)]
pub struct Arrangement {
    pub sequence: CallingSequence,
    pub recipe: ShuffleRecipe,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    conv: CallConv,
    direction: Direction,
    /// Names never change how a shape is passed, so they are stripped.
    descriptor: FunctionDescriptor,
}

/// Memoized arrangements, keyed by the structure of the function shape.
///
/// Safe to share between threads; concurrent misses on one shape may both
/// arrange it, and the first insertion wins.
#[derive(Debug, Default)]
pub struct SequenceCache {
    arrangements: DashMap<CacheKey, Arc<Arrangement>>,
}

impl SequenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_arrange(
        &self,
        conv: &'static dyn CallConvention,
        descriptor: &FunctionDescriptor,
        direction: Direction,
    ) -> Result<Arc<Arrangement>, AbiError> {
        let key = CacheKey {
            conv: conv.call_conv(),
            direction,
            descriptor: descriptor.without_names(),
        };
        if let Some(hit) = self.arrangements.get(&key) {
            return Ok(hit.clone());
        }

        let sequence = arrange(conv, &key.descriptor, direction)?;
        let recipe = ShuffleRecipe::for_sequence(&sequence);
        let arrangement = Arc::new(Arrangement { sequence, recipe });
        Ok(self
            .arrangements
            .entry(key)
            .or_insert(arrangement)
            .value()
            .clone())
    }

    pub fn len(&self) -> usize {
        self.arrangements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrangements.is_empty()
    }

    pub fn clear(&self) {
        self.arrangements.clear();
    }
}

#[cfg(test)]
mod tests {
    use sluice_layout::{MemoryLayout, ValueLayout};

    use super::*;
    use crate::win64::Win64;

    static WIN64: Win64 = Win64;

    #[test]
    fn names_do_not_split_entries() {
        let cache = SequenceCache::new();
        let point = |x: &str, y: &str| {
            MemoryLayout::struct_of([ValueLayout::I32.with_name(x), ValueLayout::I32.with_name(y)])
                .with_name("point")
        };

        let a = FunctionDescriptor::of_void([point("x", "y")]);
        let b = FunctionDescriptor::of_void([point("u", "v")]);
        let first = cache.get_or_arrange(&WIN64, &a, Direction::Downcall).unwrap();
        let second = cache.get_or_arrange(&WIN64, &b, Direction::Downcall).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        cache.get_or_arrange(&WIN64, &a, Direction::Upcall).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = SequenceCache::new();
        let desc = FunctionDescriptor::of(MemoryLayout::sequence_of(4, ValueLayout::I32), [ValueLayout::I32]);
        assert!(cache.get_or_arrange(&WIN64, &desc, Direction::Downcall).is_err());
        assert!(cache.is_empty());
    }
}
