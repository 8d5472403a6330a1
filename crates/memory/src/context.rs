use std::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cx{}", self.0)
    }
}

/// An execution context: the identity confined scopes are bound to.
///
/// Every scope operation takes the caller's context explicitly. A context
/// cannot be sent to another thread, so a thread that wants to use memory
/// creates its own context and is rejected by scopes confined elsewhere.
#[derive(Debug)]
pub struct ExecContext {
    id: ContextId,
    _not_send: PhantomData<*const ()>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            _not_send: PhantomData,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_are_distinct() {
        let a = ExecContext::new();
        let b = ExecContext::new();
        assert_ne!(a.id(), b.id());
    }
}
