/// What an upcall stub does when its managed target fails.
///
/// Failures are errors returned by the target, panics inside it, and return
/// values that do not match the return layout. They never unwind into native
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpcallFailurePolicy {
    /// Log the failure and abort the process.
    #[default]
    Abort,
    /// Log the failure and return zero in every return register.
    Sentinel,
}

#[derive(Debug, Clone, Default)]
pub struct LinkerConfig {
    pub upcall_failure: UpcallFailurePolicy,
}

impl LinkerConfig {
    pub fn with_upcall_failure(mut self, policy: UpcallFailurePolicy) -> Self {
        self.upcall_failure = policy;
        self
    }
}
