use std::sync::Arc;

use sluice_abi::{convention_for, Arrangement, CallConvention, Direction, SequenceCache};
use sluice_layout::FunctionDescriptor;
use sluice_memory::{ExecContext, MemoryAddress, Scope, ScopeRegistry};
use sluice_triple::TargetTriple;
use tracing::debug;

use crate::{
    upcall, DowncallHandle, InvokeError, LinkerConfig, ManagedValue, Trampoline, UpcallFn,
};

/// State shared by a linker and everything it hands out.
pub(crate) struct Runtime {
    pub(crate) conv: &'static dyn CallConvention,
    pub(crate) trampoline: Arc<dyn Trampoline>,
    pub(crate) cache: SequenceCache,
    pub(crate) config: LinkerConfig,
    pub(crate) global: Scope,
    pub(crate) unchecked: Scope,
}

/// Creates downcall handles and upcall stubs for one calling convention.
///
/// Arrangements are cached per function shape, so handles for the same
/// shape share their calling sequence and shuffle recipe.
#[derive(Clone)]
pub struct Linker {
    runtime: Arc<Runtime>,
}

impl Linker {
    pub fn new(
        registry: &ScopeRegistry,
        conv: &'static dyn CallConvention,
        trampoline: Arc<dyn Trampoline>,
        config: LinkerConfig,
    ) -> Self {
        debug!(conv = %conv.call_conv(), ?config, "linker");
        Self {
            runtime: Arc::new(Runtime {
                conv,
                trampoline,
                cache: SequenceCache::new(),
                config,
                global: registry.global(),
                unchecked: registry.unchecked(),
            }),
        }
    }

    /// A linker for the default C convention of `triple`.
    pub fn for_triple(
        registry: &ScopeRegistry,
        triple: &TargetTriple,
        trampoline: Arc<dyn Trampoline>,
        config: LinkerConfig,
    ) -> Result<Self, InvokeError> {
        let conv = convention_for(triple)?;
        Ok(Self::new(registry, conv, trampoline, config))
    }

    /// A linker for the default C convention of the host.
    pub fn for_host(
        registry: &ScopeRegistry,
        trampoline: Arc<dyn Trampoline>,
        config: LinkerConfig,
    ) -> Result<Self, InvokeError> {
        let host = TargetTriple::host().ok_or(InvokeError::UnsupportedHost)?;
        Self::for_triple(registry, &host, trampoline, config)
    }

    pub fn convention(&self) -> &'static dyn CallConvention {
        self.runtime.conv
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.runtime.config
    }

    /// The downcall arrangement of `descriptor`.
    pub fn arrange_call(
        &self,
        descriptor: &FunctionDescriptor,
    ) -> Result<Arc<Arrangement>, InvokeError> {
        Ok(self
            .runtime
            .cache
            .get_or_arrange(self.runtime.conv, descriptor, Direction::Downcall)?)
    }

    /// A handle calling the native function at `target`.
    ///
    /// The target's scope is checked on every call, so a handle to an upcall
    /// stub stops working once the stub's scope is closed.
    pub fn downcall_handle(
        &self,
        target: MemoryAddress,
        descriptor: &FunctionDescriptor,
    ) -> Result<DowncallHandle, InvokeError> {
        let arrangement = self.arrange_call(descriptor)?;
        debug!(target = %target, %descriptor, "downcall handle");
        Ok(DowncallHandle::new(self.runtime.clone(), target, arrangement))
    }

    /// Makes `target` callable from native code. The returned address
    /// belongs to `scope`; the stub is released when `scope` is closed.
    pub fn upcall_stub(
        &self,
        cx: &ExecContext,
        descriptor: &FunctionDescriptor,
        scope: &Scope,
        target: impl Fn(&ExecContext, &Scope, &[ManagedValue]) -> Result<Option<ManagedValue>, InvokeError>
            + Send
            + Sync
            + 'static,
    ) -> Result<MemoryAddress, InvokeError> {
        let target: UpcallFn = Arc::new(target);
        upcall::install_stub(&self.runtime, cx, target, descriptor, scope)
    }

    /// Number of cached arrangements, both directions included.
    pub fn cached_arrangements(&self) -> usize {
        self.runtime.cache.len()
    }
}

impl std::fmt::Debug for Linker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linker")
            .field("conv", &self.runtime.conv.call_conv())
            .field("config", &self.runtime.config)
            .field("cached", &self.runtime.cache.len())
            .finish()
    }
}
