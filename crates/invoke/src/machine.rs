//! Execution of native code over a [`NativeFrame`].
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use cranelift_entity::{entity_impl, EntityRef};
use dashmap::DashMap;
use tracing::trace;

use crate::{InvokeError, NativeFrame};

/// Native code as seen by a trampoline. The code may call back into the
/// trampoline that runs it, which is how native code reaches upcall stubs.
pub type NativeCode = Arc<dyn Fn(&dyn Trampoline, &mut NativeFrame) + Send + Sync>;

/// Enters native code with a prepared register image.
pub trait Trampoline: Send + Sync {
    /// Runs the code at `address`. Arguments are read from `frame` and
    /// results are left in its return registers.
    fn call(&self, address: u64, frame: &mut NativeFrame) -> Result<(), InvokeError>;

    /// Makes `code` callable and returns its address.
    fn install(&self, code: NativeCode) -> u64;

    /// Removes the code at `address`. Returns `false` if there was none.
    fn uninstall(&self, address: u64) -> bool;
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeId(u32);
entity_impl!(CodeId, "code");

const CODE_BASE: u64 = 0x7f00_0000_0000;
const CODE_ALIGN: u64 = 16;

impl CodeId {
    pub fn address(self) -> u64 {
        CODE_BASE + self.index() as u64 * CODE_ALIGN
    }

    pub fn from_address(address: u64) -> Option<Self> {
        let offset = address.checked_sub(CODE_BASE)?;
        if offset % CODE_ALIGN != 0 {
            return None;
        }
        let idx = u32::try_from(offset / CODE_ALIGN).ok()?;
        Some(Self::new(idx as usize))
    }
}

/// A software trampoline hosting Rust functions written against the
/// register image.
///
/// Functions get addresses in a range no real allocation uses, so an
/// address can be passed through native memory and called later.
#[derive(Default)]
pub struct Machine {
    code: DashMap<CodeId, NativeCode>,
    symbols: DashMap<Box<str>, CodeId>,
    next: AtomicU32,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `code` under `name` and returns its address. A later
    /// definition of the same name shadows the earlier one.
    pub fn define(
        &self,
        name: &str,
        code: impl Fn(&dyn Trampoline, &mut NativeFrame) + Send + Sync + 'static,
    ) -> u64 {
        let address = self.install(Arc::new(code));
        let id = CodeId::from_address(address).expect("machine addresses are code ids");
        self.symbols.insert(name.into(), id);
        address
    }

    pub fn lookup(&self, name: &str) -> Option<u64> {
        let id = *self.symbols.get(name)?;
        self.code.contains_key(&id).then(|| id.address())
    }

    /// Number of installed functions, upcall stubs included.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

impl Trampoline for Machine {
    fn call(&self, address: u64, frame: &mut NativeFrame) -> Result<(), InvokeError> {
        let code = CodeId::from_address(address)
            .and_then(|id| self.code.get(&id).map(|code| code.value().clone()))
            .ok_or(InvokeError::UnknownFunction(address))?;

        // The map guard is released here; the code may install or remove
        // entries.
        trace!(address = format_args!("{address:#x}"), "enter native code");
        code(self, frame);
        Ok(())
    }

    fn install(&self, code: NativeCode) -> u64 {
        let id = CodeId::new(self.next.fetch_add(1, Ordering::Relaxed) as usize);
        self.code.insert(id, code);
        trace!(%id, "install native code");
        id.address()
    }

    fn uninstall(&self, address: u64) -> bool {
        let removed = CodeId::from_address(address)
            .and_then(|id| self.code.remove(&id))
            .is_some();
        trace!(address = format_args!("{address:#x}"), removed, "uninstall native code");
        removed
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("code", &self.code.len())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}
