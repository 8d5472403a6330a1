//! Scopes own regions and decide when their memory may be touched.
//!
//! All scopes created from one [`ScopeRegistry`] live in a single arena of
//! scope records guarded by a read-write lock. Accesses hold the read lock
//! for the duration of the liveness check and the access itself, while
//! allocation and the terminal operations take the write lock. A close can
//! therefore never free memory underneath a running access.
//!
//! Records of closed scopes are reused by later forks. Each record carries a
//! generation that is bumped on reuse, and handles remember the generation
//! they were created in, so a handle to a closed scope keeps reporting it as
//! closed after its record has been handed to another scope.
use std::{fmt, hash, mem, sync::Arc};

use cranelift_entity::{entity_impl, PrimaryMap};
use indexmap::IndexSet;
use parking_lot::RwLock;
use sluice_layout::MemoryLayout;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{
    region::{BlockSource, RegionAllocator, RegionStats, SystemBlocks},
    ContextId, ExecContext, MemoryError, MemorySegment, RegionConfig, ScopeFlags,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u32);
entity_impl!(ScopeId, "scope");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeState {
    Alive,
    Closed,
    /// Memory and children were handed to the parent.
    Merged,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Alive => "alive",
            Self::Closed => "closed",
            Self::Merged => "merged",
        };
        write!(f, "{s}")
    }
}

pub type CloseAction = Box<dyn FnOnce() + Send + Sync>;

/// A record slot and the generation of the scope occupying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ScopeKey {
    id: ScopeId,
    generation: u32,
}

struct ScopeData {
    generation: u32,
    flags: ScopeFlags,
    state: ScopeState,
    owner: Option<ContextId>,
    parent: Option<ScopeKey>,
    /// Children are always alive, so their current generation is implied.
    children: IndexSet<ScopeId>,
    region: RegionAllocator,
    close_actions: Vec<CloseAction>,
}

struct ScopeStore {
    scopes: PrimaryMap<ScopeId, ScopeData>,
    /// Closed records waiting to be reused.
    free: Vec<ScopeId>,
    config: RegionConfig,
    source: Arc<dyn BlockSource>,
}

fn closed(id: ScopeId) -> MemoryError {
    MemoryError::NotAlive {
        scope: id,
        state: ScopeState::Closed,
    }
}

impl ScopeStore {
    fn make_scope(
        &mut self,
        flags: ScopeFlags,
        owner: Option<ContextId>,
        parent: Option<ScopeKey>,
    ) -> ScopeKey {
        if let Some(id) = self.free.pop() {
            let data = &mut self.scopes[id];
            debug_assert!(data.children.is_empty() && data.close_actions.is_empty());
            data.generation = data.generation.wrapping_add(1);
            data.flags = flags;
            data.state = ScopeState::Alive;
            data.owner = owner;
            data.parent = parent;
            return ScopeKey {
                id,
                generation: data.generation,
            };
        }

        let region = RegionAllocator::new(self.config, self.source.clone());
        let id = self.scopes.push(ScopeData {
            generation: 0,
            flags,
            state: ScopeState::Alive,
            owner,
            parent,
            children: IndexSet::new(),
            region,
            close_actions: Vec::new(),
        });
        ScopeKey { id, generation: 0 }
    }

    /// The record of `key`, unless it has been reused by a later scope.
    fn get(&self, key: ScopeKey) -> Option<&ScopeData> {
        let data = &self.scopes[key.id];
        (data.generation == key.generation).then_some(data)
    }

    fn key_of(&self, id: ScopeId) -> ScopeKey {
        ScopeKey {
            id,
            generation: self.scopes[id].generation,
        }
    }

    /// Confinement always applies, even to unchecked scopes.
    fn check_live(&self, key: ScopeKey, cx: &ExecContext) -> Result<(), MemoryError> {
        let data = self.get(key).ok_or_else(|| closed(key.id))?;
        match data.owner {
            Some(owner) if owner != cx.id() => return Err(MemoryError::WrongContext(key.id)),
            _ => {}
        }

        if data.flags.contains(ScopeFlags::UNCHECKED) {
            return Ok(());
        }
        match data.state {
            ScopeState::Alive => Ok(()),
            ScopeState::Closed => Err(closed(key.id)),
            ScopeState::Merged => {
                let parent = data.parent.expect("merged scope without a parent");
                self.check_live(parent, cx)
            }
        }
    }

    fn is_alive(&self, key: ScopeKey) -> bool {
        let Some(data) = self.get(key) else {
            return false;
        };
        if data.flags.contains(ScopeFlags::UNCHECKED) {
            return true;
        }
        match data.state {
            ScopeState::Alive => true,
            ScopeState::Closed => false,
            ScopeState::Merged => data.parent.is_some_and(|parent| self.is_alive(parent)),
        }
    }

    fn require_alive(&self, key: ScopeKey) -> Result<(), MemoryError> {
        match self.get(key).map(|data| data.state) {
            Some(ScopeState::Alive) => Ok(()),
            Some(state) => Err(MemoryError::NotAlive { scope: key.id, state }),
            None => Err(closed(key.id)),
        }
    }

    fn check_terminal(&self, key: ScopeKey) -> Result<(), MemoryError> {
        self.require_alive(key)?;
        if self.scopes[key.id].flags.contains(ScopeFlags::PINNED) {
            return Err(MemoryError::Pinned(key.id));
        }
        Ok(())
    }

    /// Descendants of `root` followed by `root`, children before parents.
    fn subtree_post_order(&self, root: ScopeId) -> SmallVec<[ScopeId; 8]> {
        let mut order = SmallVec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            stack.extend(self.scopes[id].children.iter().rev().map(|&c| (c, false)));
        }
        order
    }

    /// Closes the alive scope `root` and its subtree and queues their
    /// records for reuse.
    fn close_subtree(&mut self, root: ScopeId) -> Vec<CloseAction> {
        if let Some(parent) = self.scopes[root].parent {
            self.scopes[parent.id].children.shift_remove(&root);
        }

        let mut actions = Vec::new();
        for id in self.subtree_post_order(root) {
            let data = &mut self.scopes[id];
            data.state = ScopeState::Closed;
            data.children.clear();
            let released = data.region.free();
            actions.extend(data.close_actions.drain(..).rev());
            self.free.push(id);
            debug!(
                scope = %id,
                blocks = released.blocks,
                bytes = released.reserved_bytes,
                "close"
            );
        }
        actions
    }

    /// Merged records stay in place, since handles to them resolve liveness
    /// through their parent.
    fn merge_into_parent(&mut self, id: ScopeId) -> ScopeKey {
        let empty = RegionAllocator::new(self.config, self.source.clone());
        let data = &mut self.scopes[id];
        let parent = data.parent.expect("unpinned scope without a parent");
        data.state = ScopeState::Merged;
        let region = mem::replace(&mut data.region, empty);
        let children = mem::take(&mut data.children);
        let actions = mem::take(&mut data.close_actions);

        for &child in &children {
            self.scopes[child].parent = Some(parent);
        }

        let parent_data = &mut self.scopes[parent.id];
        parent_data.region.absorb(region);
        parent_data.children.shift_remove(&id);
        parent_data.children.extend(children);
        parent_data.close_actions.extend(actions);
        parent
    }
}

/// Owner of every scope record. Dropping the registry and every [`Scope`]
/// handle releases all remaining memory without running close actions.
pub struct ScopeRegistry {
    store: Arc<RwLock<ScopeStore>>,
    global: ScopeKey,
    unchecked: ScopeKey,
}

impl ScopeRegistry {
    pub fn new(config: RegionConfig) -> Result<Self, MemoryError> {
        Self::with_source(config, Arc::new(SystemBlocks))
    }

    pub fn with_source(
        config: RegionConfig,
        source: Arc<dyn BlockSource>,
    ) -> Result<Self, MemoryError> {
        config.validate()?;

        let mut store = ScopeStore {
            scopes: PrimaryMap::new(),
            free: Vec::new(),
            config,
            source,
        };
        let global = store.make_scope(ScopeFlags::PINNED, None, None);
        let unchecked =
            store.make_scope(ScopeFlags::PINNED | ScopeFlags::UNCHECKED, None, None);

        Ok(Self {
            store: Arc::new(RwLock::new(store)),
            global,
            unchecked,
        })
    }

    /// The pinned root scope.
    pub fn global(&self) -> Scope {
        Scope::new(self.store.clone(), self.global, ScopeFlags::PINNED, None)
    }

    /// The pinned root scope whose accesses are never liveness checked.
    pub fn unchecked(&self) -> Scope {
        Scope::new(
            self.store.clone(),
            self.unchecked,
            ScopeFlags::PINNED | ScopeFlags::UNCHECKED,
            None,
        )
    }

    /// Number of scope records, including closed ones waiting for reuse.
    pub fn records(&self) -> usize {
        self.store.read().scopes.len()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read();
        f.debug_struct("ScopeRegistry")
            .field("scopes", &store.scopes.len())
            .field("free", &store.free.len())
            .finish()
    }
}

/// A handle to one scope.
///
/// Flags and owner never change, so the handle keeps its own copy. This lets
/// confinement be enforced even after the scope's record has been reused.
#[derive(Clone)]
pub struct Scope {
    store: Arc<RwLock<ScopeStore>>,
    key: ScopeKey,
    flags: ScopeFlags,
    owner: Option<ContextId>,
}

impl Scope {
    fn new(
        store: Arc<RwLock<ScopeStore>>,
        key: ScopeKey,
        flags: ScopeFlags,
        owner: Option<ContextId>,
    ) -> Self {
        Self {
            store,
            key,
            flags,
            owner,
        }
    }

    pub fn id(&self) -> ScopeId {
        self.key.id
    }

    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }

    pub fn state(&self) -> ScopeState {
        self.store
            .read()
            .get(self.key)
            .map_or(ScopeState::Closed, |data| data.state)
    }

    /// Returns `true` if memory of the scope may still be accessed. A merged
    /// scope is alive as long as the scope it was merged into is.
    pub fn is_alive(&self) -> bool {
        self.store.read().is_alive(self.key)
    }

    pub fn owner(&self) -> Option<ContextId> {
        self.owner
    }

    pub fn parent(&self) -> Option<Scope> {
        let store = self.store.read();
        let parent = store.get(self.key)?.parent?;
        store.get(parent)?;
        Some(self.sibling(&store, parent))
    }

    pub fn children(&self) -> Vec<Scope> {
        let store = self.store.read();
        let Some(data) = store.get(self.key) else {
            return Vec::new();
        };
        data.children
            .iter()
            .map(|&child| self.sibling(&store, store.key_of(child)))
            .collect()
    }

    pub fn stats(&self) -> RegionStats {
        self.store
            .read()
            .get(self.key)
            .map_or_else(RegionStats::default, |data| data.region.stats())
    }

    /// Checks that `cx` may access memory of this scope right now.
    pub fn check_access(&self, cx: &ExecContext) -> Result<(), MemoryError> {
        self.check_live(&self.store.read(), cx)
    }

    /// Runs `f` with the scope's flags while the scope is known to be live.
    pub(crate) fn with_live<R>(
        &self,
        cx: &ExecContext,
        f: impl FnOnce(ScopeFlags) -> Result<R, MemoryError>,
    ) -> Result<R, MemoryError> {
        let store = self.store.read();
        self.check_live(&store, cx)?;
        f(self.flags)
    }

    pub fn fork(&self, cx: &ExecContext, flags: ScopeFlags) -> Result<Scope, MemoryError> {
        flags.validate()?;

        let mut store = self.store.write();
        self.check_live(&store, cx)?;
        store.require_alive(self.key)?;

        let owner = flags.contains(ScopeFlags::CONFINED).then(|| cx.id());
        let child = store.make_scope(flags, owner, Some(self.key));
        store.scopes[self.key.id].children.insert(child.id);
        debug!(parent = %self.key.id, scope = %child.id, ?flags, "fork");

        Ok(Scope::new(self.store.clone(), child, flags, owner))
    }

    pub fn allocate(
        &self,
        cx: &ExecContext,
        size: u64,
        align: u64,
    ) -> Result<MemorySegment, MemoryError> {
        let ptr = {
            let mut store = self.store.write();
            self.check_live(&store, cx)?;
            store.require_alive(self.key)?;
            store.scopes[self.key.id].region.allocate(size, align)?
        };
        trace!(scope = %self.key.id, size, align, "allocate");

        MemorySegment::native(ptr.as_ptr() as u64, size, self.clone())
    }

    /// Allocates zeroed memory shaped like `layout`.
    pub fn allocate_layout(
        &self,
        cx: &ExecContext,
        layout: &MemoryLayout,
    ) -> Result<MemorySegment, MemoryError> {
        self.allocate(cx, layout.byte_size()?, layout.byte_alignment())
    }

    pub fn allocate_array(
        &self,
        cx: &ExecContext,
        element: &MemoryLayout,
        count: u64,
    ) -> Result<MemorySegment, MemoryError> {
        self.allocate_layout(cx, &MemoryLayout::sequence_of(count, element.clone()))
    }

    /// Registers `action` to run when the scope, or the scope it is merged
    /// into, is closed. Actions run in reverse registration order.
    pub fn add_close_action(
        &self,
        cx: &ExecContext,
        action: impl FnOnce() + Send + Sync + 'static,
    ) -> Result<(), MemoryError> {
        let mut store = self.store.write();
        self.check_live(&store, cx)?;
        store.require_alive(self.key)?;
        store.scopes[self.key.id]
            .close_actions
            .push(Box::new(action));
        Ok(())
    }

    /// Closes the scope and every descendant, freeing their memory and
    /// running their close actions.
    pub fn close(&self, cx: &ExecContext) -> Result<(), MemoryError> {
        let actions = {
            let mut store = self.store.write();
            self.check_confined(cx)?;
            store.check_terminal(self.key)?;
            store.close_subtree(self.key.id)
        };

        // Actions may use other scopes of the registry.
        for action in actions {
            action();
        }
        Ok(())
    }

    /// Hands memory, children and close actions over to the parent.
    pub fn merge(&self, cx: &ExecContext) -> Result<(), MemoryError> {
        let mut store = self.store.write();
        self.check_confined(cx)?;
        store.check_terminal(self.key)?;
        if let Some(parent) = store.scopes[self.key.id].parent {
            store.check_live(parent, cx)?;
        }

        let parent = store.merge_into_parent(self.key.id);
        debug!(scope = %self.key.id, parent = %parent.id, "merge");
        Ok(())
    }

    fn check_confined(&self, cx: &ExecContext) -> Result<(), MemoryError> {
        match self.owner {
            Some(owner) if owner != cx.id() => Err(MemoryError::WrongContext(self.key.id)),
            _ => Ok(()),
        }
    }

    fn check_live(&self, store: &ScopeStore, cx: &ExecContext) -> Result<(), MemoryError> {
        self.check_confined(cx)?;
        store.check_live(self.key, cx)
    }

    fn sibling(&self, store: &ScopeStore, key: ScopeKey) -> Scope {
        let data = &store.scopes[key.id];
        Scope::new(self.store.clone(), key, data.flags, data.owner)
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store) && self.key == other.key
    }
}

impl Eq for Scope {}

impl hash::Hash for Scope {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.store).hash(state);
        self.key.hash(state);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope({})", self.key.id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sluice_layout::ValueLayout;

    use super::*;
    use crate::{ErrorKind, LimitedBlocks};

    fn registry() -> ScopeRegistry {
        ScopeRegistry::new(RegionConfig::default()).unwrap()
    }

    #[test]
    fn roots_are_pinned() {
        let cx = ExecContext::new();
        let registry = registry();
        let global = registry.global();

        assert_eq!(global.close(&cx), Err(MemoryError::Pinned(global.id())));
        assert_eq!(global.merge(&cx), Err(MemoryError::Pinned(global.id())));
        assert!(registry.unchecked().flags().contains(ScopeFlags::UNCHECKED));
        assert!(global.parent().is_none());
    }

    #[test]
    fn close_is_recursive() {
        let cx = ExecContext::new();
        let registry = registry();
        let parent = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        let child = parent.fork(&cx, ScopeFlags::empty()).unwrap();
        let grandchild = child.fork(&cx, ScopeFlags::empty()).unwrap();
        grandchild.allocate(&cx, 64, 8).unwrap();

        parent.close(&cx).unwrap();
        for scope in [&parent, &child, &grandchild] {
            assert_eq!(scope.state(), ScopeState::Closed);
            assert!(!scope.is_alive());
            assert_eq!(scope.stats(), RegionStats::default());
        }
        assert!(registry.global().children().is_empty());

        let err = grandchild.allocate(&cx, 8, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(
            parent.close(&cx),
            Err(MemoryError::NotAlive {
                scope: parent.id(),
                state: ScopeState::Closed
            })
        );
    }

    #[test]
    fn merge_transfers_ownership() {
        let cx = ExecContext::new();
        let registry = registry();
        let parent = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        let child = parent.fork(&cx, ScopeFlags::empty()).unwrap();
        let grandchild = child.fork(&cx, ScopeFlags::empty()).unwrap();
        child.allocate(&cx, 128, 8).unwrap();

        child.merge(&cx).unwrap();
        assert_eq!(child.state(), ScopeState::Merged);
        assert!(child.is_alive());
        assert_eq!(parent.stats().blocks, 1);
        assert_eq!(grandchild.parent(), Some(parent.clone()));
        assert_eq!(parent.children(), vec![grandchild.clone()]);

        // Merged scopes reject allocation and terminal operations.
        assert!(child.allocate(&cx, 8, 8).is_err());
        assert_eq!(
            child.close(&cx),
            Err(MemoryError::NotAlive {
                scope: child.id(),
                state: ScopeState::Merged
            })
        );

        parent.close(&cx).unwrap();
        assert!(!child.is_alive());
        assert!(!grandchild.is_alive());
    }

    #[test]
    fn close_actions_run_children_first() {
        let cx = ExecContext::new();
        let registry = registry();
        let parent = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        let child = parent.fork(&cx, ScopeFlags::empty()).unwrap();

        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for (scope, name) in [(&parent, "parent-1"), (&parent, "parent-2"), (&child, "child")] {
            let log = log.clone();
            scope
                .add_close_action(&cx, move || log.lock().push(name))
                .unwrap();
        }

        parent.close(&cx).unwrap();
        assert_eq!(*log.lock(), ["child", "parent-2", "parent-1"]);
    }

    #[test]
    fn merged_close_actions_move_to_parent() {
        let cx = ExecContext::new();
        let registry = registry();
        let parent = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        let child = parent.fork(&cx, ScopeFlags::empty()).unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        child
            .add_close_action(&cx, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        child.merge(&cx).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        parent.close(&cx).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn confinement_applies_before_liveness() {
        let owner = ExecContext::new();
        let other = ExecContext::new();
        let registry = registry();
        let confined = registry
            .global()
            .fork(&owner, ScopeFlags::CONFINED)
            .unwrap();
        assert_eq!(confined.owner(), Some(owner.id()));

        assert_eq!(
            confined.allocate(&other, 8, 8).unwrap_err(),
            MemoryError::WrongContext(confined.id())
        );
        assert_eq!(
            confined.close(&other),
            Err(MemoryError::WrongContext(confined.id()))
        );

        confined.close(&owner).unwrap();
        assert_eq!(
            confined.check_access(&other),
            Err(MemoryError::WrongContext(confined.id()))
        );
    }

    #[test]
    fn unchecked_children_must_be_pinned() {
        let cx = ExecContext::new();
        let registry = registry();
        let err = registry
            .global()
            .fork(&cx, ScopeFlags::UNCHECKED)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn out_of_memory_is_reported() {
        let cx = ExecContext::new();
        let registry = ScopeRegistry::with_source(
            RegionConfig::default(),
            Arc::new(LimitedBlocks::new(64 * 1024)),
        )
        .unwrap();
        let scope = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();

        scope.allocate(&cx, 1024, 8).unwrap();
        let err = scope.allocate(&cx, 1024 * 1024, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(scope.stats().blocks, 1);
    }

    #[test]
    fn closed_records_are_reused() {
        let cx = ExecContext::new();
        let registry = registry();
        let first = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        let segment = first.allocate(&cx, 16, 8).unwrap();
        first.close(&cx).unwrap();
        assert_eq!(registry.records(), 3);

        let second = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        assert_eq!(second.id(), first.id());
        assert_ne!(second, first);
        assert_eq!(registry.records(), 3);

        // The old handle and its memory stay closed.
        assert_eq!(first.state(), ScopeState::Closed);
        assert!(!first.is_alive());
        assert_eq!(first.check_access(&cx), Err(closed(first.id())));
        assert_eq!(
            segment.get(&cx, &ValueLayout::I64, 0),
            Err(closed(first.id()))
        );
        assert!(first.allocate(&cx, 8, 8).is_err());
        assert!(first.children().is_empty());
        assert!(first.parent().is_none());
        assert_eq!(first.close(&cx), Err(closed(first.id())));

        assert!(second.is_alive());
        assert_eq!(registry.global().children(), vec![second]);
    }

    #[test]
    fn reused_records_keep_confinement() {
        let owner = ExecContext::new();
        let other = ExecContext::new();
        let registry = registry();
        let confined = registry
            .global()
            .fork(&owner, ScopeFlags::CONFINED)
            .unwrap();
        confined.close(&owner).unwrap();
        let shared = registry.global().fork(&other, ScopeFlags::empty()).unwrap();
        assert_eq!(shared.id(), confined.id());

        assert_eq!(confined.owner(), Some(owner.id()));
        assert_eq!(
            confined.check_access(&other),
            Err(MemoryError::WrongContext(confined.id()))
        );
        assert_eq!(confined.check_access(&owner), Err(closed(confined.id())));
        shared.check_access(&owner).unwrap();
    }

    #[test]
    fn merged_scope_dies_with_reused_parent() {
        let cx = ExecContext::new();
        let registry = registry();
        let parent = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        let child = parent.fork(&cx, ScopeFlags::empty()).unwrap();
        child.merge(&cx).unwrap();
        parent.close(&cx).unwrap();

        let next = registry.global().fork(&cx, ScopeFlags::empty()).unwrap();
        assert_eq!(next.id(), parent.id());
        assert_eq!(child.state(), ScopeState::Merged);
        assert!(!child.is_alive());
        assert_eq!(child.check_access(&cx), Err(closed(parent.id())));
    }

    #[test]
    fn fork_rejects_unknown_flag_bits() {
        let cx = ExecContext::new();
        let registry = registry();
        let err = registry
            .global()
            .fork(&cx, ScopeFlags::from_bits_retain(0x41))
            .unwrap_err();
        assert_eq!(err, MemoryError::UnknownFlags(0x40));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(registry.global().children().is_empty());
    }
}
