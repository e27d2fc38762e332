//! Shared runtime cache
//!
//! One [`Cache`] per shared asset kind. A cache holds at most one live
//! runtime per definition UUID and builds runtimes on first request.
//! Entries are inserted only after both construction phases succeed, so a
//! lookup never observes a half-built runtime.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{AssetRuntime, ConstructionError, LoadContext};
use crate::definition::{AssetDefinition, AssetType, DefinitionError};
use crate::foundation::uuid::Uuid;

/// A runtime that lives in a [`Cache`] and is shared between entities
pub trait SharedAssetRuntime: AssetRuntime + Sized + 'static {
    /// Kind of definition this runtime is built from
    const ASSET_TYPE: AssetType;

    /// First phase. Never touches files or native handles.
    fn construct(definition: Arc<AssetDefinition>) -> Self;

    /// CPU side work that can run before native resources are acquired
    fn decode(&mut self, _ctx: &LoadContext<'_>) -> Result<(), ConstructionError> {
        Ok(())
    }

    /// Hash of decoded content, for kinds that merge identical data
    fn content_fingerprint(&self) -> Option<u64> {
        None
    }

    /// Whether two decoded runtimes hold identical content
    fn same_content(&self, _other: &Self) -> bool {
        false
    }

    /// Second phase. Acquires native resources; on error, everything
    /// acquired so far has been released.
    fn use_definition(&mut self, ctx: &LoadContext<'_>) -> Result<(), ConstructionError>;

    /// Release native resources. Safe to call more than once.
    fn release(&self);
}

/// Lazily populated map from definition UUID to shared runtime
pub struct Cache<T: SharedAssetRuntime> {
    runtimes: RwLock<HashMap<Uuid, Arc<T>>>,
    failed: Mutex<HashSet<Uuid>>,
    build: Mutex<()>,
}

impl<T: SharedAssetRuntime> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SharedAssetRuntime> Cache<T> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            runtimes: RwLock::new(HashMap::new()),
            failed: Mutex::new(HashSet::new()),
            build: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<T>>> {
        self.runtimes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Arc<T>>> {
        self.runtimes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn failed(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached runtime for `definition`, building it on first
    /// request. Failures are logged and yield `None`.
    pub fn get_runtime(&self, definition: Option<&Arc<AssetDefinition>>, ctx: &LoadContext<'_>) -> Option<Arc<T>> {
        let Some(definition) = definition else {
            log::error!("{} cache: cannot get runtime for a missing definition", T::ASSET_TYPE);
            return None;
        };
        match self.try_get_runtime(definition, ctx) {
            Ok(runtime) => Some(runtime),
            Err(ConstructionError::PreviouslyFailed(uuid)) => {
                log::debug!("{} cache: {uuid} failed earlier, not retrying", T::ASSET_TYPE);
                None
            }
            Err(e) => {
                log::error!("{} cache: failed to build {}: {e}", T::ASSET_TYPE, definition.describe());
                None
            }
        }
    }

    /// As [`Cache::get_runtime`], reporting why a build failed
    pub fn try_get_runtime(&self, definition: &Arc<AssetDefinition>, ctx: &LoadContext<'_>) -> Result<Arc<T>, ConstructionError> {
        if definition.asset_type() != T::ASSET_TYPE {
            return Err(DefinitionError::WrongType {
                owner: definition.describe(),
                expected: T::ASSET_TYPE,
                found: definition.asset_type(),
            }
            .into());
        }

        let uuid = definition.uuid();
        if let Some(runtime) = self.get_cached(uuid) {
            return Ok(runtime);
        }

        let _build = self.build.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have finished the same build while we waited
        if let Some(runtime) = self.get_cached(uuid) {
            return Ok(runtime);
        }
        if self.failed().contains(uuid) {
            return Err(ConstructionError::PreviouslyFailed(uuid.clone()));
        }

        match self.build(definition, ctx) {
            Ok(runtime) => {
                self.write().insert(uuid.clone(), Arc::clone(&runtime));
                Ok(runtime)
            }
            Err(e) => {
                self.failed().insert(uuid.clone());
                Err(e)
            }
        }
    }

    fn build(&self, definition: &Arc<AssetDefinition>, ctx: &LoadContext<'_>) -> Result<Arc<T>, ConstructionError> {
        let mut runtime = T::construct(Arc::clone(definition));
        runtime.decode(ctx)?;

        if let Some(existing) = self.find_same_content(&runtime) {
            log::info!(
                "{} cache: {} has the same content as {}, sharing runtime",
                T::ASSET_TYPE,
                definition.describe(),
                existing.definition().describe()
            );
            return Ok(existing);
        }

        if let Err(e) = runtime.use_definition(ctx) {
            runtime.release();
            return Err(e);
        }
        log::debug!("{} cache: loaded {}", T::ASSET_TYPE, definition.describe());
        Ok(Arc::new(runtime))
    }

    fn find_same_content(&self, candidate: &T) -> Option<Arc<T>> {
        let fingerprint = candidate.content_fingerprint()?;
        self.read()
            .values()
            .find(|existing| {
                existing.content_fingerprint() == Some(fingerprint) && existing.same_content(candidate)
            })
            .cloned()
    }

    /// Cached runtime for a UUID, without building
    pub fn get_cached(&self, uuid: &Uuid) -> Option<Arc<T>> {
        self.read().get(uuid).cloned()
    }

    /// Whether a runtime is cached for a UUID
    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.read().contains_key(uuid)
    }

    /// Number of cached UUIDs. Content-shared runtimes count once per alias.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of every cached runtime
    pub fn runtimes(&self) -> Vec<Arc<T>> {
        self.read().values().cloned().collect()
    }

    /// Forget a UUID so the next request builds a fresh runtime.
    ///
    /// Holders of the old runtime keep it; its resources are released when
    /// the last holder drops it.
    pub fn invalidate(&self, uuid: &Uuid) -> Option<Arc<T>> {
        self.failed().remove(uuid);
        self.write().remove(uuid)
    }

    /// Evict runtimes referenced only by this cache. Returns the number of
    /// UUIDs evicted.
    pub fn collect_garbage(&self) -> usize {
        let mut runtimes = self.write();

        let mut aliases: HashMap<*const T, usize> = HashMap::new();
        for runtime in runtimes.values() {
            *aliases.entry(Arc::as_ptr(runtime)).or_default() += 1;
        }

        let before = runtimes.len();
        runtimes.retain(|uuid, runtime| {
            let held = aliases.get(&Arc::as_ptr(runtime)).copied().unwrap_or(0);
            let unused = Arc::strong_count(runtime) <= held;
            if unused {
                log::debug!("{} cache: evicting unused {uuid}", T::ASSET_TYPE);
            }
            !unused
        });
        before - runtimes.len()
    }

    /// Release and drop every runtime. Calling this twice is a no-op.
    pub fn clear(&self) {
        let drained: Vec<Arc<T>> = {
            let mut runtimes = self.write();
            runtimes.drain().map(|(_, runtime)| runtime).collect()
        };
        self.failed().clear();
        if drained.is_empty() {
            return;
        }
        log::debug!("{} cache: clearing {} runtimes", T::ASSET_TYPE, drained.len());
        for runtime in &drained {
            runtime.release();
        }
    }
}

impl<T: SharedAssetRuntime> Drop for Cache<T> {
    fn drop(&mut self) {
        self.clear();
    }
}
