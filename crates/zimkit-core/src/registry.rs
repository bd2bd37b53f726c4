//! The authoritative set of open archives.
//!
//! [`ReaderRegistry`] maps archive identifiers to [`ArchiveHandle`]s. It is
//! the only place handles are created or retired:
//!
//! - `open` probes the file for its identifier first, so reopening an archive
//!   (even from another location) returns the existing handle.
//! - Opens and closes of one identifier are serialized by a per-identifier
//!   lock; different identifiers proceed in parallel.
//! - `close` retires the handle and drops the registry's lease. The native
//!   reader is freed once in-flight operations drop theirs.
//! - `prune_stale` drops archives whose file vanished or no longer probes to
//!   the same identifier.

use crate::backend::ArchiveBackend;
use crate::handle::{ArchiveHandle, ArchiveLease};
use crate::types::ArchiveId;
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Open archives, keyed by identifier.
pub struct ReaderRegistry {
    backend: Arc<dyn ArchiveBackend>,
    handles: RwLock<HashMap<ArchiveId, ArchiveLease>>,
    id_locks: Mutex<HashMap<ArchiveId, Arc<Mutex<()>>>>,
}

impl ReaderRegistry {
    /// Empty registry that opens files through `backend`.
    pub fn new(backend: Arc<dyn ArchiveBackend>) -> Self {
        Self {
            backend,
            handles: RwLock::new(HashMap::new()),
            id_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The backend used to open files.
    pub fn backend(&self) -> &Arc<dyn ArchiveBackend> {
        &self.backend
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ArchiveId, ArchiveLease>> {
        self.handles.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ArchiveId, ArchiveLease>> {
        self.handles.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn id_lock(&self, id: ArchiveId) -> Arc<Mutex<()>> {
        let mut locks = self.id_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// Forget the lock of a retired identifier unless another caller holds it.
    fn release_id_lock(&self, id: ArchiveId, lock: Arc<Mutex<()>>) {
        let mut locks = self.id_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map and one in `lock`
        if Arc::strong_count(&lock) == 2 && !self.contains(id) {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    fn id_lock_count(&self) -> usize {
        self.id_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Open the archive at `path` and return its identifier.
    ///
    /// Idempotent: when an archive with the same identifier is already open,
    /// its handle is kept and no second reader is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] when the file is missing or not an archive.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<ArchiveId> {
        let path = path.as_ref();
        let id = self.backend.probe_identifier(path)?;
        if self.contains(id) {
            debug!("Archive {id} already open, reusing handle");
            return Ok(id);
        }

        let lock = self.id_lock(id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished opening while we waited
        if self.contains(id) {
            debug!("Archive {id} opened concurrently, reusing handle");
            return Ok(id);
        }

        let reader = self.backend.open(path)?;
        if reader.id() != id {
            warn!(
                "Reader for {} reports id {} but probe returned {id}",
                path.display(),
                reader.id()
            );
        }

        let handle = Arc::new(ArchiveHandle::new(id, path.to_path_buf(), reader));
        self.write().insert(id, handle);
        info!("Opened archive {id} from {}", path.display());
        Ok(id)
    }

    /// Open several files, reporting each outcome in input order.
    pub fn open_all<P: AsRef<Path>>(
        &self,
        paths: impl IntoIterator<Item = P>,
    ) -> Vec<Result<ArchiveId>> {
        paths.into_iter().map(|path| self.open(path)).collect()
    }

    /// Close an archive. Unknown identifiers are ignored.
    pub fn close(&self, id: ArchiveId) {
        let lock = self.id_lock(id);
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = self.write().remove(&id);
        if let Some(handle) = removed {
            handle.retire();
            info!("Closed archive {id}");
        }
        drop(guard);
        self.release_id_lock(id, lock);
    }

    /// Close every open archive.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.write().drain().collect();
        self.id_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        for (id, handle) in drained {
            handle.retire();
            debug!("Closed archive {id}");
        }
    }

    /// Lease on an open archive.
    pub fn get(&self, id: ArchiveId) -> Option<ArchiveLease> {
        self.read().get(&id).cloned()
    }

    /// Lease on an open archive, or [`Error::ArchiveUnavailable`].
    pub fn lease(&self, id: ArchiveId) -> Result<ArchiveLease> {
        self.get(id).ok_or(Error::ArchiveUnavailable(id))
    }

    /// Leases on every archive in `ids` that is currently open.
    pub fn leases<'a>(&self, ids: impl IntoIterator<Item = &'a ArchiveId>) -> Vec<ArchiveLease> {
        let handles = self.read();
        ids.into_iter()
            .filter_map(|id| handles.get(id).cloned())
            .collect()
    }

    /// Leases on all open archives.
    pub fn snapshot(&self) -> Vec<ArchiveLease> {
        self.read().values().cloned().collect()
    }

    /// Whether `id` is open.
    pub fn contains(&self, id: ArchiveId) -> bool {
        self.read().contains_key(&id)
    }

    /// Identifiers of all open archives.
    pub fn list_identifiers(&self) -> BTreeSet<ArchiveId> {
        self.read().keys().copied().collect()
    }

    /// File an open archive was loaded from.
    pub fn file_path(&self, id: ArchiveId) -> Option<PathBuf> {
        self.read().get(&id).map(|handle| handle.path().to_path_buf())
    }

    /// Number of open archives.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no archive is open.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close archives whose file is gone or now holds a different archive.
    ///
    /// Never fails; returns the identifiers that were removed.
    pub fn prune_stale(&self) -> Vec<ArchiveId> {
        let candidates: Vec<(ArchiveId, ArchiveLease)> = self
            .read()
            .iter()
            .map(|(id, handle)| (*id, Arc::clone(handle)))
            .collect();

        let mut pruned = Vec::new();
        for (id, handle) in candidates {
            let stale = match self.backend.probe_identifier(handle.path()) {
                Ok(current) => current != id,
                Err(e) => {
                    debug!("Probe of {} failed: {e}", handle.path().display());
                    true
                },
            };
            if !stale {
                continue;
            }

            let lock = self.id_lock(id);
            let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut handles = self.write();
            // Only remove the handle we probed, not one reopened meanwhile
            if handles.get(&id).is_some_and(|h| Arc::ptr_eq(h, &handle)) {
                handles.remove(&id);
                drop(handles);
                handle.retire();
                info!("Pruned stale archive {id} ({})", handle.path().display());
                pruned.push(id);
            } else {
                drop(handles);
            }
            drop(guard);
            self.release_id_lock(id, lock);
        }
        pruned
    }
}

impl Drop for ReaderRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

impl std::fmt::Debug for ReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("archives", &self.list_identifiers())
            .finish_non_exhaustive()
    }
}
