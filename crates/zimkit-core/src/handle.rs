//! Opened archives and the leases that keep them alive.

use crate::backend::ArchiveReader;
use crate::metadata::ArchiveMetadata;
use crate::types::ArchiveId;
use crate::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Shared access to an [`ArchiveHandle`].
///
/// Every in-flight operation holds one. The native reader is released when
/// the registry and the last lease have all let go.
pub type ArchiveLease = Arc<ArchiveHandle>;

/// One opened archive.
///
/// Only [`crate::ReaderRegistry`] creates handles. Closing or pruning an
/// archive retires its handle: new queries are refused with
/// [`Error::ArchiveUnavailable`], while calls that already borrowed the
/// reader finish normally.
pub struct ArchiveHandle {
    id: ArchiveId,
    path: PathBuf,
    reader: Box<dyn ArchiveReader>,
    retired: AtomicBool,
    metadata: OnceLock<ArchiveMetadata>,
}

impl ArchiveHandle {
    pub(crate) fn new(id: ArchiveId, path: PathBuf, reader: Box<dyn ArchiveReader>) -> Self {
        Self {
            id,
            path,
            reader,
            retired: AtomicBool::new(false),
            metadata: OnceLock::new(),
        }
    }

    /// Identifier of the archive.
    #[must_use]
    pub const fn id(&self) -> ArchiveId {
        self.id
    }

    /// File the archive was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The reader, unless the handle has been retired.
    pub fn reader(&self) -> Result<&dyn ArchiveReader> {
        if self.is_retired() {
            Err(Error::ArchiveUnavailable(self.id))
        } else {
            Ok(self.reader.as_ref())
        }
    }

    /// Whether the archive was closed or pruned.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn retire(&self) {
        if !self.retired.swap(true, Ordering::AcqRel) {
            debug!("Retired archive {}", self.id);
        }
    }

    pub(crate) const fn metadata_slot(&self) -> &OnceLock<ArchiveMetadata> {
        &self.metadata
    }
}

impl fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

impl Drop for ArchiveHandle {
    fn drop(&mut self) {
        debug!("Released archive {} ({})", self.id, self.path.display());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::MockArchive;

    fn handle() -> ArchiveHandle {
        let archive = MockArchive::new("handle").with_article("/A", "Apple", "<p>apple</p>");
        ArchiveHandle::new(archive.id(), PathBuf::from("/tmp/handle.zim"), Box::new(archive))
    }

    #[test]
    fn test_retired_handle_refuses_queries() {
        let handle = handle();
        assert!(handle.reader().is_ok());

        handle.retire();
        handle.retire();
        assert!(handle.is_retired());
        let err = handle.reader().err().unwrap();
        assert!(matches!(err, Error::ArchiveUnavailable(id) if id == handle.id()));
    }

    #[test]
    fn test_borrowed_reader_outlives_retirement() {
        let lease: ArchiveLease = Arc::new(handle());
        let reader = lease.reader().unwrap();
        lease.retire();
        assert_eq!(reader.read_entry("/A").unwrap().data, b"<p>apple</p>");
    }

    #[test]
    fn test_debug_output() {
        let rendered = format!("{:?}", handle());
        assert!(rendered.contains("handle.zim"));
        assert!(rendered.contains("retired: false"));
    }
}
