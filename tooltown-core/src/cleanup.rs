//! Per-request scratch file cleanup.
//!
//! Every path handed out by the [`Stager`](crate::Stager) is registered here
//! before any bytes are written to it. The set is drained exactly once, either
//! explicitly through [`CleanupSet::run_all`] or when the owning
//! [`CleanupGuard`] is dropped (normal return, early error, panic unwinding or
//! the client disconnecting mid-stream).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The request this set belonged to has already been cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request scope already cleaned up")]
pub struct ScopeClosed;

#[derive(Debug, Default)]
struct CleanupState {
    paths: Vec<PathBuf>,
    drained: bool,
}

/// The set of scratch paths owned by one request.
#[derive(Debug, Default)]
pub struct CleanupSet {
    state: Mutex<CleanupState>,
}

impl CleanupSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CleanupState> {
        // A panic while holding the lock must not stop cleanup.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a path for removal.
    ///
    /// Once the set has been drained nothing new is accepted: the path is
    /// removed on the spot and the caller gets [`ScopeClosed`].
    pub fn register(&self, path: impl Into<PathBuf>) -> Result<(), ScopeClosed> {
        let path = path.into();
        let mut state = self.lock();
        if state.drained {
            drop(state);
            tracing::warn!(path = %path.display(), "path registered after cleanup ran");
            remove_path(&path);
            return Err(ScopeClosed);
        }
        state.paths.push(path);
        Ok(())
    }

    /// Confirms that a registered path is still owned by a live set.
    ///
    /// Call after writing to a path by name. A file recreated after the drain
    /// is removed here; while the set is live, the next drain sees it.
    pub fn confirm(&self, path: &Path) -> Result<(), ScopeClosed> {
        let state = self.lock();
        if state.drained {
            drop(state);
            tracing::warn!(path = %path.display(), "scratch file written after cleanup ran");
            remove_path(path);
            return Err(ScopeClosed);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_drained(&self) -> bool {
        self.lock().drained
    }

    /// Removes every registered path and returns how many were deleted.
    ///
    /// Idempotent. Missing files are not an error; other failures are logged
    /// and the remaining paths are still processed.
    pub fn run_all(&self) -> usize {
        let paths = {
            let mut state = self.lock();
            if state.drained {
                return 0;
            }
            state.drained = true;
            std::mem::take(&mut state.paths)
        };

        let removed = paths.iter().filter(|path| remove_path(path)).count();
        tracing::debug!(registered = paths.len(), removed, "request scratch files cleaned up");
        removed
    }
}

fn remove_path(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::trace!(path = %path.display(), "removed scratch file");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file");
            false
        }
    }
}

/// Drains its [`CleanupSet`] when dropped.
///
/// The guard travels with whatever outlives the handler: for streamed
/// artifacts it is moved into the response body.
#[derive(Debug)]
pub struct CleanupGuard {
    set: Arc<CleanupSet>,
}

impl CleanupGuard {
    pub fn new(set: Arc<CleanupSet>) -> Self {
        Self { set }
    }

    pub fn set(&self) -> &Arc<CleanupSet> {
        &self.set
    }

    /// Runs cleanup now instead of waiting for drop.
    pub fn finish(self) -> usize {
        self.set.run_all()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.set.run_all();
    }
}
