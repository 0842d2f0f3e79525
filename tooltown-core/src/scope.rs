use crate::cleanup::{CleanupGuard, CleanupSet};
use crate::staging::Stager;
use std::path::PathBuf;
use std::sync::Arc;

/// Owns every scratch file created while serving one request.
///
/// Dropping the scope drains its [`CleanupSet`]. When a response body has to
/// outlive the handler, [`RequestScope::into_guard`] hands the obligation to
/// whatever holds the body.
#[derive(Debug)]
pub struct RequestScope {
    stager: Stager,
    guard: CleanupGuard,
}

impl RequestScope {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        let cleanup = Arc::new(CleanupSet::new());
        Self {
            stager: Stager::new(scratch_dir, Arc::clone(&cleanup)),
            guard: CleanupGuard::new(cleanup),
        }
    }

    pub fn with_upload_limit(mut self, max_upload_bytes: Option<u64>) -> Self {
        self.stager = self.stager.with_max_upload_bytes(max_upload_bytes);
        self
    }

    pub fn stager(&self) -> &Stager {
        &self.stager
    }

    pub fn cleanup(&self) -> &Arc<CleanupSet> {
        self.guard.set()
    }

    /// Drains the cleanup set now. Returns the number of files removed.
    pub fn finish(self) -> usize {
        self.guard.finish()
    }

    pub fn into_guard(self) -> CleanupGuard {
        self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::{FileKind, UploadMeta};
    use bytes::Bytes;
    use tempfile::TempDir;

    fn scratch_entries(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_drop_removes_staged_files() {
        let dir = TempDir::new().unwrap();
        {
            let scope = RequestScope::new(dir.path());
            scope
                .stager()
                .stage_bytes(UploadMeta::default(), FileKind::Any, Bytes::from_static(b"abc"))
                .await
                .unwrap();
            scope.stager().allocate("artifact-", ".pdf").unwrap();
            assert_eq!(scratch_entries(&dir), 2);
        }
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn test_guard_outlives_scope() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        let path = scope.stager().allocate("artifact-", ".pdf").unwrap();

        let guard = scope.into_guard();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_finish_reports_removed_count() {
        let dir = TempDir::new().unwrap();
        let scope = RequestScope::new(dir.path());
        scope.stager().allocate("a-", ".pdf").unwrap();
        scope.stager().allocate("b-", ".pdf").unwrap();
        assert_eq!(scope.finish(), 2);
    }
}
