//! Upload staging: copy an incoming byte stream into a unique scratch file.

use crate::cleanup::{CleanupSet, ScopeClosed};
use crate::error::{Result, ToolError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// What kind of document an upload is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Image,
    /// Opaque bytes; no format check
    Any,
}

impl FileKind {
    fn suffix(self) -> &'static str {
        match self {
            FileKind::Pdf => ".pdf",
            FileKind::Image => ".img",
            FileKind::Any => ".bin",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Pdf => f.write_str("PDF"),
            FileKind::Image => f.write_str("image"),
            FileKind::Any => f.write_str("file"),
        }
    }
}

/// Client-supplied description of an upload. Advisory only.
#[derive(Debug, Clone, Default)]
pub struct UploadMeta {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl UploadMeta {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
        }
    }
}

/// One upload persisted to scratch storage.
#[derive(Debug, Clone)]
pub struct StagedFile {
    original_name: String,
    content_type: String,
    path: PathBuf,
    size: u64,
    kind: FileKind,
}

impl StagedFile {
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// A second staged file derived from this one (e.g. a repaired copy).
    pub(crate) fn derived(&self, path: PathBuf, size: u64) -> Self {
        Self {
            original_name: self.original_name.clone(),
            content_type: self.content_type.clone(),
            path,
            size,
            kind: self.kind,
        }
    }
}

/// Allocates scratch paths for one request and registers each of them for
/// cleanup before it is handed out.
#[derive(Debug, Clone)]
pub struct Stager {
    scratch_dir: PathBuf,
    max_upload_bytes: Option<u64>,
    cleanup: Arc<CleanupSet>,
}

impl Stager {
    pub fn new(scratch_dir: impl Into<PathBuf>, cleanup: Arc<CleanupSet>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            max_upload_bytes: None,
            cleanup,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn cleanup(&self) -> &Arc<CleanupSet> {
        &self.cleanup
    }

    /// Creates an empty, uniquely named file and registers it for cleanup.
    ///
    /// Fails once the owning request has been cleaned up, so a worker that
    /// outlives its request cannot produce new scratch files.
    pub fn allocate(&self, prefix: &str, suffix: &str) -> Result<PathBuf> {
        const OP: &str = "allocate scratch file";

        if self.cleanup.is_drained() {
            return Err(closed(OP, ScopeClosed));
        }
        std::fs::create_dir_all(&self.scratch_dir).map_err(|e| ToolError::storage(OP, e))?;
        let path = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .rand_bytes(12)
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| ToolError::storage(OP, e))?
            .into_temp_path()
            .keep()
            .map_err(|e| ToolError::storage(OP, e.error))?;

        self.cleanup.register(&path).map_err(|e| closed(OP, e))?;
        Ok(path)
    }

    /// Checks, after a write by name, that `path` still belongs to a live
    /// request. A file written after cleanup ran is removed and reported as
    /// a storage error.
    pub fn commit(&self, path: &Path, operation: &'static str) -> Result<()> {
        self.cleanup.confirm(path).map_err(|e| closed(operation, e))
    }

    /// Copies `stream` chunk by chunk into a fresh scratch file.
    ///
    /// The total size need not be known up front. The path is registered for
    /// cleanup before the first write, so a failed or oversized upload leaves
    /// nothing behind once the request ends.
    pub async fn stage<S, E>(
        &self,
        meta: UploadMeta,
        kind: FileKind,
        mut stream: S,
    ) -> Result<StagedFile>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: fmt::Display,
    {
        const OP: &str = "stage upload";

        let original_name = meta.file_name.unwrap_or_else(|| "upload".to_string());
        let content_type = meta
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let path = self.allocate("upload-", kind.suffix())?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| ToolError::storage(OP, e))?;

        let mut size: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                ToolError::Validation(format!("Failed to read upload {original_name}: {e}"))
            })?;
            size += chunk.len() as u64;
            if let Some(limit) = self.max_upload_bytes {
                if size > limit {
                    return Err(ToolError::Validation(format!(
                        "File {original_name} exceeds the upload limit of {limit} bytes"
                    )));
                }
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| ToolError::storage(OP, e))?;
        }
        file.flush().await.map_err(|e| ToolError::storage(OP, e))?;

        tracing::debug!(
            file_name = %original_name,
            content_type = %content_type,
            size,
            kind = %kind,
            "staged upload"
        );

        Ok(StagedFile {
            original_name,
            content_type,
            path,
            size,
            kind,
        })
    }

    /// Stages an in-memory payload.
    pub async fn stage_bytes(
        &self,
        meta: UploadMeta,
        kind: FileKind,
        bytes: Bytes,
    ) -> Result<StagedFile> {
        let stream = futures::stream::iter([Ok::<_, std::convert::Infallible>(bytes)]);
        self.stage(meta, kind, stream).await
    }

    /// Stages a local file through the same path as an upload.
    pub async fn stage_path(
        &self,
        path: &Path,
        content_type: &str,
        kind: FileKind,
    ) -> Result<StagedFile> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ToolError::storage("open input", e))?;
        let meta = UploadMeta {
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            content_type: Some(content_type.to_string()),
        };
        self.stage(meta, kind, tokio_util::io::ReaderStream::new(file))
            .await
    }
}

fn closed(operation: &'static str, err: ScopeClosed) -> ToolError {
    ToolError::storage(operation, std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stager(dir: &TempDir) -> Stager {
        Stager::new(dir.path(), Arc::new(CleanupSet::new()))
    }

    #[tokio::test]
    async fn test_stage_streams_chunks_to_disk() {
        let dir = TempDir::new().unwrap();
        let stager = stager(&dir);
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"%PDF-1.4\n")),
            Ok(Bytes::from_static(b"rest of the file")),
        ]);

        let staged = stager
            .stage(UploadMeta::new("a.pdf", "application/pdf"), FileKind::Pdf, chunks)
            .await
            .unwrap();

        assert_eq!(staged.size(), 25);
        assert_eq!(staged.original_name(), "a.pdf");
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"%PDF-1.4\nrest of the file");
        assert_eq!(stager.cleanup().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_stages_get_unique_paths() {
        let dir = TempDir::new().unwrap();
        let stager = stager(&dir);

        let mut handles = Vec::new();
        for i in 0..16 {
            let stager = stager.clone();
            handles.push(tokio::spawn(async move {
                stager
                    .stage_bytes(
                        UploadMeta::new(format!("{i}.pdf"), "application/pdf"),
                        FileKind::Pdf,
                        Bytes::from(vec![b'x'; 8]),
                    )
                    .await
                    .unwrap()
                    .path()
                    .to_path_buf()
            }));
        }

        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 16);
    }

    #[tokio::test]
    async fn test_failed_stream_is_still_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let stager = stager(&dir);
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err("connection reset"),
        ]);

        let err = stager
            .stage(UploadMeta::new("a.pdf", "application/pdf"), FileKind::Pdf, chunks)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));

        assert_eq!(stager.cleanup().len(), 1);
        stager.cleanup().run_all();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_limit_is_enforced() {
        let dir = TempDir::new().unwrap();
        let stager = stager(&dir).with_max_upload_bytes(Some(4));

        let err = stager
            .stage_bytes(UploadMeta::default(), FileKind::Any, Bytes::from_static(b"too large"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upload limit"));
    }

    #[test]
    fn test_allocate_after_cleanup_is_refused() {
        let dir = TempDir::new().unwrap();
        let stager = stager(&dir);
        stager.cleanup().run_all();

        let err = stager.allocate("artifact-", ".pdf").unwrap_err();
        assert!(matches!(err, ToolError::Storage { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_commit_removes_file_written_after_cleanup() {
        let dir = TempDir::new().unwrap();
        let stager = stager(&dir);
        let path = stager.allocate("artifact-", ".pdf").unwrap();
        stager.commit(&path, "test").unwrap();

        stager.cleanup().run_all();
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        assert!(stager.commit(&path, "test").is_err());
        assert!(!path.exists());
    }
}
