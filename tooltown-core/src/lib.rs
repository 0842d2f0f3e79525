//! # tooltown-core
//!
//! Request-scoped lifecycle for document transformations: uploads are staged
//! to unique scratch files, validated, handed to a single library operation,
//! and every scratch file is removed exactly once when the request ends.
//!
//! ```text
//! RequestScope ──► Stager::stage ──► validate ──► execute ──► OperationResult
//!      │                                                          │
//!      └──────────── CleanupSet (drained on finish / drop) ◄──────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use tooltown_core::{pipeline, FileKind, OperationRequest, RequestScope, UploadMeta};
//!
//! # async fn example(pdf: Bytes) -> tooltown_core::Result<()> {
//! let scope = RequestScope::new(std::env::temp_dir().join("tooltown"));
//! let staged = scope
//!     .stager()
//!     .stage_bytes(UploadMeta::new("report.pdf", "application/pdf"), FileKind::Pdf, pdf)
//!     .await?;
//!
//! let request = OperationRequest::Split { start: 2, end: None };
//! let result = pipeline::run(request, vec![staged], scope.stager().clone()).await?;
//! # let _ = result;
//! scope.finish();
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod error;
pub mod operations;
pub mod pipeline;
pub mod scope;
pub mod staging;
pub mod utilities;
pub mod validation;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use cleanup::{CleanupGuard, CleanupSet, ScopeClosed};
pub use error::{Result, ToolError};
pub use operations::{
    execute, Artifact, Bookmark, OperationRequest, OperationResult, OptimizeOptions, PageLabelRange,
    PageLayout, PageMode, PageSize, SizeReport, TocEntry,
};
pub use scope::RequestScope;
pub use staging::{FileKind, StagedFile, Stager, UploadMeta};
pub use validation::{validate, ValidatedFile, ValidationOutcome, ValidationResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
