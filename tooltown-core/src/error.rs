use thiserror::Error;

/// Request-level error taxonomy.
///
/// Client errors (`InvalidFormat`, `Validation`, `Range`, `Auth`, `EmptyInput`)
/// are raised before any output is produced. Server errors carry the name of
/// the operation that failed but never a file-system path.
#[derive(Error, Debug)]
pub enum ToolError {
    /// A staged file failed structural validation
    #[error("{0}")]
    InvalidFormat(String),

    /// A parameter is outside its declared bounds
    #[error("{0}")]
    Validation(String),

    /// Page numbers or page ranges outside the document
    #[error("{message}")]
    Range { message: String, invalid: Vec<i64> },

    /// Wrong password, or the document is not encrypted
    #[error("Invalid password or the PDF is not encrypted")]
    Auth,

    /// No usable input files
    #[error("{0}")]
    EmptyInput(String),

    /// Scratch storage failure
    #[error("{operation} failed: storage error ({})", .source.kind())]
    Storage {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Fault inside a third-party library
    #[error("{operation} failed: {message}")]
    Library {
        operation: &'static str,
        message: String,
    },

    /// The request exceeded its time budget
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

pub type Result<T> = std::result::Result<T, ToolError>;

impl ToolError {
    pub fn storage(operation: &'static str, source: std::io::Error) -> Self {
        ToolError::Storage { operation, source }
    }

    pub fn library(operation: &'static str, err: impl std::fmt::Display) -> Self {
        ToolError::Library {
            operation,
            message: err.to_string(),
        }
    }

    /// Builds a range error that enumerates every offending page number.
    pub fn invalid_pages(invalid: Vec<i64>, page_count: u32) -> Self {
        let listed = invalid
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        ToolError::Range {
            message: format!("Invalid page numbers: [{listed}]. PDF has {page_count} pages."),
            invalid,
        }
    }

    /// True for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ToolError::InvalidFormat(_)
                | ToolError::Validation(_)
                | ToolError::Range { .. }
                | ToolError::Auth
                | ToolError::EmptyInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_invalid_pages_lists_every_value() {
        let err = ToolError::invalid_pages(vec![0, 99], 3);
        assert_eq!(
            err.to_string(),
            "Invalid page numbers: [0, 99]. PDF has 3 pages."
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_storage_error_hides_path() {
        let io = IoError::new(ErrorKind::PermissionDenied, "/tmp/secret/upload-1.pdf");
        let err = ToolError::storage("stage upload", io);
        let msg = err.to_string();
        assert!(msg.contains("stage upload"));
        assert!(!msg.contains("/tmp/secret"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_auth_message_is_generic() {
        assert_eq!(
            ToolError::Auth.to_string(),
            "Invalid password or the PDF is not encrypted"
        );
    }
}
