use crate::config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use tooltown_core::RequestScope;

/// Shared, read-only application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// A fresh scope for one request, rooted in the configured scratch
    /// directory.
    pub fn scope(&self) -> RequestScope {
        RequestScope::new(&self.config.storage.scratch_dir)
            .with_upload_limit(Some(self.config.storage.max_upload_bytes))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.limits.request_timeout_secs)
    }
}
