//! Service configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `tooltown.toml` (or the file passed with `--config`), `TOOLTOWN__*`
//! environment variables, then command-line flags.

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "TOOLTOWN";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory for staged uploads and artifacts
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Per-file upload limit in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Budget for staging, validation and execution of one request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of files in one multipart request
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub json: bool,
}

fn default_app_name() -> String {
    "Tooltown".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("tooltown")
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_files() -> usize {
    20
}

fn default_log_filter() -> String {
    "tooltown_api=info,tooltown_core=info,tower_http=info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_files: default_max_files(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_version(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads from `file` (required when given, otherwise `tooltown.toml` if
    /// present) and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(file, None)
    }

    /// Like [`AppConfig::load`], reading variables from `env` instead of the
    /// process environment when it is given.
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name("tooltown").required(false),
        };
        Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }

    /// Applies command-line overrides on top of the loaded values.
    pub fn apply(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(dir) = &args.scratch_dir {
            self.storage.scratch_dir = dir.clone();
        }
        if args.json_logs {
            self.logging.json = true;
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Parser)]
#[command(name = "tooltown-api", about = "PDF, image, file and text utilities over HTTP", version)]
pub struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory for scratch files
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}
