//! Configuration system for the duochat relay server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/duochat-relay/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use duochat_proto::message::MAX_CONTENT_SIZE;

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the relay.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RelayConfigFile {
    server: ServerFileConfig,
    auth: AuthFileConfig,
    uploads: UploadsFileConfig,
}

/// `[server]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
}

/// `[auth]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    jwt_secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

/// `[uploads]` section of the relay config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UploadsFileConfig {
    dir: Option<PathBuf>,
    max_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "duochat relay server")]
pub struct RelayCliArgs {
    /// Address to bind the relay server to.
    #[arg(short, long, env = "DUOCHAT_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/duochat-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum message content size in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Directory where uploaded images are stored.
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Maximum upload size in bytes.
    #[arg(long)]
    pub max_upload_size: Option<usize>,

    /// Secret for signing auth tokens. A random per-process secret is
    /// generated when unset, which invalidates tokens on restart.
    #[arg(long, env = "DUOCHAT_JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Auth token lifetime in seconds.
    #[arg(long)]
    pub token_ttl_secs: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DUOCHAT_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:5000`).
    pub bind_addr: String,
    /// Maximum allowed message content size in bytes.
    pub max_payload_size: usize,
    /// Directory where uploaded images are stored.
    pub upload_dir: PathBuf,
    /// Maximum upload size in bytes.
    pub max_upload_size: usize,
    /// Secret for signing auth tokens; `None` means random per-process.
    pub jwt_secret: Option<String>,
    /// Auth token lifetime in seconds.
    pub token_ttl_secs: u64,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            max_payload_size: MAX_CONTENT_SIZE,
            upload_dir: PathBuf::from("uploads"),
            max_upload_size: 5 * 1024 * 1024,
            jwt_secret: None,
            token_ttl_secs: 3600,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `RelayConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &RelayCliArgs, file: &RelayConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_payload_size: cli
                .max_payload_size
                .or(file.server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            upload_dir: cli
                .upload_dir
                .clone()
                .or_else(|| file.uploads.dir.clone())
                .unwrap_or(defaults.upload_dir),
            max_upload_size: cli
                .max_upload_size
                .or(file.uploads.max_size)
                .unwrap_or(defaults.max_upload_size),
            jwt_secret: cli
                .jwt_secret
                .clone()
                .or_else(|| file.auth.jwt_secret.clone()),
            token_ttl_secs: cli
                .token_ttl_secs
                .or(file.auth.token_ttl_secs)
                .unwrap_or(defaults.token_ttl_secs),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the relay.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<RelayConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(RelayConfigFile::default());
        };
        config_dir.join("duochat-relay").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
