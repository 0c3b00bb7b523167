//! TOML configuration file loading
//!
//! Supports `~/.config/intake/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct IntakeConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// WhatsApp Cloud API configuration
    #[serde(default)]
    pub whatsapp: WhatsAppFileConfig,

    /// Google OAuth client configuration
    #[serde(default)]
    pub google: GoogleFileConfig,

    /// Session store tuning
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Directory holding the database
    pub data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WhatsAppFileConfig {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub api_version: Option<String>,
    pub verify_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GoogleFileConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Session store tuning
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Idle seconds before pending state is discarded
    pub ttl_secs: Option<u64>,

    /// Remembered webhook message ids
    pub dedup_capacity: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `IntakeConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> IntakeConfigFile {
    let Some(path) = config_file_path() else {
        return IntakeConfigFile::default();
    };

    if !path.exists() {
        return IntakeConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            IntakeConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            IntakeConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config(content: &str) -> crate::Result<IntakeConfigFile> {
    let config = toml::from_str(content)?;
    Ok(config)
}

/// Return the config file path: `~/.config/intake/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("intake").join("config.toml"))
}
