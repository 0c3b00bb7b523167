//! Configuration management for the intake gateway

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};

/// Default Graph API version for the WhatsApp Cloud API
pub const DEFAULT_WHATSAPP_API_VERSION: &str = "v22.0";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 4000;

/// Default idle time before a conversation resets to idle (30 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 1800;

/// Default number of remembered webhook message ids
pub const DEFAULT_DEDUP_CAPACITY: usize = 2000;

/// Intake gateway configuration
#[derive(Debug)]
pub struct Config {
    /// Path to data directory (database)
    pub data_dir: PathBuf,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// WhatsApp Cloud API configuration
    pub whatsapp: WhatsAppConfig,

    /// Google OAuth client used for Drive access
    pub google: GoogleConfig,

    /// Conversation session configuration
    pub session: SessionConfig,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// WhatsApp Cloud API configuration
#[derive(Debug)]
pub struct WhatsAppConfig {
    /// Business API access token
    pub access_token: Option<SecretString>,

    /// Phone number ID messages are sent from
    pub phone_number_id: Option<String>,

    /// Graph API version (e.g. "v22.0")
    pub api_version: String,

    /// Token Meta echoes back during webhook verification
    pub verify_token: Option<SecretString>,
}

/// Google OAuth client configuration
#[derive(Debug)]
pub struct GoogleConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
}

/// Session store configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which pending conversation state is discarded
    pub ttl: Duration,

    /// Number of webhook message ids remembered for deduplication
    pub dedup_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

/// Return the default data directory, creating it if needed
///
/// Uses `~/.local/share/intake/` on Linux
pub fn default_data_dir() -> PathBuf {
    let dir = directories::ProjectDirs::from("dev", "omni", "intake")
        .map_or_else(|| PathBuf::from(".intake"), |d| d.data_dir().to_path_buf());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(path = %dir.display(), error = %e, "failed to create data directory");
    }

    dir
}

fn env_secret(key: &str) -> Option<SecretString> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| SecretString::from(v.trim().to_string()))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment and the optional config file
    ///
    /// Environment variables take precedence over `~/.config/intake/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting cannot be parsed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();

        let port = match env_string("INTAKE_PORT").or_else(|| env_string("PORT")) {
            Some(p) => p
                .parse()
                .map_err(|_| Error::Config(format!("invalid port: {p}")))?,
            None => fc.server.port.unwrap_or(DEFAULT_PORT),
        };

        let data_dir = env_string("INTAKE_DATA_DIR")
            .or(fc.server.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let whatsapp = WhatsAppConfig {
            access_token: env_secret("WHATSAPP_ACCESS_TOKEN")
                .or_else(|| fc.whatsapp.access_token.map(SecretString::from)),
            phone_number_id: env_string("WHATSAPP_PHONE_NUMBER_ID").or(fc.whatsapp.phone_number_id),
            api_version: env_string("WHATSAPP_API_VERSION")
                .or(fc.whatsapp.api_version)
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_VERSION.to_string()),
            verify_token: env_secret("VERIFY_TOKEN")
                .or_else(|| fc.whatsapp.verify_token.map(SecretString::from)),
        };

        let google = GoogleConfig {
            client_id: env_string("GOOGLE_CLIENT_ID").or(fc.google.client_id),
            client_secret: env_secret("GOOGLE_CLIENT_SECRET")
                .or_else(|| fc.google.client_secret.map(SecretString::from)),
        };

        let ttl_secs = match env_string("INTAKE_SESSION_TTL_SECS") {
            Some(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("invalid session ttl: {v}")))?,
            None => fc.session.ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS),
        };

        let dedup_capacity = match env_string("INTAKE_DEDUP_CAPACITY") {
            Some(v) => v
                .parse()
                .map_err(|_| Error::Config(format!("invalid dedup capacity: {v}")))?,
            None => fc.session.dedup_capacity.unwrap_or(DEFAULT_DEDUP_CAPACITY),
        };

        Ok(Self {
            data_dir,
            api_server: ApiServerConfig { port },
            whatsapp,
            google,
            session: SessionConfig {
                ttl: Duration::from_secs(ttl_secs),
                dedup_capacity,
            },
        })
    }

    /// Path of the SQLite database file
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("intake.db")
    }
}
