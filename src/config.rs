//! Configuration management

use serde::{Deserialize, Serialize};

use crate::db::query::CountBasis;

/// Default server host binding.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_MONGODB_DATABASE: &str = "devcamper";

/// Session token lifetime.
pub const DEFAULT_JWT_EXPIRE_DAYS: i64 = 30;
pub const DEFAULT_JWT_COOKIE_EXPIRE_DAYS: i64 = 30;

pub const DEFAULT_FILE_UPLOAD_PATH: &str = "./public/uploads";

/// Largest accepted photo, in bytes (1 MB).
pub const DEFAULT_MAX_FILE_UPLOAD: usize = 1_000_000;

pub const DEFAULT_GEOCODER_BASE_URL: &str = "https://www.mapquestapi.com";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

/// Application settings.
///
/// Layered from built-in defaults, an optional `config/config.{toml,yaml,json}`
/// file and the process environment (`PORT`, `MONGODB_URI`, `JWT_SECRET`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub app_env: AppEnv,
    pub host: String,
    pub port: u16,
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub jwt_secret: String,
    pub jwt_expire_days: i64,
    pub jwt_cookie_expire_days: i64,
    pub file_upload_path: String,
    pub max_file_upload: usize,
    pub geocoder_api_key: String,
    pub geocoder_base_url: String,
    /// Mail is only logged when unset.
    #[serde(default)]
    pub mail_api_url: Option<String>,
    pub mail_api_key: String,
    pub from_email: String,
    pub from_name: String,
    /// Total used to decide whether a list page has a successor.
    pub pagination_count_basis: CountBasis,
}

impl Settings {
    /// Load settings, reading `config/config.env` and `.env` first if present.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::from_filename("config/config.env").ok();
        dotenvy::dotenv().ok();

        let settings: Settings = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("host", DEFAULT_HOST)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("mongodb_uri", DEFAULT_MONGODB_URI)?
            .set_default("mongodb_database", DEFAULT_MONGODB_DATABASE)?
            .set_default("jwt_secret", "")?
            .set_default("jwt_expire_days", DEFAULT_JWT_EXPIRE_DAYS)?
            .set_default("jwt_cookie_expire_days", DEFAULT_JWT_COOKIE_EXPIRE_DAYS)?
            .set_default("file_upload_path", DEFAULT_FILE_UPLOAD_PATH)?
            .set_default("max_file_upload", DEFAULT_MAX_FILE_UPLOAD as i64)?
            .set_default("geocoder_api_key", "")?
            .set_default("geocoder_base_url", DEFAULT_GEOCODER_BASE_URL)?
            .set_default("mail_api_key", "")?
            .set_default("from_email", "noreply@devcamper.io")?
            .set_default("from_name", "DevCamper")?
            .set_default("pagination_count_basis", "collection")?
            .add_source(config::File::with_name("config/config").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.mongodb_uri.is_empty() {
            anyhow::bail!("MongoDB URI cannot be empty");
        }

        if self.jwt_secret.is_empty() {
            if self.is_production() {
                anyhow::bail!("JWT_SECRET must be set in production");
            }
            tracing::warn!("JWT_SECRET is empty - session tokens are trivially forgeable");
        }

        if self.jwt_expire_days <= 0 || self.jwt_cookie_expire_days <= 0 {
            anyhow::bail!("Token and cookie lifetimes must be positive");
        }

        if self.max_file_upload == 0 {
            anyhow::bail!("max_file_upload must be greater than 0");
        }

        if self.geocoder_api_key.is_empty() {
            tracing::warn!("No geocoder API key configured - address lookups will fail");
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app_env == AppEnv::Production
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_env: AppEnv::Development,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mongodb_uri: DEFAULT_MONGODB_URI.to_string(),
            mongodb_database: DEFAULT_MONGODB_DATABASE.to_string(),
            jwt_secret: String::new(),
            jwt_expire_days: DEFAULT_JWT_EXPIRE_DAYS,
            jwt_cookie_expire_days: DEFAULT_JWT_COOKIE_EXPIRE_DAYS,
            file_upload_path: DEFAULT_FILE_UPLOAD_PATH.to_string(),
            max_file_upload: DEFAULT_MAX_FILE_UPLOAD,
            geocoder_api_key: String::new(),
            geocoder_base_url: DEFAULT_GEOCODER_BASE_URL.to_string(),
            mail_api_url: None,
            mail_api_key: String::new(),
            from_email: "noreply@devcamper.io".to_string(),
            from_name: "DevCamper".to_string(),
            pagination_count_basis: CountBasis::Collection,
        }
    }
}
