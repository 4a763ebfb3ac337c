use std::path::PathBuf;
use std::time::Duration;

use dog_upload::UploadConfig;

struct ServerDefaults;

impl ServerDefaults {
    const HOST: &'static str = "127.0.0.1";
    const PORT: u16 = 3030;
    const UPLOAD_DIR: &'static str = "uploads";
    const TEMP_THRESHOLD_BYTES: u64 = 0;
    const MAX_PART_MB: u64 = 100;
    const SESSION_TTL_SECS: u64 = 2 * 60 * 60;
    const REAP_INTERVAL_SECS: u64 = 300;
}

/// Upload server settings, read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Root of the `default` storage
    pub upload_dir: PathBuf,
    /// Root of the temp storage; no temp storage when unset
    pub temp_dir: Option<PathBuf>,
    /// Allowlist of the `default` storage; empty accepts everything
    pub accepted_mime_types: Vec<String>,
    /// Bucket backing the `default` storage instead of `upload_dir`
    pub s3_bucket: Option<String>,
    pub upload: UploadConfig,
    pub reap_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ServerDefaults::HOST.to_string(),
            port: ServerDefaults::PORT,
            upload_dir: PathBuf::from(ServerDefaults::UPLOAD_DIR),
            temp_dir: None,
            accepted_mime_types: Vec::new(),
            s3_bucket: None,
            upload: UploadConfig::default(),
            reap_interval: Duration::from_secs(ServerDefaults::REAP_INTERVAL_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let upload = UploadConfig::new()
            .with_temp_threshold(env_var_or(
                "UPLOAD_TEMP_THRESHOLD_BYTES",
                ServerDefaults::TEMP_THRESHOLD_BYTES,
            ))
            .with_max_part_bytes(megabytes(env_var_or(
                "UPLOAD_MAX_PART_MB",
                ServerDefaults::MAX_PART_MB,
            )))
            .with_session_ttl(Duration::from_secs(env_var_or(
                "UPLOAD_SESSION_TTL_SECS",
                ServerDefaults::SESSION_TTL_SECS,
            )));

        let accepted_mime_types = std::env::var("UPLOAD_ACCEPTED_MIME_TYPES")
            .map(|types| {
                types
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: env_var_or("HTTP_HOST", ServerDefaults::HOST.to_string()),
            port: env_var_or("HTTP_PORT", ServerDefaults::PORT),
            upload_dir: PathBuf::from(env_var_or(
                "UPLOAD_DIR",
                ServerDefaults::UPLOAD_DIR.to_string(),
            )),
            temp_dir: non_empty_var("UPLOAD_TEMP_DIR").map(PathBuf::from),
            accepted_mime_types,
            s3_bucket: non_empty_var("UPLOAD_S3_BUCKET"),
            upload,
            reap_interval: Duration::from_secs(env_var_or(
                "UPLOAD_REAP_INTERVAL_SECS",
                ServerDefaults::REAP_INTERVAL_SECS,
            )),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Debug,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}
