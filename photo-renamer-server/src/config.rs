use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use toml_edit::DocumentMut;

#[cfg(feature = "embed_ui")]
use rust_embed::RustEmbed;

#[cfg(feature = "embed_ui")]
#[derive(RustEmbed)]
#[folder = "../"]
#[include = "photo-renamer.example.toml"]
struct ConfigAssets;

/// Default on-disk config filename
pub const DEFAULT_CONFIG_PATH: &str = "photo-renamer.toml";

/// Environment variable that overrides the config path.
pub const CONFIG_PATH_ENV: &str = "PHOTO_RENAMER_CONFIG";

pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 25 * 1024 * 1024;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"];
pub const DEFAULT_PROGRESS_TTL_SECS: u64 = 3600;
pub const DEFAULT_SWEEP_CRON: &str = "0 */5 * * * *";

/// Strongly typed representation of the configuration.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub server: Option<Server>,
    pub logging: Option<Logging>,
    pub limits: Option<Limits>,
    pub uploads: Option<Uploads>,
    pub progress: Option<Progress>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Server {
    pub bind_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Logging {
    pub filter: Option<String>,
}

/// Caller-facing upload limits. Unset keys fall back to the built-in defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Limits {
    pub max_file_bytes: Option<u64>,
    pub max_batch_bytes: Option<u64>,
    pub allowed_extensions: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Uploads {
    /// Directory for staged uploads. Defaults to the OS temp dir.
    pub staging_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Progress {
    pub ttl_secs: Option<u64>,
    /// Six-field cron expression for evicting expired progress entries.
    pub sweep_cron: Option<String>,
}

/// Limits with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_bytes: u64,
    pub max_batch_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl UploadLimits {
    /// Case-insensitive check of the part after the last dot.
    pub fn allows_extension(&self, filename: &str) -> bool {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|a| *a == ext)
    }
}

impl Config {
    pub fn upload_limits(&self) -> UploadLimits {
        let mut limits = UploadLimits::default();
        if let Some(l) = &self.limits {
            if let Some(v) = l.max_file_bytes {
                limits.max_file_bytes = v;
            }
            if let Some(v) = l.max_batch_bytes {
                limits.max_batch_bytes = v;
            }
            if let Some(exts) = &l.allowed_extensions {
                limits.allowed_extensions = exts
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                    .collect();
            }
        }
        limits
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.uploads
            .as_ref()
            .and_then(|u| u.staging_dir.clone())
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn progress_ttl(&self) -> std::time::Duration {
        let secs = self
            .progress
            .as_ref()
            .and_then(|p| p.ttl_secs)
            .unwrap_or(DEFAULT_PROGRESS_TTL_SECS);
        std::time::Duration::from_secs(secs)
    }

    pub fn sweep_cron(&self) -> String {
        self.progress
            .as_ref()
            .and_then(|p| p.sweep_cron.clone())
            .unwrap_or_else(|| DEFAULT_SWEEP_CRON.to_string())
    }

    /// Explicit bind address, else `0.0.0.0:$PORT`, else `0.0.0.0:8080`.
    pub fn bind_address(&self) -> String {
        if let Some(addr) = self.server.as_ref().and_then(|s| s.bind_address.clone()) {
            return addr;
        }
        match std::env::var("PORT") {
            Ok(port) if !port.trim().is_empty() => format!("0.0.0.0:{}", port.trim()),
            _ => "0.0.0.0:8080".to_string(),
        }
    }
}

/// Internal manager state kept behind an `Arc<RwLock<_>>`.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    doc: DocumentMut,
}

pub type SharedConfig = Arc<RwLock<ConfigManager>>;

impl ConfigManager {
    /// Load existing config file. If the file does not exist, creates it from the embedded example.
    pub async fn load(path: Option<PathBuf>) -> Result<SharedConfig> {
        let path = path
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        if !path.exists() {
            #[cfg(feature = "embed_ui")]
            {
                if let Some(example_file) = ConfigAssets::get("photo-renamer.example.toml") {
                    let example_content = std::str::from_utf8(&example_file.data)
                        .with_context(|| "embedded example config is not valid UTF-8")?;

                    fs::write(&path, example_content)
                        .await
                        .with_context(|| format!("writing example config to {}", path.display()))?;

                    println!("Created default config file: {}", path.display());
                } else {
                    bail!(
                        "config file {} not found and embedded example is not available",
                        path.display()
                    );
                }
            }
            #[cfg(not(feature = "embed_ui"))]
            {
                bail!("config file {} not found", path.display());
            }
        }

        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_str_at(path, &text)
    }

    /// Parse config text without touching the filesystem.
    pub fn from_str_at(path: PathBuf, text: &str) -> Result<SharedConfig> {
        let doc = text
            .parse::<DocumentMut>()
            .with_context(|| format!("parsing config file {}", path.display()))?;
        // Fail at startup rather than on first request if the shape is wrong.
        toml_edit::de::from_document::<Config>(doc.clone())
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(Arc::new(RwLock::new(Self { path, doc })))
    }

    /// Convert current document to strongly typed struct.
    pub async fn to_struct(cfg: &SharedConfig) -> Result<Config> {
        let guard = cfg.read().await;
        let typed: Config = toml_edit::de::from_document(guard.doc.clone())?;
        Ok(typed)
    }

    pub async fn path(cfg: &SharedConfig) -> PathBuf {
        cfg.read().await.path.clone()
    }
}
