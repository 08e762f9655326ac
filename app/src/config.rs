use api_client::{
    StoreSettings, DEFAULT_API_BASE_URL, DEFAULT_DELIVERY_BASE_URL, DEFAULT_GALLERY_TAG,
    DEFAULT_UPLOAD_PRESET,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use ui::GalleryConfig;

const ENV_PREFIX: &str = "WEDDING_GALLERY";

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wedding-gallery")
}

pub fn default_config_path() -> PathBuf {
    base_dir().join("config")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub log_level: String,
    pub cloud_name: String,
    pub upload_preset: String,
    pub gallery_tag: String,
    pub api_base_url: String,
    pub delivery_base_url: String,
    pub optimistic_expiry_secs: u64,
    pub notification_ms: u64,
    pub debug_console: bool,
    pub log_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct AppConfigOverrides {
    pub log_level: Option<String>,
    pub cloud_name: Option<String>,
    pub upload_preset: Option<String>,
    pub debug_console: bool,
}

impl AppConfig {
    /// Read the TOML file at `path` (or the default location) and the
    /// `WEDDING_GALLERY_*` environment. Missing values fall back to defaults.
    pub fn load_from(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(default_config_path);
        let cfg = config::Config::builder()
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .unwrap_or_else(|e| {
                eprintln!("Ignoring unreadable config {:?}: {}", path, e);
                config::Config::default()
            });

        let string = |key: &str, default: &str| {
            cfg.get_string(key)
                .unwrap_or_else(|_| default.to_string())
        };

        Self {
            log_level: string("log_level", "info"),
            cloud_name: string("cloud_name", ""),
            upload_preset: string("upload_preset", DEFAULT_UPLOAD_PRESET),
            gallery_tag: string("gallery_tag", DEFAULT_GALLERY_TAG),
            api_base_url: string("api_base_url", DEFAULT_API_BASE_URL),
            delivery_base_url: string("delivery_base_url", DEFAULT_DELIVERY_BASE_URL),
            optimistic_expiry_secs: cfg
                .get_int("optimistic_expiry_secs")
                .unwrap_or(90)
                .max(1) as u64,
            notification_ms: cfg.get_int("notification_ms").unwrap_or(4000).max(1) as u64,
            debug_console: cfg.get_bool("debug_console").unwrap_or(false),
            log_path: cfg
                .get_string("log_path")
                .map(PathBuf::from)
                .unwrap_or_else(|_| base_dir()),
        }
    }

    pub fn apply_overrides(mut self, ov: &AppConfigOverrides) -> Self {
        if let Some(l) = &ov.log_level {
            self.log_level = l.clone();
        }
        if let Some(c) = &ov.cloud_name {
            self.cloud_name = c.clone();
        }
        if let Some(p) = &ov.upload_preset {
            self.upload_preset = p.clone();
        }
        if ov.debug_console {
            self.debug_console = true;
        }
        self
    }

    pub fn save_to(&self, path: Option<PathBuf>) -> std::io::Result<()> {
        let path = path.unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, data)
    }

    /// Media store settings, or `None` while no cloud name is configured.
    pub fn store_settings(&self) -> Option<StoreSettings> {
        if self.cloud_name.trim().is_empty() {
            return None;
        }
        Some(StoreSettings {
            cloud_name: self.cloud_name.clone(),
            upload_preset: self.upload_preset.clone(),
            gallery_tag: self.gallery_tag.clone(),
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
            delivery_base_url: self.delivery_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn gallery_config(&self) -> GalleryConfig {
        GalleryConfig {
            optimistic_expiry: Duration::from_secs(self.optimistic_expiry_secs),
            notification_lifetime: Duration::from_millis(self.notification_ms),
            ..GalleryConfig::default()
        }
    }
}
