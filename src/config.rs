// Runtime configuration, read from KODEGEN_NOTIFY_* environment variables

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::components::{NotificationError, NotificationResult};

/// Environment variable prefix for [`NotifyConfig::from_env`]
pub const ENV_PREFIX: &str = "KODEGEN_NOTIFY_";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Bounded wait for large-icon and action-icon resolution
    pub asset_timeout_secs: u64,
    /// Bounded wait for the whole style stage, longer than one asset wait so
    /// slow style images degrade individually
    pub style_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_image_bytes: u64,
    pub image_cache_ttl_secs: u64,
    pub image_cache_entries: usize,
    /// Directory holding named bitmap and sound resources
    pub resource_dir: Option<PathBuf>,
    pub database_path: PathBuf,
    pub user_agent: String,
    pub app_name: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            asset_timeout_secs: 10,
            style_timeout_secs: 15,
            http_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_image_bytes: 10 * 1024 * 1024,
            image_cache_ttl_secs: 3600,
            image_cache_entries: 100,
            resource_dir: None,
            database_path: PathBuf::from("notify_triggers.db"),
            user_agent: "KODEGEN-Notifications/1.0".to_string(),
            app_name: "KODEGEN".to_string(),
        }
    }
}

impl NotifyConfig {
    /// Load from `KODEGEN_NOTIFY_*` variables, unset ones keep their defaults
    pub fn from_env() -> NotificationResult<Self> {
        envy::prefixed(ENV_PREFIX)
            .from_env::<NotifyConfig>()
            .map_err(|e| NotificationError::Config(e.to_string()))
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_timeout_secs)
    }

    pub fn style_timeout(&self) -> Duration {
        Duration::from_secs(self.style_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn image_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.image_cache_ttl_secs)
    }
}
