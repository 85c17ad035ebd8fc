use std::path::Path;
use std::time::Duration;

use serde_derive::Deserialize;

use crate::error::{FindMeError, Result};
use crate::region::BeaconRegion;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub region: BeaconRegion,
    pub ranging: Option<RangingConfig>,
    pub mqtt: Option<MqttConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

/// Tuning for the scanner that stands in for the platform ranging service.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct RangingConfig {
    pub immediate_rssi: Option<i16>,
    pub near_rssi: Option<i16>,
    pub interval_millis: Option<u64>,
    pub stale_seconds: Option<u64>,
    pub exit_timeout_seconds: Option<u64>,
}

impl RangingConfig {
    pub fn immediate_rssi(&self) -> i16 {
        self.immediate_rssi.unwrap_or(-55)
    }

    pub fn near_rssi(&self) -> i16 {
        self.near_rssi.unwrap_or(-75)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_millis.unwrap_or(1000))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_seconds.unwrap_or(5))
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_timeout_seconds.unwrap_or(30))
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FindMeError::ConfigNotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::de::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn ranging(&self) -> RangingConfig {
        self.ranging.clone().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.identifier.trim().is_empty() {
            return Err(FindMeError::ConfigValidation {
                field: "region.identifier",
                message: "must not be empty".to_string(),
            });
        }

        let ranging = self.ranging();
        if ranging.near_rssi() > ranging.immediate_rssi() {
            return Err(FindMeError::ConfigValidation {
                field: "ranging.near_rssi",
                message: format!(
                    "{} dBm is stronger than immediate_rssi ({} dBm)",
                    ranging.near_rssi(),
                    ranging.immediate_rssi()
                ),
            });
        }
        if ranging.interval().is_zero() {
            return Err(FindMeError::ConfigValidation {
                field: "ranging.interval_millis",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
