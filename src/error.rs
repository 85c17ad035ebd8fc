//! Error type shared by the scanner, the manager and configuration loading.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FindMeError {
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded."
    )]
    AdapterNotFound,

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Configuration validation failed: {field}: {message}")]
    ConfigValidation {
        field: &'static str,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The scanner task has stopped and no longer accepts commands.
    #[error("Scanner is no longer running")]
    ScannerClosed,

    #[error("Not an iBeacon advertisement: {0}")]
    InvalidAdvertisement(&'static str),
}

pub type Result<T> = std::result::Result<T, FindMeError>;

impl FindMeError {
    /// Returns `true` if this error came from the Bluetooth side of the process.
    #[must_use]
    pub fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::AdapterNotFound | Self::Bluetooth(_) | Self::ScannerClosed
        )
    }

    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParse(_) | Self::ConfigValidation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(FindMeError::AdapterNotFound.is_bluetooth_error());
        assert!(FindMeError::ScannerClosed.is_bluetooth_error());
        assert!(!FindMeError::ScannerClosed.is_config_error());

        let err = FindMeError::ConfigValidation {
            field: "ranging.near_rssi",
            message: "too high".into(),
        };
        assert!(err.is_config_error());
        assert!(!err.is_bluetooth_error());
    }

    #[test]
    fn test_error_display_messages() {
        let err = FindMeError::ConfigNotFound(PathBuf::from("/etc/findme.toml"));
        assert!(err.to_string().contains("/etc/findme.toml"));

        let err = FindMeError::ConfigValidation {
            field: "region.identifier",
            message: "must not be empty".into(),
        };
        assert_eq!(
            err.to_string(),
            "Configuration validation failed: region.identifier: must not be empty"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FindMeError>();
    }
}
