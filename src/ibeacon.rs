//! Decoding of iBeacon frames out of BLE manufacturer data.
//!
//! btleplug strips the company identifier from manufacturer data and uses it
//! as the map key, so the payload handed to [`IBeacon::parse`] starts at the
//! iBeacon type byte:
//!
//! ```text
//! 0x02 0x15 | proximity uuid (16) | major (2, BE) | minor (2, BE) | measured power (1, i8)
//! ```

use std::fmt;

use uuid::Uuid;

use crate::error::{FindMeError, Result};

/// https://bitbucket.org/bluetooth-SIG/public/src/main/assigned_numbers/company_identifiers/company_identifiers.yaml
pub const APPLE_COMPANY_ID: u16 = 0x004C;

const IBEACON_TYPE: u8 = 0x02;
const IBEACON_LENGTH: u8 = 0x15;
const FRAME_LEN: usize = 2 + IBEACON_LENGTH as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BeaconId {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.uuid, self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IBeacon {
    pub id: BeaconId,
    /// Calibrated RSSI at one metre, as advertised by the transmitter.
    pub measured_power: i8,
}

impl IBeacon {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_LEN {
            return Err(FindMeError::InvalidAdvertisement("frame too short"));
        }
        if data[0] != IBEACON_TYPE || data[1] != IBEACON_LENGTH {
            return Err(FindMeError::InvalidAdvertisement("wrong type or length"));
        }

        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&data[2..18]);

        Ok(IBeacon {
            id: BeaconId {
                uuid: Uuid::from_bytes(uuid),
                major: u16::from_be_bytes([data[18], data[19]]),
                minor: u16::from_be_bytes([data[20], data[21]]),
            },
            measured_power: data[22] as i8,
        })
    }
}

#[cfg(test)]
pub(crate) fn frame(id: &BeaconId, measured_power: i8) -> Vec<u8> {
    let mut data = vec![IBEACON_TYPE, IBEACON_LENGTH];
    data.extend_from_slice(id.uuid.as_bytes());
    data.extend_from_slice(&id.major.to_be_bytes());
    data.extend_from_slice(&id.minor.to_be_bytes());
    data.push(measured_power as u8);
    data
}
