use std::time::Instant;

use btleplug::api::CentralState;

use crate::ibeacon::BeaconId;
use crate::proximity::Proximity;
use crate::region::{BeaconRegion, RegionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
}

impl From<CentralState> for AuthorizationStatus {
    fn from(state: CentralState) -> Self {
        match state {
            CentralState::PoweredOn => AuthorizationStatus::AuthorizedAlways,
            CentralState::PoweredOff => AuthorizationStatus::Denied,
            CentralState::Unknown => AuthorizationStatus::NotDetermined,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BeaconObservation {
    pub id: BeaconId,
    pub proximity: Proximity,
    pub rssi: Option<i16>,
    pub timestamp: Instant,
}

/// Callbacks delivered by the monitoring/ranging service, in order, on one channel.
#[derive(Clone, Debug, PartialEq)]
pub enum PlatformEvent {
    AuthorizationChanged(AuthorizationStatus),
    RegionStateDetermined(BeaconRegion, RegionState),
    RegionEntered(BeaconRegion),
    RegionExited(BeaconRegion),
    /// Beacons are ordered closest first.
    ProximityObserved(Vec<BeaconObservation>, BeaconRegion),
}

/// Requests from the manager to the scanner.
#[derive(Clone, Debug, PartialEq)]
pub enum ScannerCommand {
    Subscribe(BeaconRegion),
    Unsubscribe(String),
    StartRanging(String),
    StopRanging(String),
}
