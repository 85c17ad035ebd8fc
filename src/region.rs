//! Beacon regions and the monitoring lifecycle driven by region callbacks.

use serde_derive::Deserialize;
use uuid::Uuid;

use crate::ibeacon::BeaconId;

fn notify_default() -> bool {
    true
}

/// A set of beacons identified by proximity UUID and, optionally, major/minor.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BeaconRegion {
    pub identifier: String,
    pub uuid: Uuid,
    pub major: Option<u16>,
    pub minor: Option<u16>,
    #[serde(default = "notify_default")]
    pub notify_on_entry: bool,
    #[serde(default = "notify_default")]
    pub notify_on_exit: bool,
}

impl BeaconRegion {
    #[cfg(test)]
    pub fn new(identifier: impl Into<String>, uuid: Uuid) -> Self {
        BeaconRegion {
            identifier: identifier.into(),
            uuid,
            major: None,
            minor: None,
            notify_on_entry: true,
            notify_on_exit: true,
        }
    }

    pub fn matches(&self, id: &BeaconId) -> bool {
        self.uuid == id.uuid
            && self.major.is_none_or(|major| major == id.major)
            && self.minor.is_none_or(|minor| minor == id.minor)
    }
}

/// Region state as determined by the monitoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Inside,
    Outside,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionMonitoringState {
    #[default]
    NotMonitoring,
    Monitoring,
    Inside,
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    StartRanging,
    StopRanging,
    Welcome,
    Farewell,
}

#[derive(Debug, Default)]
pub struct RegionLifecycle {
    state: RegionMonitoringState,
}

impl RegionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RegionMonitoringState {
        self.state
    }

    pub fn is_ranging(&self) -> bool {
        self.state == RegionMonitoringState::Inside
    }

    /// Returns `false` if monitoring was already active.
    pub fn start_monitoring(&mut self) -> bool {
        if self.state != RegionMonitoringState::NotMonitoring {
            return false;
        }
        self.state = RegionMonitoringState::Monitoring;
        true
    }

    pub fn stop_monitoring(&mut self) -> Vec<LifecycleAction> {
        let was_ranging = self.is_ranging();
        self.state = RegionMonitoringState::NotMonitoring;
        if was_ranging {
            vec![LifecycleAction::StopRanging]
        } else {
            Vec::new()
        }
    }

    pub fn determine(&mut self, state: RegionState) -> Vec<LifecycleAction> {
        use RegionMonitoringState as S;

        match (self.state, state) {
            (S::NotMonitoring, _) | (_, RegionState::Unknown) => Vec::new(),
            (S::Inside, RegionState::Inside) | (S::Outside, RegionState::Outside) => Vec::new(),
            (S::Monitoring | S::Outside, RegionState::Inside) => {
                self.state = S::Inside;
                vec![LifecycleAction::StartRanging, LifecycleAction::Welcome]
            }
            (S::Monitoring, RegionState::Outside) => {
                self.state = S::Outside;
                Vec::new()
            }
            (S::Inside, RegionState::Outside) => {
                self.state = S::Outside;
                vec![LifecycleAction::StopRanging, LifecycleAction::Farewell]
            }
        }
    }

    pub fn entered(&mut self) -> Vec<LifecycleAction> {
        self.determine(RegionState::Inside)
    }

    pub fn exited(&mut self) -> Vec<LifecycleAction> {
        self.determine(RegionState::Outside)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleAction::*;

    fn monitoring() -> RegionLifecycle {
        let mut lifecycle = RegionLifecycle::new();
        assert!(lifecycle.start_monitoring());
        lifecycle
    }

    #[test]
    fn test_region_matching() {
        let uuid = Uuid::parse_str("e2c56db5-dffb-48d2-b060-d0f5a71096e0").unwrap();
        let id = BeaconId {
            uuid,
            major: 1,
            minor: 2,
        };

        let mut region = BeaconRegion::new("store", uuid);
        assert!(region.matches(&id));

        region.major = Some(1);
        assert!(region.matches(&id));
        region.minor = Some(3);
        assert!(!region.matches(&id));

        let other = BeaconId {
            uuid: Uuid::nil(),
            ..id
        };
        assert!(!BeaconRegion::new("store", uuid).matches(&other));
    }

    #[test]
    fn test_subscribe_moves_to_monitoring() {
        let mut lifecycle = RegionLifecycle::new();
        assert_eq!(lifecycle.state(), RegionMonitoringState::NotMonitoring);
        assert!(lifecycle.start_monitoring());
        assert_eq!(lifecycle.state(), RegionMonitoringState::Monitoring);
        assert!(!lifecycle.start_monitoring());
    }

    #[test]
    fn test_events_before_monitoring_are_ignored() {
        let mut lifecycle = RegionLifecycle::new();
        assert!(lifecycle.entered().is_empty());
        assert!(lifecycle.determine(RegionState::Outside).is_empty());
        assert_eq!(lifecycle.state(), RegionMonitoringState::NotMonitoring);
    }

    #[test]
    fn test_inside_starts_ranging_and_welcomes_once() {
        let mut lifecycle = monitoring();
        assert_eq!(
            lifecycle.determine(RegionState::Inside),
            vec![StartRanging, Welcome]
        );
        assert!(lifecycle.is_ranging());

        // The monitoring service reports both a determination and an enter.
        assert!(lifecycle.entered().is_empty());
        assert!(lifecycle.determine(RegionState::Inside).is_empty());
    }

    #[test]
    fn test_leaving_stops_ranging_and_says_goodbye_once() {
        let mut lifecycle = monitoring();
        lifecycle.entered();
        assert_eq!(lifecycle.exited(), vec![StopRanging, Farewell]);
        assert_eq!(lifecycle.state(), RegionMonitoringState::Outside);
        assert!(!lifecycle.is_ranging());
        assert!(lifecycle.determine(RegionState::Outside).is_empty());
    }

    #[test]
    fn test_initially_outside_is_silent() {
        let mut lifecycle = monitoring();
        assert!(lifecycle.determine(RegionState::Outside).is_empty());
        assert_eq!(lifecycle.state(), RegionMonitoringState::Outside);

        assert_eq!(lifecycle.entered(), vec![StartRanging, Welcome]);
    }

    #[test]
    fn test_unknown_determination_changes_nothing() {
        let mut lifecycle = monitoring();
        assert!(lifecycle.determine(RegionState::Unknown).is_empty());
        assert_eq!(lifecycle.state(), RegionMonitoringState::Monitoring);

        lifecycle.entered();
        assert!(lifecycle.determine(RegionState::Unknown).is_empty());
        assert!(lifecycle.is_ranging());
    }

    #[test]
    fn test_repeated_visits() {
        let mut lifecycle = monitoring();
        let mut actions = Vec::new();
        for _ in 0..3 {
            actions.extend(lifecycle.entered());
            actions.extend(lifecycle.entered());
            actions.extend(lifecycle.exited());
            actions.extend(lifecycle.exited());
        }
        assert_eq!(actions.iter().filter(|a| **a == Welcome).count(), 3);
        assert_eq!(actions.iter().filter(|a| **a == Farewell).count(), 3);
    }

    #[test]
    fn test_stop_monitoring() {
        let mut lifecycle = monitoring();
        assert!(lifecycle.stop_monitoring().is_empty());

        let mut lifecycle = monitoring();
        lifecycle.entered();
        assert_eq!(lifecycle.stop_monitoring(), vec![StopRanging]);
        assert_eq!(lifecycle.state(), RegionMonitoringState::NotMonitoring);
        assert!(lifecycle.exited().is_empty());
    }
}
