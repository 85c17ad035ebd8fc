use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::messages::{AuthorizationStatus, BeaconObservation, PlatformEvent};
use crate::proximity::{Color, Proximity, ProximityDisplay, ProximityTracker};
use crate::region::{BeaconRegion, LifecycleAction, RegionLifecycle};
use crate::ui::Ui;

const PERMISSION_TITLE: &str = "Permission Error";
const PERMISSION_MESSAGE: &str = "Need Location Service Permission To Access Beacon";
const UNDECIDED_TITLE: &str = "Background Location Access Disabled";
const UNDECIDED_MESSAGE: &str = "In order to be notified about nearby beacons, please power on the Bluetooth adapter and allow this process to scan.";
const IMMEDIATE_NOTIFICATION: &str = "You are right next to the beacon";

/// Monitoring and ranging requests towards the platform.
pub trait LocationService {
    fn subscribe(&mut self, region: &BeaconRegion) -> Result<()>;
    fn unsubscribe(&mut self, region: &BeaconRegion) -> Result<()>;
    fn start_ranging(&mut self, region: &BeaconRegion) -> Result<()>;
    fn stop_ranging(&mut self, region: &BeaconRegion) -> Result<()>;
}

/// Reacts to platform callbacks for a single beacon region.
///
/// Callbacks are handled one at a time, in delivery order.
pub struct Manager<L, U> {
    region: BeaconRegion,
    location: L,
    ui: U,
    lifecycle: RegionLifecycle,
    proximity: ProximityTracker,
}

impl<L: LocationService, U: Ui> Manager<L, U> {
    pub fn new(region: BeaconRegion, location: L, ui: U) -> Self {
        Manager {
            region,
            location,
            ui,
            lifecycle: RegionLifecycle::new(),
            proximity: ProximityTracker::new(),
        }
    }

    pub fn lifecycle(&self) -> &RegionLifecycle {
        &self.lifecycle
    }

    pub fn start(&mut self) {
        info!("Setting up the iBeacon reading for {}", self.region.identifier);
        self.ui.set_background_color(Color::Gray);

        if !self.lifecycle.start_monitoring() {
            return;
        }
        if let Err(err) = self.location.subscribe(&self.region) {
            error!("Error subscribing to region {}: {}", self.region.identifier, err);
        }
    }

    pub fn stop(&mut self) {
        debug!("Last proximity before stopping: {}", self.proximity.last());
        let actions = self.lifecycle.stop_monitoring();
        self.apply(actions);
        if let Err(err) = self.location.unsubscribe(&self.region) {
            error!("Error unsubscribing from region {}: {}", self.region.identifier, err);
        }
    }

    pub fn handle_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::AuthorizationChanged(status) => self.authorization_changed(status),
            PlatformEvent::RegionStateDetermined(region, state) if self.is_ours(&region) => {
                debug!("Region {} determined {:?}", region.identifier, state);
                let actions = self.lifecycle.determine(state);
                self.apply(actions);
            }
            PlatformEvent::RegionEntered(region) if self.is_ours(&region) => {
                let actions = self.lifecycle.entered();
                self.apply(actions);
            }
            PlatformEvent::RegionExited(region) if self.is_ours(&region) => {
                let actions = self.lifecycle.exited();
                self.apply(actions);
            }
            PlatformEvent::ProximityObserved(beacons, region) if self.is_ours(&region) => {
                self.proximity_observed(&beacons);
            }
            other => debug!("Ignoring event for another region: {:?}", other),
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<PlatformEvent>) -> Self {
        self.start();
        let interrupted = tokio::signal::ctrl_c();
        tokio::pin!(interrupted);
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        warn!("Platform event stream closed");
                        break;
                    }
                },
                _ = &mut interrupted => {
                    info!("Interrupted, stopping monitoring");
                    break;
                }
            }
        }
        self.stop();
        self
    }

    fn is_ours(&self, region: &BeaconRegion) -> bool {
        region.identifier == self.region.identifier
    }

    fn authorization_changed(&mut self, status: AuthorizationStatus) {
        info!("Authorization changed: {:?}", status);
        match status {
            AuthorizationStatus::AuthorizedAlways => {}
            AuthorizationStatus::Restricted | AuthorizationStatus::Denied => {
                self.ui.show_alert(PERMISSION_TITLE, PERMISSION_MESSAGE);
            }
            AuthorizationStatus::NotDetermined => {
                self.ui.show_alert(UNDECIDED_TITLE, UNDECIDED_MESSAGE);
            }
        }
    }

    fn apply(&mut self, actions: Vec<LifecycleAction>) {
        for action in actions {
            match action {
                LifecycleAction::StartRanging => {
                    if let Err(err) = self.location.start_ranging(&self.region) {
                        error!("Error starting ranging: {}", err);
                    }
                }
                LifecycleAction::StopRanging => {
                    if let Err(err) = self.location.stop_ranging(&self.region) {
                        error!("Error stopping ranging: {}", err);
                    }
                    if let Some(display) = self.proximity.reset() {
                        self.show(display);
                    }
                }
                LifecycleAction::Welcome => self.ui.show_alert("Welcome", "Welcome to our store"),
                LifecycleAction::Farewell => self.ui.show_alert("Good Bye", "Have a nice day"),
            }
        }
    }

    fn proximity_observed(&mut self, beacons: &[BeaconObservation]) {
        if !self.lifecycle.is_ranging() {
            return;
        }
        let Some(closest) = beacons.first() else {
            return;
        };
        let Some(display) = self.proximity.observe(closest.proximity) else {
            return;
        };

        debug!(
            "Beacon details: uuid={} identifier={} major={} minor={} rssi={:?} distance={}",
            closest.id.uuid,
            self.region.identifier,
            closest.id.major,
            closest.id.minor,
            closest.rssi,
            display.message
        );
        self.show(display);
        if display.proximity == Proximity::Immediate {
            self.ui.schedule_local_notification(IMMEDIATE_NOTIFICATION);
        }
    }

    fn show(&mut self, display: ProximityDisplay) {
        self.ui.set_background_color(display.color);
        self.ui.set_status_text(display.message);
    }
}
