//! BLE scanner standing in for the platform's region monitoring and ranging.
//!
//! [`RegionTracker`] holds the bookkeeping and is driven with explicit
//! timestamps; [`Scanner`] feeds it from a btleplug adapter and forwards the
//! resulting [`PlatformEvent`]s to the manager.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use btleplug::api::{Central as _, CentralEvent, CentralState, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, PeripheralId};
use futures::StreamExt as _;
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::config::RangingConfig;
use crate::error::{FindMeError, Result};
use crate::ibeacon::{APPLE_COMPANY_ID, BeaconId, IBeacon};
use crate::manager::LocationService;
use crate::messages::{AuthorizationStatus, BeaconObservation, PlatformEvent, ScannerCommand};
use crate::proximity::Proximity;
use crate::region::{BeaconRegion, RegionState};

#[derive(Debug, Clone, Copy)]
struct Sighting {
    rssi: Option<i16>,
    seen_at: Instant,
}

#[derive(Debug)]
struct MonitoredRegion {
    region: BeaconRegion,
    state: RegionState,
    ranging: bool,
    subscribed_at: Instant,
    last_seen: Option<Instant>,
    sightings: HashMap<BeaconId, Sighting>,
}

#[derive(Debug)]
pub struct RegionTracker {
    immediate_rssi: i16,
    near_rssi: i16,
    stale_after: Duration,
    exit_timeout: Duration,
    regions: Vec<MonitoredRegion>,
}

impl RegionTracker {
    pub fn new(settings: &RangingConfig) -> Self {
        RegionTracker {
            immediate_rssi: settings.immediate_rssi(),
            near_rssi: settings.near_rssi(),
            stale_after: settings.stale_after(),
            exit_timeout: settings.exit_timeout(),
            regions: Vec::new(),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        !self.regions.is_empty()
    }

    pub fn subscribe(&mut self, region: BeaconRegion, now: Instant) {
        if let Some(existing) = self
            .regions
            .iter_mut()
            .find(|r| r.region.identifier == region.identifier)
        {
            // Same identifier replaces the previous definition, keeping its state.
            existing.region = region;
            return;
        }
        self.regions.push(MonitoredRegion {
            region,
            state: RegionState::Unknown,
            ranging: false,
            subscribed_at: now,
            last_seen: None,
            sightings: HashMap::new(),
        });
    }

    pub fn unsubscribe(&mut self, identifier: &str) {
        self.regions.retain(|r| r.region.identifier != identifier);
    }

    pub fn set_ranging(&mut self, identifier: &str, ranging: bool) {
        match self
            .regions
            .iter_mut()
            .find(|r| r.region.identifier == identifier)
        {
            Some(monitored) => monitored.ranging = ranging,
            None => warn!("Ranging requested for unknown region {}", identifier),
        }
    }

    pub fn classify(&self, rssi: Option<i16>, age: Duration) -> Proximity {
        match rssi {
            _ if age > self.stale_after => Proximity::Unknown,
            Some(rssi) if rssi >= self.immediate_rssi => Proximity::Immediate,
            Some(rssi) if rssi >= self.near_rssi => Proximity::Near,
            Some(_) => Proximity::Far,
            None => Proximity::Unknown,
        }
    }

    /// Records an advertisement and reports any region it brings us into.
    pub fn record(
        &mut self,
        beacon: &IBeacon,
        rssi: Option<i16>,
        now: Instant,
    ) -> Vec<PlatformEvent> {
        let mut events = Vec::new();
        for monitored in self.regions.iter_mut() {
            if !monitored.region.matches(&beacon.id) {
                continue;
            }
            monitored.last_seen = Some(now);
            monitored.sightings.insert(beacon.id, Sighting { rssi, seen_at: now });

            if monitored.state != RegionState::Inside {
                let previous = monitored.state;
                monitored.state = RegionState::Inside;
                events.push(PlatformEvent::RegionStateDetermined(
                    monitored.region.clone(),
                    RegionState::Inside,
                ));
                if previous == RegionState::Outside && monitored.region.notify_on_entry {
                    events.push(PlatformEvent::RegionEntered(monitored.region.clone()));
                }
            }
        }
        events
    }

    /// Runs once per ranging interval: exits, initial determinations and ranging callbacks.
    pub fn tick(&mut self, now: Instant) -> Vec<PlatformEvent> {
        let mut events = Vec::new();
        for index in 0..self.regions.len() {
            let exit_timeout = self.exit_timeout;
            let monitored = &mut self.regions[index];

            match monitored.state {
                RegionState::Inside => {
                    let quiet = monitored
                        .last_seen
                        .is_none_or(|seen| now.duration_since(seen) >= exit_timeout);
                    if quiet {
                        monitored.state = RegionState::Outside;
                        monitored.sightings.clear();
                        events.push(PlatformEvent::RegionStateDetermined(
                            monitored.region.clone(),
                            RegionState::Outside,
                        ));
                        if monitored.region.notify_on_exit {
                            events.push(PlatformEvent::RegionExited(monitored.region.clone()));
                        }
                    }
                }
                RegionState::Unknown => {
                    if now.duration_since(monitored.subscribed_at) >= exit_timeout {
                        monitored.state = RegionState::Outside;
                        events.push(PlatformEvent::RegionStateDetermined(
                            monitored.region.clone(),
                            RegionState::Outside,
                        ));
                    }
                }
                RegionState::Outside => {}
            }

            let monitored = &self.regions[index];
            if monitored.ranging && monitored.state == RegionState::Inside {
                let beacons = self.observations(monitored, now);
                events.push(PlatformEvent::ProximityObserved(
                    beacons,
                    monitored.region.clone(),
                ));
            }
        }
        events
    }

    fn observations(&self, monitored: &MonitoredRegion, now: Instant) -> Vec<BeaconObservation> {
        let mut beacons: Vec<BeaconObservation> = monitored
            .sightings
            .iter()
            .map(|(id, sighting)| BeaconObservation {
                id: *id,
                proximity: self.classify(sighting.rssi, now.duration_since(sighting.seen_at)),
                rssi: sighting.rssi,
                timestamp: now,
            })
            .collect();
        beacons.sort_by_key(|b| (b.proximity.rank(), std::cmp::Reverse(b.rssi)));
        beacons
    }
}

/// Manager-side handle; sends commands to the running [`Scanner`].
#[derive(Debug, Clone)]
pub struct ScannerHandle {
    commands: mpsc::UnboundedSender<ScannerCommand>,
}

impl ScannerHandle {
    fn send(&self, command: ScannerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| FindMeError::ScannerClosed)
    }
}

impl LocationService for ScannerHandle {
    fn subscribe(&mut self, region: &BeaconRegion) -> Result<()> {
        self.send(ScannerCommand::Subscribe(region.clone()))
    }

    fn unsubscribe(&mut self, region: &BeaconRegion) -> Result<()> {
        self.send(ScannerCommand::Unsubscribe(region.identifier.clone()))
    }

    fn start_ranging(&mut self, region: &BeaconRegion) -> Result<()> {
        self.send(ScannerCommand::StartRanging(region.identifier.clone()))
    }

    fn stop_ranging(&mut self, region: &BeaconRegion) -> Result<()> {
        self.send(ScannerCommand::StopRanging(region.identifier.clone()))
    }
}

/// Authorization reported at startup, before any adapter state update arrives.
pub fn startup_authorization(
    state: std::result::Result<CentralState, btleplug::Error>,
) -> AuthorizationStatus {
    match state {
        Ok(state) => AuthorizationStatus::from(state),
        Err(err) => {
            warn!("Could not read adapter state: {}", err);
            AuthorizationStatus::Restricted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    Start,
    Stop,
    Nothing,
}

/// Whether discovery is running and whether the adapter can run it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    powered: bool,
    scanning: bool,
}

impl ScanState {
    /// An unreadable adapter state is treated as powered so a scan is still attempted.
    pub fn new(state: Option<&CentralState>) -> Self {
        ScanState {
            powered: !matches!(state, Some(CentralState::PoweredOff)),
            scanning: false,
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// BlueZ drops discovery on a power cycle, so either edge clears `scanning`.
    pub fn adapter_changed(&mut self, state: &CentralState) {
        self.powered = !matches!(state, CentralState::PoweredOff);
        self.scanning = false;
    }

    pub fn action(&self, monitoring: bool) -> ScanAction {
        match (self.powered, monitoring, self.scanning) {
            (false, _, _) => ScanAction::Nothing,
            (true, true, false) => ScanAction::Start,
            (true, false, true) => ScanAction::Stop,
            _ => ScanAction::Nothing,
        }
    }

    pub fn started(&mut self) {
        self.scanning = true;
    }

    pub fn stopped(&mut self) {
        self.scanning = false;
    }
}

pub struct Scanner {
    adapter: Adapter,
    tracker: RegionTracker,
    interval: Duration,
    scan: ScanState,
    commands: mpsc::UnboundedReceiver<ScannerCommand>,
    events: mpsc::Sender<PlatformEvent>,
}

impl Scanner {
    pub fn new(
        adapter: Adapter,
        settings: &RangingConfig,
        events: mpsc::Sender<PlatformEvent>,
    ) -> (Self, ScannerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Scanner {
                adapter,
                tracker: RegionTracker::new(settings),
                interval: settings.interval(),
                scan: ScanState::new(None),
                commands: rx,
                events,
            },
            ScannerHandle { commands: tx },
        )
    }

    pub async fn run(mut self) -> Result<()> {
        let mut adapter_events = self.adapter.events().await?;

        let state = self.adapter.adapter_state().await;
        self.scan = ScanState::new(state.as_ref().ok());
        let status = startup_authorization(state);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        if self
            .deliver(vec![PlatformEvent::AuthorizationChanged(status)])
            .await
            .is_ok()
        {
            loop {
                let delivered = tokio::select! {
                    command = self.commands.recv() => {
                        match command {
                            Some(command) => {
                                self.handle_command(command).await;
                                Ok(())
                            }
                            None => {
                                debug!("Command channel closed");
                                break;
                            }
                        }
                    }
                    event = adapter_events.next() => {
                        match event {
                            Some(CentralEvent::DeviceDiscovered(id))
                            | Some(CentralEvent::DeviceUpdated(id))
                            | Some(CentralEvent::ManufacturerDataAdvertisement { id, .. }) => {
                                let events = self.handle_advertisement(&id).await;
                                self.deliver(events).await
                            }
                            Some(CentralEvent::StateUpdate(state)) => {
                                info!("Adapter state changed: {:?}", state);
                                self.scan.adapter_changed(&state);
                                self.sync_scan().await;
                                let status = AuthorizationStatus::from(state);
                                self.deliver(vec![PlatformEvent::AuthorizationChanged(status)]).await
                            }
                            Some(_) => Ok(()),
                            None => {
                                info!("No more adapter events");
                                break;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        let events = self.tracker.tick(Instant::now());
                        self.deliver(events).await
                    }
                };
                if delivered.is_err() {
                    break;
                }
            }
        }

        if self.scan.is_scanning() {
            if let Err(err) = self.adapter.stop_scan().await {
                warn!("Error stopping scan: {}", err);
            }
            self.scan.stopped();
        }
        Ok(())
    }

    async fn handle_command(&mut self, command: ScannerCommand) {
        debug!("Scanner command: {:?}", command);
        match command {
            ScannerCommand::Subscribe(region) => {
                info!("Monitoring region {} ({})", region.identifier, region.uuid);
                self.tracker.subscribe(region, Instant::now());
            }
            ScannerCommand::Unsubscribe(identifier) => {
                info!("Stopped monitoring region {}", identifier);
                self.tracker.unsubscribe(&identifier);
            }
            ScannerCommand::StartRanging(identifier) => {
                self.tracker.set_ranging(&identifier, true);
            }
            ScannerCommand::StopRanging(identifier) => {
                self.tracker.set_ranging(&identifier, false);
            }
        }
        self.sync_scan().await;
    }

    /// Scan failures are logged and retried on the next command or adapter power-on.
    async fn sync_scan(&mut self) {
        match self.scan.action(self.tracker.is_monitoring()) {
            ScanAction::Start => match self.adapter.start_scan(ScanFilter::default()).await {
                Ok(()) => self.scan.started(),
                Err(err) => warn!("Error starting scan: {}", err),
            },
            ScanAction::Stop => {
                if let Err(err) = self.adapter.stop_scan().await {
                    warn!("Error stopping scan: {}", err);
                }
                self.scan.stopped();
            }
            ScanAction::Nothing => {}
        }
    }

    async fn handle_advertisement(&mut self, id: &PeripheralId) -> Vec<PlatformEvent> {
        let properties = match self.adapter.peripheral(id).await {
            Ok(peripheral) => peripheral.properties().await,
            Err(err) => Err(err),
        };
        let properties = match properties {
            Ok(Some(properties)) => properties,
            Ok(None) => return Vec::new(),
            Err(err) => {
                debug!("Could not read properties of {:?}: {}", id, err);
                return Vec::new();
            }
        };

        let Some(data) = properties.manufacturer_data.get(&APPLE_COMPANY_ID) else {
            return Vec::new();
        };
        match IBeacon::parse(data) {
            Ok(beacon) => {
                debug!(
                    "iBeacon {} rssi {:?} measured power {}",
                    beacon.id, properties.rssi, beacon.measured_power
                );
                self.tracker.record(&beacon, properties.rssi, Instant::now())
            }
            Err(_) => Vec::new(),
        }
    }

    async fn deliver(&self, events: Vec<PlatformEvent>) -> Result<()> {
        forward(&self.events, events).await
    }
}

/// Fails once the manager has dropped its receiver; the caller stops its loop.
async fn forward(tx: &mpsc::Sender<PlatformEvent>, events: Vec<PlatformEvent>) -> Result<()> {
    for event in events {
        if tx.send(event).await.is_err() {
            debug!("Manager stopped receiving platform events");
            return Err(FindMeError::ScannerClosed);
        }
    }
    Ok(())
}
