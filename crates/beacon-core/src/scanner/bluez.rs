//! BlueZ-backed beacon scanner.
//!
//! One background task owns the adapter's discovery stream. It decodes
//! iBeacon advertisements into a [`BeaconTracker`] and, once per scan
//! period, reports region transitions and ranging snapshots on the event
//! channel. The [`BluezScanner`] handle only forwards commands to it.

use std::collections::HashMap;
use std::time::Instant;

use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::{pin_mut, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ScanConfig;
use crate::ibeacon::{parse_ibeacon, BeaconTracker, APPLE_COMPANY_ID};
use crate::scanner::{
    BeaconScanner, EventSender, RadioError, RadioResult, Region, ScanEvent,
};

#[derive(Debug)]
enum Command {
    StartMonitoring(Region),
    StopMonitoring(String),
    StartRanging(String),
    StopRanging(String),
}

#[derive(Debug)]
struct Watched {
    region: Region,
    inside: bool,
    ranging: bool,
}

/// Scanner driving the default BlueZ adapter.
#[derive(Debug)]
pub struct BluezScanner {
    commands: mpsc::UnboundedSender<Command>,
    adapter_name: Option<String>,
}

fn unavailable(err: bluer::Error) -> RadioError {
    RadioError::Unavailable {
        message: err.to_string(),
    }
}

impl BluezScanner {
    /// Open the default adapter, power it on and start the scan task.
    ///
    /// Events are delivered on `events`.
    ///
    /// # Errors
    ///
    /// Returns [`RadioError::Unavailable`] if BlueZ or the adapter cannot be
    /// reached, or the adapter cannot be powered on.
    pub async fn spawn(scan: ScanConfig, events: EventSender) -> RadioResult<Self> {
        let session = Session::new().await.map_err(unavailable)?;
        let adapter = session.default_adapter().await.map_err(unavailable)?;

        if !adapter.is_powered().await.map_err(unavailable)? {
            info!(adapter = adapter.name(), "Powering on Bluetooth adapter");
            adapter.set_powered(true).await.map_err(unavailable)?;
        }
        let adapter_name = adapter.alias().await.ok();
        info!(
            adapter = adapter.name(),
            alias = ?adapter_name,
            "Bluetooth adapter ready"
        );

        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(scan_task(session, adapter, scan, rx, events));

        Ok(Self {
            commands,
            adapter_name,
        })
    }

    fn send(&self, command: Command) -> RadioResult<()> {
        self.commands
            .send(command)
            .map_err(|_| RadioError::Disconnected)
    }
}

impl BeaconScanner for BluezScanner {
    fn start_monitoring(&mut self, region: &Region) -> RadioResult<()> {
        self.send(Command::StartMonitoring(region.clone()))
    }

    fn stop_monitoring(&mut self, region: &Region) -> RadioResult<()> {
        self.send(Command::StopMonitoring(region.name.clone()))
    }

    fn start_ranging(&mut self, region: &Region) -> RadioResult<()> {
        self.send(Command::StartRanging(region.name.clone()))
    }

    fn stop_ranging(&mut self, region: &Region) -> RadioResult<()> {
        self.send(Command::StopRanging(region.name.clone()))
    }

    fn device_identity(&self) -> Option<String> {
        self.adapter_name.clone()
    }
}

async fn scan_task(
    _session: Session,
    adapter: Adapter,
    scan: ScanConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSender,
) {
    let discovery = match adapter.discover_devices_with_changes().await {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Cannot start Bluetooth discovery");
            return;
        }
    };
    pin_mut!(discovery);

    let mut ticker = interval(scan.scan_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut tracker = BeaconTracker::new(scan.sample_expiration(), scan.region_exit());
    let mut watched: HashMap<String, Watched> = HashMap::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                apply(command, &mut watched);
            }
            Some(event) = discovery.next() => {
                if let AdapterEvent::DeviceAdded(address) = event {
                    if let Err(e) = observe(&adapter, address, &mut tracker).await {
                        debug!(%address, error = %e, "Cannot read advertisement");
                    }
                }
            }
            _ = ticker.tick() => {
                if !report(&mut tracker, &mut watched, &events) {
                    break;
                }
            }
        }
    }

    info!("Bluetooth scan task stopped");
}

fn apply(command: Command, watched: &mut HashMap<String, Watched>) {
    debug!(?command, "Scanner command");
    match command {
        Command::StartMonitoring(region) => {
            watched.insert(
                region.name.clone(),
                Watched {
                    region,
                    inside: false,
                    ranging: false,
                },
            );
        }
        Command::StopMonitoring(name) => {
            watched.remove(&name);
        }
        Command::StartRanging(name) | Command::StopRanging(name)
            if !watched.contains_key(&name) =>
        {
            warn!(region = %name, "Ranging command for unmonitored region");
        }
        Command::StartRanging(name) => {
            if let Some(w) = watched.get_mut(&name) {
                w.ranging = true;
            }
        }
        Command::StopRanging(name) => {
            if let Some(w) = watched.get_mut(&name) {
                w.ranging = false;
            }
        }
    }
}

async fn observe(
    adapter: &Adapter,
    address: Address,
    tracker: &mut BeaconTracker,
) -> bluer::Result<()> {
    let device = adapter.device(address)?;
    let Some(rssi) = device.rssi().await? else {
        return Ok(());
    };
    let Some(data) = device.manufacturer_data().await? else {
        return Ok(());
    };

    if let Some(advertisement) = data.get(&APPLE_COMPANY_ID).and_then(|d| parse_ibeacon(d)) {
        tracker.observe(advertisement, rssi, Instant::now());
    }
    Ok(())
}

/// Emit transitions and snapshots. Returns `false` once nobody listens.
fn report(
    tracker: &mut BeaconTracker,
    watched: &mut HashMap<String, Watched>,
    events: &EventSender,
) -> bool {
    let now = Instant::now();
    tracker.prune(now);

    for (name, w) in watched.iter_mut() {
        let inside = tracker.in_region(&w.region, now);
        if inside != w.inside {
            w.inside = inside;
            let event = if inside {
                ScanEvent::EnteredRegion {
                    region: name.clone(),
                }
            } else {
                ScanEvent::ExitedRegion {
                    region: name.clone(),
                }
            };
            if events.send(event).is_err() {
                return false;
            }
        }

        if w.ranging {
            let readings = tracker.snapshot(&w.region, now);
            let event = ScanEvent::Ranged {
                region: name.clone(),
                readings,
            };
            if events.send(event).is_err() {
                return false;
            }
        }
    }
    true
}
