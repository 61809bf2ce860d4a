//! In-memory scanner for tests and radio-less hosts.
//!
//! [`MockScanner`] accepts every command, records it, and can be told to
//! fail specific commands. Clones share state, so a test can keep a handle
//! after moving the scanner into a monitor.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::scanner::{BeaconScanner, RadioError, RadioResult, Region};

/// A command received by the mock scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScannerCommand {
    /// `start_monitoring`
    StartMonitoring,
    /// `stop_monitoring`
    StopMonitoring,
    /// `start_ranging`
    StartRanging,
    /// `stop_ranging`
    StopRanging,
}

impl ScannerCommand {
    const fn name(self) -> &'static str {
        match self {
            Self::StartMonitoring => "start_monitoring",
            Self::StopMonitoring => "stop_monitoring",
            Self::StartRanging => "start_ranging",
            Self::StopRanging => "stop_ranging",
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    commands: Vec<(ScannerCommand, String)>,
    failing: HashSet<ScannerCommand>,
}

/// Scanner double that records commands.
#[derive(Debug, Clone, Default)]
pub struct MockScanner {
    state: Arc<Mutex<MockState>>,
    identity: Option<String>,
}

impl MockScanner {
    /// Create a scanner without a device name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scanner reporting `identity` as its device name.
    #[must_use]
    pub fn with_identity(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            ..Self::default()
        }
    }

    /// Make `command` fail until [`succeed`](Self::succeed) is called.
    pub fn fail(&self, command: ScannerCommand) {
        self.lock().failing.insert(command);
    }

    /// Make `command` succeed again.
    pub fn succeed(&self, command: ScannerCommand) {
        self.lock().failing.remove(&command);
    }

    /// Commands received so far, failed ones included.
    #[must_use]
    pub fn commands(&self) -> Vec<ScannerCommand> {
        self.lock().commands.iter().map(|(c, _)| *c).collect()
    }

    /// Region names the commands were issued for.
    #[must_use]
    pub fn regions(&self) -> Vec<String> {
        self.lock().commands.iter().map(|(_, r)| r.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, command: ScannerCommand, region: &Region) -> RadioResult<()> {
        let mut state = self.lock();
        state.commands.push((command, region.name.clone()));
        if state.failing.contains(&command) {
            Err(RadioError::CommandFailed {
                operation: command.name(),
                message: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl BeaconScanner for MockScanner {
    fn start_monitoring(&mut self, region: &Region) -> RadioResult<()> {
        self.record(ScannerCommand::StartMonitoring, region)
    }

    fn stop_monitoring(&mut self, region: &Region) -> RadioResult<()> {
        self.record(ScannerCommand::StopMonitoring, region)
    }

    fn start_ranging(&mut self, region: &Region) -> RadioResult<()> {
        self.record(ScannerCommand::StartRanging, region)
    }

    fn stop_ranging(&mut self, region: &Region) -> RadioResult<()> {
        self.record(ScannerCommand::StopRanging, region)
    }

    fn device_identity(&self) -> Option<String> {
        self.identity.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_records_commands_through_clones() {
        let scanner = MockScanner::new();
        let mut moved = scanner.clone();
        let region = Region::new("myBeacon", Uuid::nil());

        moved.start_monitoring(&region).unwrap();
        moved.start_ranging(&region).unwrap();

        assert_eq!(
            scanner.commands(),
            vec![ScannerCommand::StartMonitoring, ScannerCommand::StartRanging]
        );
        assert_eq!(scanner.regions(), vec!["myBeacon", "myBeacon"]);
    }

    #[test]
    fn test_injected_failures() {
        let mut scanner = MockScanner::new();
        let region = Region::new("myBeacon", Uuid::nil());

        scanner.fail(ScannerCommand::StartRanging);
        let err = scanner.start_ranging(&region).unwrap_err();
        assert!(err.to_string().contains("start_ranging"));

        scanner.succeed(ScannerCommand::StartRanging);
        assert!(scanner.start_ranging(&region).is_ok());
    }

    #[test]
    fn test_identity() {
        assert_eq!(MockScanner::new().device_identity(), None);
        assert_eq!(
            MockScanner::with_identity("Pixel 8").device_identity(),
            Some("Pixel 8".to_string())
        );
    }
}
