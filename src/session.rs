//! Scan, select, connect, stream and tear down one heart rate session.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::StreamExt;
use stream_cancel::Tripwire;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use uuid::Uuid;

use crate::common::{characteristics::HEART_RATE_MEASUREMENT, services::HEART_RATE};
use crate::error::SessionError;
use crate::measurement;
use crate::prompt::Operator;
use crate::service::find_notifiable;
use crate::sink::SampleSink;
use crate::transport::{NotificationStream, Transport};
use crate::{DeviceRegistry, DiscoveredDevice, HistoryBuffer};

/// Shortest accepted liveness interval; a zero period cannot drive a timer.
pub const MIN_LIVENESS_INTERVAL: Duration = Duration::from_millis(1);

pub struct SessionConfig {
    /// Index of the Bluetooth adapter to use. The first found adapter is used by default.
    adapter_index: usize,
    /// How long to collect advertisements before offering a selection.
    scan_window: Duration,
    /// How often the link is checked while streaming.
    liveness_interval: Duration,
    /// Directory the session's CSV file is written to.
    output_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            scan_window: Duration::from_secs(8),
            liveness_interval: Duration::from_secs(1),
            output_dir: PathBuf::from("."),
        }
    }
}

impl SessionConfig {
    /// Index of bluetooth adapter to use
    pub fn adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Scan for the given duration
    pub fn scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    /// Check the connection at the given interval while streaming, at least every millisecond
    pub fn liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval.max(MIN_LIVENESS_INTERVAL);
        self
    }

    /// Write recordings into `dir`
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn get_adapter_index(&self) -> usize {
        self.adapter_index
    }

    pub fn get_output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    AwaitingSelection,
    Connecting,
    Connected,
    Streaming,
    Disconnected,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }

    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, AwaitingSelection)
                | (Scanning, Failed)
                | (Scanning, Disconnected)
                | (AwaitingSelection, Connecting)
                | (AwaitingSelection, Failed)
                | (AwaitingSelection, Disconnected)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connected, Streaming)
                | (Connected, Failed)
                | (Streaming, Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peripheral went away or the notification stream ended.
    LinkLost,
    /// The operator interrupted the session.
    Interrupted,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::LinkLost => f.write_str("connection lost"),
            DisconnectReason::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Disconnected(DisconnectReason),
    Failed(SessionError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Disconnected(_) => SessionState::Disconnected,
            SessionOutcome::Failed(_) => SessionState::Failed,
        }
    }
}

/// Drives one session from scan to teardown.
///
/// A controller runs at most once; every failure is terminal.
pub struct SessionController<T, S, O> {
    config: SessionConfig,
    transport: T,
    sink: S,
    operator: O,
    interrupt: Tripwire,
    state: SessionState,
    selected: Option<DiscoveredDevice>,
    history: HistoryBuffer,
    started_at: DateTime<Local>,
    samples_written: usize,
}

impl<T, S, O> SessionController<T, S, O>
where
    T: Transport,
    S: SampleSink,
    O: Operator,
{
    pub fn new(config: SessionConfig, transport: T, sink: S, operator: O, interrupt: Tripwire) -> Self {
        Self {
            config,
            transport,
            sink,
            operator,
            interrupt,
            state: SessionState::Idle,
            selected: None,
            history: HistoryBuffer::new(),
            started_at: Local::now(),
            samples_written: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected_device(&self) -> Option<&DiscoveredDevice> {
        self.selected.as_ref()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn samples_written(&self) -> usize {
        self.samples_written
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.sink.location()
    }

    /// Run the session to a terminal state.
    pub async fn run(&mut self) -> SessionOutcome {
        if self.state != SessionState::Idle {
            log::warn!("Session already ran, ended in {}", self.state);
            return SessionOutcome::Failed(SessionError::AlreadyRan);
        }

        self.started_at = Local::now();
        let outcome = self.drive().await;

        match &outcome {
            SessionOutcome::Disconnected(reason) => {
                log::info!("Session ended: {}", reason);
            }
            SessionOutcome::Failed(e) => log::error!("Session failed: {}", e),
        }

        self.advance(outcome.state());
        outcome
    }

    async fn drive(&mut self) -> SessionOutcome {
        self.advance(SessionState::Scanning);
        let devices = match self.scan().await {
            Ok(devices) => devices,
            Err(outcome) => return outcome,
        };

        self.advance(SessionState::AwaitingSelection);
        let device = match self.select(devices).await {
            Ok(device) => device,
            Err(outcome) => return outcome,
        };

        self.advance(SessionState::Connecting);
        log::info!("Connecting to {}", device);
        self.selected = Some(device.clone());
        let connection = match self.transport.connect(&device).await {
            Ok(connection) => connection,
            Err(e) => return SessionOutcome::Failed(e.into()),
        };

        self.advance(SessionState::Connected);
        let notifications = match self.prepare(&connection).await {
            Ok(notifications) => notifications,
            Err(e) => {
                self.teardown(&connection).await;
                return SessionOutcome::Failed(e);
            }
        };

        self.advance(SessionState::Streaming);
        log::info!("Receiving heart rate data, press Ctrl+C to stop");
        let reason = self.stream(&connection, notifications).await;
        self.teardown(&connection).await;

        SessionOutcome::Disconnected(reason)
    }

    async fn scan(&mut self) -> Result<Vec<DiscoveredDevice>, SessionOutcome> {
        log::info!("Scanning for heart rate devices...");

        let mut registry = DeviceRegistry::new();
        let mut on_advertisement = |device: DiscoveredDevice, services: &[Uuid]| {
            registry.on_advertisement(device, services);
        };

        let interrupt = self.interrupt.clone();
        let scanned = tokio::select! {
            biased;
            _ = interrupt => {
                return Err(SessionOutcome::Disconnected(DisconnectReason::Interrupted))
            }
            scanned = self.transport.scan(self.config.scan_window, &mut on_advertisement) => scanned,
        };

        if let Err(e) = scanned {
            return Err(SessionOutcome::Failed(e.into()));
        }

        if registry.is_empty() {
            return Err(SessionOutcome::Failed(SessionError::NoDevices));
        }

        Ok(registry.into_results())
    }

    async fn select(
        &mut self,
        devices: Vec<DiscoveredDevice>,
    ) -> Result<DiscoveredDevice, SessionOutcome> {
        let interrupt = self.interrupt.clone();
        let choice = tokio::select! {
            biased;
            _ = interrupt => {
                return Err(SessionOutcome::Disconnected(DisconnectReason::Interrupted))
            }
            choice = self.operator.choose(&devices) => choice,
        };

        choice
            .and_then(|index| devices.into_iter().nth(index))
            .ok_or_else(|| SessionOutcome::Failed(SessionError::SelectionCancelled))
    }

    /// Locate the measurement characteristic, open the sink and subscribe.
    async fn prepare(
        &mut self,
        connection: &T::Connection,
    ) -> Result<NotificationStream, SessionError> {
        let services = self.transport.list_services(connection).await?;
        if find_notifiable(&services, HEART_RATE, HEART_RATE_MEASUREMENT).is_none() {
            return Err(SessionError::MissingCharacteristic);
        }

        self.sink.open(self.started_at)?;

        log::debug!("Subscribing to characteristic {}", HEART_RATE_MEASUREMENT);
        let notifications = self
            .transport
            .subscribe(connection, HEART_RATE_MEASUREMENT)
            .await?;

        Ok(notifications)
    }

    async fn stream(
        &mut self,
        connection: &T::Connection,
        mut notifications: NotificationStream,
    ) -> DisconnectReason {
        let mut interval = tokio::time::interval(self.config.liveness_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut liveness = IntervalStream::new(interval);

        let interrupt = self.interrupt.clone();
        tokio::pin!(interrupt);

        loop {
            tokio::select! {
                biased;
                _ = &mut interrupt => return DisconnectReason::Interrupted,
                payload = notifications.next() => match payload {
                    Some(payload) => self.on_notification(&payload),
                    None => return DisconnectReason::LinkLost,
                },
                _ = liveness.next() => {
                    match self.transport.is_connected(connection).await {
                        Ok(true) => {}
                        Ok(false) => return DisconnectReason::LinkLost,
                        Err(e) => {
                            log::warn!("Could not check connection: {}", e);
                            return DisconnectReason::LinkLost;
                        }
                    }
                }
            }
        }
    }

    fn on_notification(&mut self, payload: &[u8]) {
        let sample = match measurement::parse(payload, Local::now()) {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("Skipping malformed measurement {:02x?}: {}", payload, e);
                return;
            }
        };

        if !sample.is_plausible() {
            log::warn!("Implausible heart rate {} bpm", sample.heart_rate);
        }

        self.history.append(sample);

        match self.sink.write(&sample) {
            Ok(()) => self.samples_written += 1,
            Err(e) => log::warn!("Failed to persist sample: {}", e),
        }

        log::info!(
            "{} heart rate: {} bpm",
            sample.captured_at.format("%H:%M:%S"),
            sample.heart_rate
        );
    }

    /// Disconnect if still connected, then close the sink.
    async fn teardown(&mut self, connection: &T::Connection) {
        let connected = match self.transport.is_connected(connection).await {
            Ok(connected) => connected,
            Err(e) => {
                log::debug!("Could not check connection before disconnecting: {}", e);
                true
            }
        };

        if connected {
            match self.transport.disconnect(connection).await {
                Ok(()) => log::info!("Device disconnected"),
                Err(e) => log::warn!("Failed to disconnect: {}", e),
            }
        }

        self.sink.close();
    }

    fn advance(&mut self, next: SessionState) {
        if !self.state.can_advance_to(next) {
            log::error!("Invalid session transition {} -> {}", self.state, next);
            debug_assert!(false, "invalid session transition {} -> {}", self.state, next);
        }

        log::debug!("Session {} -> {}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    const ALL: [SessionState; 8] = [
        Idle,
        Scanning,
        AwaitingSelection,
        Connecting,
        Connected,
        Streaming,
        Disconnected,
        Failed,
    ];

    #[test]
    fn terminal_states_have_no_successors() {
        for next in ALL {
            assert!(!Disconnected.can_advance_to(next));
            assert!(!Failed.can_advance_to(next));
        }
    }

    #[test]
    fn no_state_is_revisited() {
        for state in ALL {
            assert!(!state.can_advance_to(state));
            assert!(!state.can_advance_to(Idle));
        }
    }

    #[test]
    fn happy_path() {
        let path = [Idle, Scanning, AwaitingSelection, Connecting, Connected, Streaming, Disconnected];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn streaming_cannot_fail() {
        assert!(!Streaming.can_advance_to(Failed));
        assert!(!Connecting.can_advance_to(Disconnected));
    }

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.scan_window, Duration::from_secs(8));
        assert_eq!(config.liveness_interval, Duration::from_secs(1));
        assert_eq!(config.get_adapter_index(), 0);
        assert_eq!(config.get_output_dir(), Path::new("."));
    }

    #[test]
    fn zero_liveness_interval_is_clamped() {
        let config = SessionConfig::default().liveness_interval(Duration::ZERO);
        assert_eq!(config.liveness_interval, MIN_LIVENESS_INTERVAL);

        let config = SessionConfig::default().liveness_interval(Duration::from_millis(250));
        assert_eq!(config.liveness_interval, Duration::from_millis(250));
    }
}
