//! Reader session: one negotiated link, its command path and its event stream.
//!
//! Inbound notifications are handled by a single pump task, strictly in
//! arrival order. Decoded tag reports go through the [`TagAggregator`];
//! everything the caller may care about is published as a [`SessionEvent`].

use crate::ble::{BleTransport, CharacteristicHandle, DeviceHandle};
use crate::config::{FrequencyRegion, MAX_POWER_DBM, ReaderSettings};
use crate::error::{AppError, Result};
use crate::frame::{Bank, Command, InboundEvent, OpStatus, decode, encode, format_frame};
use crate::models::TagRecord;
use crate::negotiate::{
    ConnectionCandidate, ConnectionNegotiator, LinkHandle, LinkMode, NegotiationOutcome, StrategyKind,
};
use crate::tags::TagAggregator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often elapsed inventory time is published.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Link state as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Something the session wants the caller to know about.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected {
        device: DeviceHandle,
        strategy: StrategyKind,
        candidate: ConnectionCandidate,
    },
    Disconnected,
    /// A tag report, already folded into the tag table.
    Tag {
        record: TagRecord,
        beep: bool,
    },
    ReadResult {
        status: OpStatus,
        data: Option<String>,
    },
    WriteResult {
        status: OpStatus,
    },
    Power {
        dbm: u8,
    },
    Frequency {
        mode: u8,
        region: Option<FrequencyRegion>,
    },
    InventoryStopped,
    Unrecognized {
        raw: Vec<u8>,
    },
    /// Time since the current inventory run started.
    Elapsed(Duration),
}

/// The parts of a [`LinkHandle`] the session keeps after the pump takes the channels.
#[derive(Debug, Clone)]
struct ActiveLink {
    device: DeviceHandle,
    characteristic: CharacteristicHandle,
    mode: LinkMode,
}

/// State shared with the pump and ticker tasks.
struct Shared {
    link: Mutex<Option<ActiveLink>>,
    tags: Mutex<TagAggregator>,
    settings: Mutex<ReaderSettings>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Sender<ConnectionState>,
    scanning: AtomicBool,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every attach and disconnect; a pump only acts for its own link.
    generation: AtomicU64,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn is_connected(&self) -> bool {
        *self.state.borrow() == ConnectionState::Connected
    }

    fn stop_ticker(&self) {
        let handle = match self.ticker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn set_ticker(&self, handle: JoinHandle<()>) {
        let previous = match self.ticker.lock() {
            Ok(mut guard) => guard.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Move to `Disconnected`; emits the event only on the first call.
    fn mark_disconnected(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Disconnected;
                true
            }
        });
        if changed {
            self.emit(SessionEvent::Disconnected);
        }
    }

    /// The device went away: stop inventory work, forget the link, keep the tags.
    async fn link_lost(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        info!("Reader disconnected");
        self.scanning.store(false, Ordering::SeqCst);
        self.stop_ticker();
        self.link.lock().await.take();
        self.mark_disconnected();
    }

    async fn dispatch(&self, bytes: &[u8]) {
        debug!("RX {}", format_frame(bytes));

        let event = match decode(bytes) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping frame [{}]: {}", format_frame(bytes), e);
                return;
            }
        };

        let event = match event {
            InboundEvent::TagReport(report) => {
                let record = self.tags.lock().await.update(&report).clone();
                let beep = self.settings.lock().await.beep;
                debug!("Tag {} (count {}, rssi {:?})", record.epc, record.count, record.rssi);
                SessionEvent::Tag { record, beep }
            }
            InboundEvent::ReadResult { status, data } => {
                info!("Read result: {:?}", status);
                SessionEvent::ReadResult { status, data }
            }
            InboundEvent::WriteResult { status } => {
                info!("Write result: {:?}", status);
                SessionEvent::WriteResult { status }
            }
            InboundEvent::PowerReport { dbm } => {
                info!("Current power: {} dBm", dbm);
                SessionEvent::Power { dbm }
            }
            InboundEvent::FrequencyReport { mode } => {
                info!("Frequency mode: {}", mode);
                SessionEvent::Frequency {
                    mode,
                    region: FrequencyRegion::from_code(mode),
                }
            }
            InboundEvent::InventoryStopped => {
                info!("Inventory stopped");
                SessionEvent::InventoryStopped
            }
            InboundEvent::Unrecognized { raw } => {
                debug!("Unrecognized frame: {}", format_frame(&raw));
                SessionEvent::Unrecognized { raw }
            }
        };
        self.emit(event);
    }
}

/// Drives one reader at a time.
pub struct ReaderSession {
    transport: Arc<dyn BleTransport>,
    shared: Arc<Shared>,
    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
    last_device: Mutex<Option<DeviceHandle>>,
}

impl ReaderSession {
    pub fn new(transport: Arc<dyn BleTransport>, settings: ReaderSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            shared: Arc::new(Shared {
                link: Mutex::new(None),
                tags: Mutex::new(TagAggregator::new()),
                settings: Mutex::new(settings),
                events,
                state,
                scanning: AtomicBool::new(false),
                ticker: std::sync::Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            pump: std::sync::Mutex::new(None),
            last_device: Mutex::new(None),
        }
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        self.shared.scanning.load(Ordering::SeqCst)
    }

    pub async fn last_device(&self) -> Option<DeviceHandle> {
        self.last_device.lock().await.clone()
    }

    pub async fn settings(&self) -> ReaderSettings {
        self.shared.settings.lock().await.clone()
    }

    pub async fn apply_settings(&self, settings: ReaderSettings) {
        *self.shared.settings.lock().await = settings;
    }

    // ---- connection ----

    /// Scan, let the operator pick a device, and negotiate a link to it.
    ///
    /// Discovery and environment failures come back classified and are not
    /// retried. An exhausted negotiation returns every strategy's failure.
    pub async fn connect(&self, negotiator: &ConnectionNegotiator) -> Result<()> {
        if self.state() != ConnectionState::Disconnected {
            self.disconnect().await?;
        }
        self.shared.state.send_replace(ConnectionState::Connecting);

        let device = match self.transport.scan_and_pick().await {
            Ok(device) => device,
            Err(e) => {
                let err = AppError::scan(e);
                error!("Device selection failed: {}", err);
                self.shared.state.send_replace(ConnectionState::Disconnected);
                return Err(err);
            }
        };
        info!("Selected {} ({})", device.display_name(), device.id);
        *self.last_device.lock().await = Some(device.clone());

        self.negotiate(negotiator, &device).await
    }

    /// A fresh negotiation pass against the last picked device.
    pub async fn retry(&self, negotiator: &ConnectionNegotiator) -> Result<()> {
        let device = self
            .last_device()
            .await
            .ok_or_else(|| AppError::validation("No device to retry; scan first"))?;

        if self.state() != ConnectionState::Disconnected {
            self.disconnect().await?;
        }
        self.shared.state.send_replace(ConnectionState::Connecting);
        self.negotiate(negotiator, &device).await
    }

    /// Run one strategy against the last picked device ("Quick Connect",
    /// "Try Auto-Discover" after a failed pass).
    pub async fn run_strategy(&self, negotiator: &ConnectionNegotiator, strategy: StrategyKind) -> Result<()> {
        let device = self
            .last_device()
            .await
            .ok_or_else(|| AppError::validation("No device to connect to; scan first"))?;

        if self.state() != ConnectionState::Disconnected {
            self.disconnect().await?;
        }
        self.shared.state.send_replace(ConnectionState::Connecting);

        match negotiator.run_strategy(&device, strategy).await {
            Ok(link) => {
                self.attach(link).await;
                Ok(())
            }
            Err(e) => {
                self.shared.state.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Connect to an operator-chosen (service, characteristic) pair.
    pub async fn connect_manual(
        &self,
        negotiator: &ConnectionNegotiator,
        device: &DeviceHandle,
        service: &str,
        characteristic: &str,
    ) -> Result<()> {
        if self.state() != ConnectionState::Disconnected {
            self.disconnect().await?;
        }
        self.shared.state.send_replace(ConnectionState::Connecting);
        *self.last_device.lock().await = Some(device.clone());

        match negotiator.connect_manual(device, service, characteristic).await {
            Ok(link) => {
                self.attach(link).await;
                Ok(())
            }
            Err(e) => {
                self.shared.state.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn negotiate(&self, negotiator: &ConnectionNegotiator, device: &DeviceHandle) -> Result<()> {
        match negotiator.negotiate(device).await {
            NegotiationOutcome::Success(link) => {
                self.attach(link).await;
                Ok(())
            }
            NegotiationOutcome::Exhausted(failures) => {
                self.shared.state.send_replace(ConnectionState::Disconnected);
                Err(AppError::Exhausted { failures })
            }
        }
    }

    /// Take ownership of a negotiated link and start pumping its notifications.
    pub async fn attach(&self, link: LinkHandle) {
        let candidate = link.candidate();
        let LinkHandle {
            device,
            characteristic,
            strategy,
            mode,
            notifications,
            disconnected,
        } = link;

        // A pump still running for the previous link must see a stale generation
        // before the new link becomes visible.
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.link.lock().await = Some(ActiveLink {
            device: device.clone(),
            characteristic,
            mode,
        });

        let pump = tokio::spawn(pump(Arc::clone(&self.shared), generation, notifications, disconnected));
        let previous = match self.pump.lock() {
            Ok(mut guard) => guard.replace(pump),
            Err(poisoned) => poisoned.into_inner().replace(pump),
        };
        if let Some(previous) = previous {
            previous.abort();
        }

        self.shared.state.send_replace(ConnectionState::Connected);
        info!("Connected to {} via {} ({})", device.display_name(), strategy, mode);
        self.shared.emit(SessionEvent::Connected {
            device,
            strategy,
            candidate,
        });
    }

    /// Stop inventory, tear down the subscription and drop the link.
    ///
    /// The tag table is left as it is. Disconnecting while disconnected is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.scanning.store(false, Ordering::SeqCst);
        self.shared.stop_ticker();

        let Some(link) = self.shared.link.lock().await.take() else {
            self.shared.mark_disconnected();
            return Ok(());
        };
        self.shared.mark_disconnected();

        if matches!(link.mode, LinkMode::Notify | LinkMode::Indicate) {
            if let Err(e) = self.transport.unsubscribe(&link.characteristic).await {
                warn!("Failed to stop notifications: {}", e);
            }
        }
        let result = self.transport.disconnect(&link.device).await;

        let pump = match self.pump.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(pump) = pump {
            pump.abort();
        }

        info!("Disconnected from {}", link.device.display_name());
        result.map_err(AppError::from)
    }

    // ---- commands ----

    /// Encode `command` and write it to the reader.
    pub async fn send_command(&self, command: &Command) -> Result<()> {
        let frame = encode(command)?;
        let characteristic = self.require_link().await?.characteristic;

        debug!("TX {} [{}]", command.name(), format_frame(&frame));
        self.transport.write(&characteristic, &frame).await.map_err(|e| {
            error!("Failed to send {}: {}", command.name(), e);
            AppError::from(e)
        })
    }

    pub async fn inventory_single(&self) -> Result<()> {
        self.require_link().await?;
        self.shared.tags.lock().await.mark_started();
        self.send_command(&Command::InventorySingle).await
    }

    /// Start continuous inventory. Does nothing if already scanning.
    pub async fn start_inventory(&self) -> Result<()> {
        self.require_link().await?;
        if self.shared.scanning.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.send_command(&Command::StartInventory).await {
            self.shared.scanning.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.shared.tags.lock().await.mark_started();
        self.shared.set_ticker(spawn_ticker(Arc::clone(&self.shared)));
        info!("Inventory started");
        Ok(())
    }

    /// Stop continuous inventory. Does nothing if not scanning.
    pub async fn stop_inventory(&self) -> Result<()> {
        if !self.shared.scanning.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.stop_ticker();

        if self.shared.is_connected() {
            self.send_command(&Command::StopInventory).await?;
        }
        info!("Inventory stopped");
        Ok(())
    }

    pub async fn read_tag(&self, bank: Bank, pointer: u8, length: u8, password: &str) -> Result<()> {
        self.send_command(&Command::ReadTag {
            bank,
            pointer,
            length,
            password: password.to_string(),
        })
        .await
    }

    pub async fn write_tag(&self, bank: Bank, pointer: u8, length: u8, data: &str, password: &str) -> Result<()> {
        self.send_command(&Command::WriteTag {
            bank,
            pointer,
            length,
            data: data.to_string(),
            password: password.to_string(),
        })
        .await
    }

    pub async fn set_filter(&self, bank: Bank, pointer: u8, length: u8, mask: &str) -> Result<()> {
        self.send_command(&Command::SetFilter {
            bank,
            pointer,
            length,
            mask: mask.to_string(),
        })
        .await
    }

    /// Remove any inventory filter on `bank`.
    pub async fn clear_filter(&self, bank: Bank) -> Result<()> {
        self.set_filter(bank, 0, 0, "00").await
    }

    pub async fn get_power(&self) -> Result<()> {
        self.send_command(&Command::GetPower).await
    }

    /// Set transmit power and remember it as the preferred level.
    pub async fn set_power(&self, dbm: u8) -> Result<()> {
        if dbm > MAX_POWER_DBM {
            return Err(AppError::validation(format!(
                "Power must be between 0 and {MAX_POWER_DBM} dBm, got {dbm}"
            )));
        }
        self.send_command(&Command::SetPower(dbm)).await?;
        self.shared.settings.lock().await.power = dbm;
        Ok(())
    }

    pub async fn get_frequency(&self) -> Result<()> {
        self.send_command(&Command::GetFrequency).await
    }

    /// Set the frequency region and remember it as the preferred one.
    pub async fn set_frequency(&self, region: FrequencyRegion) -> Result<()> {
        self.send_command(&Command::SetFrequency(region.code())).await?;
        self.shared.settings.lock().await.frequency = region;
        Ok(())
    }

    // ---- tag table ----

    pub async fn tags(&self) -> Vec<TagRecord> {
        self.shared.tags.lock().await.records().to_vec()
    }

    pub async fn unique_count(&self) -> usize {
        self.shared.tags.lock().await.unique_count()
    }

    pub async fn total_count(&self) -> u64 {
        self.shared.tags.lock().await.total_count()
    }

    /// Empty the tag table and its elapsed-time clock.
    pub async fn clear_tags(&self) {
        self.shared.tags.lock().await.reset();
    }

    async fn require_link(&self) -> Result<ActiveLink> {
        if !self.shared.is_connected() {
            return Err(AppError::NotConnected);
        }
        self.shared.link.lock().await.clone().ok_or(AppError::NotConnected)
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        self.shared.stop_ticker();
        if let Ok(mut guard) = self.pump.lock() {
            if let Some(pump) = guard.take() {
                pump.abort();
            }
        }
    }
}

/// Process notifications one at a time until the device disconnects.
async fn pump(
    shared: Arc<Shared>,
    generation: u64,
    mut notifications: mpsc::UnboundedReceiver<Vec<u8>>,
    mut disconnected: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            payload = notifications.recv() => match payload {
                Some(bytes) => shared.dispatch(&bytes).await,
                None => {
                    // No reply path left; wait for the link to go.
                    let _ = (&mut disconnected).await;
                    break;
                }
            },
            _ = &mut disconnected => break,
        }
    }
    shared.link_lost(generation).await;
}

fn spawn_ticker(shared: Arc<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if !shared.is_connected() || !shared.scanning.load(Ordering::SeqCst) {
                break;
            }
            if let Some(elapsed) = shared.tags.lock().await.elapsed() {
                shared.emit(SessionEvent::Elapsed(elapsed));
            }
        }
    })
}
