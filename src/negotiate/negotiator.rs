//! Ordered strategy search for the reader's data characteristic.

use super::store::LinkStore;
use super::strategy::{QUICK_CONNECT_COMBOS, StrategyKind, UUID_VARIATIONS};
use super::types::{LinkHandle, LinkMode, NegotiationOutcome, NegotiationState, StrategyFailure};
use crate::ble::uuid::{DEFAULT_CHAR, DEFAULT_SERVICE, normalize, same_uuid};
use crate::ble::{
    BleTransport, CharacteristicHandle, DeviceHandle, ErrorKind, GattServer, NotificationSink, ServiceHandle,
    TransportError,
};
use crate::config::ConnectionConfig;
use crate::error::{AppError, Result};
use crate::models::DeviceEntry;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// A characteristic a strategy settled on, already subscribed if it can be.
struct Found {
    characteristic: CharacteristicHandle,
    mode: LinkMode,
}

type Attempt = std::result::Result<Found, StrategyFailure>;

/// Finds a working (service, characteristic) pair on a picked device.
///
/// Strategies run strictly one after another in [`StrategyKind::ORDER`];
/// the first success wins and is persisted through the [`LinkStore`].
pub struct ConnectionNegotiator {
    transport: Arc<dyn BleTransport>,
    store: Arc<dyn LinkStore>,
    state: watch::Sender<NegotiationState>,
    pass: Mutex<()>,
}

impl ConnectionNegotiator {
    pub fn new(transport: Arc<dyn BleTransport>, store: Arc<dyn LinkStore>) -> Self {
        let (state, _) = watch::channel(NegotiationState::Idle);
        Self {
            transport,
            store,
            state,
            pass: Mutex::new(()),
        }
    }

    pub fn transport(&self) -> Arc<dyn BleTransport> {
        Arc::clone(&self.transport)
    }

    pub fn state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    /// Follow state transitions (for progress display).
    pub fn watch_state(&self) -> watch::Receiver<NegotiationState> {
        self.state.subscribe()
    }

    /// Run one full pass against `device`.
    ///
    /// Transport failures never escape: each one is classified and recorded
    /// against the strategy that hit it. A terminal failure (discovery or
    /// environment) ends the pass without trying the remaining strategies.
    pub async fn negotiate(&self, device: &DeviceHandle) -> NegotiationOutcome {
        let _pass = self.pass.lock().await;

        let saved = self.store.load();
        let (sink, notifications) = mpsc::unbounded_channel();
        let mut failures = Vec::new();

        info!("Negotiating link with {} ({})", device.display_name(), device.id);

        for (index, strategy) in StrategyKind::ORDER.into_iter().enumerate() {
            self.state.send_replace(NegotiationState::TryingStrategy(index));
            info!("Trying: {}...", strategy);

            match self.attempt(strategy, device, &saved, &sink).await {
                Ok(found) => {
                    info!(
                        "Success with {}: {}/{} ({})",
                        strategy, found.characteristic.service_uuid, found.characteristic.uuid, found.mode
                    );
                    let link = self.establish(device, found, strategy, notifications);
                    self.state.send_replace(NegotiationState::Connected(strategy));
                    return NegotiationOutcome::Success(link);
                }
                Err(failure) => {
                    warn!("{} failed: {}", strategy, failure.message);
                    let terminal = failure.kind.is_terminal();
                    failures.push(failure);
                    if terminal {
                        warn!("Terminal failure, abandoning negotiation pass");
                        break;
                    }
                }
            }
        }

        self.state.send_replace(NegotiationState::Exhausted);
        warn!("All connection strategies failed for {}", device.display_name());
        NegotiationOutcome::Exhausted(failures)
    }

    /// Run a single strategy on its own, e.g. "Quick Connect" after a failed pass.
    ///
    /// The failure comes back classified, the same way a transport error would.
    pub async fn run_strategy(&self, device: &DeviceHandle, strategy: StrategyKind) -> Result<LinkHandle> {
        let Some(index) = StrategyKind::ORDER.iter().position(|s| *s == strategy) else {
            return Err(AppError::validation(format!("{strategy} needs an explicit service and characteristic")));
        };

        let _pass = self.pass.lock().await;
        let saved = self.store.load();
        let (sink, notifications) = mpsc::unbounded_channel();

        self.state.send_replace(NegotiationState::TryingStrategy(index));
        info!("Trying: {} on {}...", strategy, device.display_name());

        match self.attempt(strategy, device, &saved, &sink).await {
            Ok(found) => {
                info!(
                    "Success with {}: {}/{} ({})",
                    strategy, found.characteristic.service_uuid, found.characteristic.uuid, found.mode
                );
                let link = self.establish(device, found, strategy, notifications);
                self.state.send_replace(NegotiationState::Connected(strategy));
                Ok(link)
            }
            Err(failure) => {
                warn!("{} failed: {}", strategy, failure.message);
                self.state.send_replace(NegotiationState::Exhausted);
                Err(AppError::Transport {
                    kind: failure.kind,
                    message: failure.message,
                })
            }
        }
    }

    /// Connect to an operator-chosen pair, bypassing the strategy search.
    pub async fn connect_manual(&self, device: &DeviceHandle, service: &str, characteristic: &str) -> Result<LinkHandle> {
        if service.trim().is_empty() || characteristic.trim().is_empty() {
            return Err(AppError::validation("Service and characteristic UUIDs are required"));
        }

        let _pass = self.pass.lock().await;
        let service = normalize(service.trim());
        let characteristic = normalize(characteristic.trim());
        info!("Manual connection: {}/{}", service, characteristic);

        let server = self.transport.connect(device).await?;
        let target = self.find_characteristic(&server, &service, &characteristic).await?;
        let (sink, notifications) = mpsc::unbounded_channel();
        let mode = self.attach(&target, &sink).await?;

        let link = self.establish(
            device,
            Found {
                characteristic: target,
                mode,
            },
            StrategyKind::Manual,
            notifications,
        );
        self.state.send_replace(NegotiationState::Connected(StrategyKind::Manual));
        Ok(link)
    }

    async fn attempt(
        &self,
        strategy: StrategyKind,
        device: &DeviceHandle,
        saved: &ConnectionConfig,
        sink: &NotificationSink,
    ) -> Attempt {
        match strategy {
            StrategyKind::DefaultUuids => self.try_pair(strategy, device, DEFAULT_SERVICE, DEFAULT_CHAR, sink).await,
            StrategyKind::SavedUuids => match saved.saved_pair() {
                Some((service, characteristic)) => {
                    let (service, characteristic) = (normalize(service), normalize(characteristic));
                    self.try_pair(strategy, device, &service, &characteristic, sink).await
                }
                None => Err(StrategyFailure::new(strategy, ErrorKind::Unknown, "No saved UUIDs")),
            },
            StrategyKind::UuidVariations => self.try_variations(device, sink).await,
            StrategyKind::QuickConnect => self.try_quick_connect(device, sink).await,
            StrategyKind::AutoDiscover => self.try_auto_discover(device, sink).await,
            StrategyKind::BruteForce => self.try_brute_force(device, sink).await,
            StrategyKind::Manual => Err(StrategyFailure::new(
                strategy,
                ErrorKind::Unknown,
                "Manual selection needs an explicit pair",
            )),
        }
    }

    async fn connect(&self, strategy: StrategyKind, device: &DeviceHandle) -> std::result::Result<GattServer, StrategyFailure> {
        self.transport
            .connect(device)
            .await
            .map_err(|e| StrategyFailure::from_transport(strategy, &e))
    }

    /// One fixed pair; subscription failure fails the strategy.
    async fn try_pair(
        &self,
        strategy: StrategyKind,
        device: &DeviceHandle,
        service: &str,
        characteristic: &str,
        sink: &NotificationSink,
    ) -> Attempt {
        let fail = |e: TransportError| StrategyFailure::from_transport(strategy, &e);

        let server = self.connect(strategy, device).await?;
        let target = self
            .find_characteristic(&server, service, characteristic)
            .await
            .map_err(fail)?;
        let mode = self.attach(&target, sink).await.map_err(fail)?;
        Ok(Found {
            characteristic: target,
            mode,
        })
    }

    async fn try_variations(&self, device: &DeviceHandle, sink: &NotificationSink) -> Attempt {
        let strategy = StrategyKind::UuidVariations;
        let server = self.connect(strategy, device).await?;
        let mut last_err = None;

        for (service, characteristic) in UUID_VARIATIONS {
            let (service, characteristic) = (normalize(service), normalize(characteristic));
            debug!("Trying UUID variation: Service={}, Char={}", service, characteristic);

            let result = match self.find_characteristic(&server, &service, &characteristic).await {
                Ok(target) => self.attach(&target, sink).await.map(|mode| Found {
                    characteristic: target,
                    mode,
                }),
                Err(e) => Err(e),
            };

            match result {
                Ok(found) => return Ok(found),
                Err(e) if e.classify().is_terminal() => return Err(StrategyFailure::from_transport(strategy, &e)),
                Err(e) => last_err = Some(e),
            }
        }

        Err(exhausted(strategy, last_err, "All UUID variations failed"))
    }

    /// Curated pairs, checked against the services the device actually has.
    async fn try_quick_connect(&self, device: &DeviceHandle, sink: &NotificationSink) -> Attempt {
        let strategy = StrategyKind::QuickConnect;
        let fail = |e: TransportError| StrategyFailure::from_transport(strategy, &e);

        let server = self.connect(strategy, device).await?;
        let services = self.transport.list_services(&server).await.map_err(fail)?;
        let mut last_err = None;

        for combo in QUICK_CONNECT_COMBOS {
            let Some(service) = services.iter().find(|s| same_uuid(&s.uuid, combo.service)) else {
                debug!("Service {} not found, skipping {}", combo.service, combo.label);
                continue;
            };

            let target = match self.transport.list_characteristics(service).await {
                Ok(chars) => chars.into_iter().find(|c| same_uuid(&c.uuid, combo.characteristic)),
                Err(e) if e.classify().is_terminal() => return Err(fail(e)),
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            let Some(target) = target else {
                debug!("Characteristic {} not found, trying next", combo.characteristic);
                continue;
            };

            // A link without notifications still accepts commands.
            let mode = match self.attach(&target, sink).await {
                Ok(mode) => mode,
                Err(e) => {
                    warn!("Could not enable notifications on {}: {}", target.uuid, e);
                    LinkMode::WriteOnly
                }
            };
            info!("Quick Connect matched {}", combo.label);
            return Ok(Found {
                characteristic: target,
                mode,
            });
        }

        Err(exhausted(strategy, last_err, "No common UUID combination matched"))
    }

    /// First characteristic that can notify/indicate, else the first writable one.
    async fn try_auto_discover(&self, device: &DeviceHandle, sink: &NotificationSink) -> Attempt {
        let strategy = StrategyKind::AutoDiscover;
        let server = self.connect(strategy, device).await?;
        let (chars, mut last_err) = self.enumerate(strategy, &server).await?;

        for target in chars.iter().filter(|c| c.capabilities.can_subscribe()) {
            match self.attach(target, sink).await {
                Ok(mode) => {
                    return Ok(Found {
                        characteristic: target.clone(),
                        mode,
                    });
                }
                Err(e) if e.classify().is_terminal() => return Err(StrategyFailure::from_transport(strategy, &e)),
                Err(e) => {
                    warn!("Could not enable notifications on {}: {}", target.uuid, e);
                    last_err = Some(e);
                }
            }
        }

        if let Some(target) = chars.iter().find(|c| c.capabilities.can_write()) {
            return Ok(Found {
                characteristic: target.clone(),
                mode: LinkMode::WriteOnly,
            });
        }

        Err(exhausted(strategy, last_err, "No suitable service/characteristic found"))
    }

    /// Every characteristic, every access method: notify, indicate, read, write.
    async fn try_brute_force(&self, device: &DeviceHandle, sink: &NotificationSink) -> Attempt {
        let strategy = StrategyKind::BruteForce;
        let server = self.connect(strategy, device).await?;
        let (chars, mut last_err) = self.enumerate(strategy, &server).await?;

        for target in &chars {
            let caps = target.capabilities;
            let found = |mode| Found {
                characteristic: target.clone(),
                mode,
            };

            if caps.notify || caps.indicate {
                match self.transport.subscribe(target, sink.clone()).await {
                    Ok(()) => {
                        return Ok(found(if caps.notify { LinkMode::Notify } else { LinkMode::Indicate }));
                    }
                    Err(e) if e.classify().is_terminal() => {
                        return Err(StrategyFailure::from_transport(strategy, &e));
                    }
                    Err(e) => last_err = Some(e),
                }
            }

            if caps.read {
                match self.transport.read(target).await {
                    Ok(_) => return Ok(found(LinkMode::Read)),
                    Err(e) if e.classify().is_terminal() => {
                        return Err(StrategyFailure::from_transport(strategy, &e));
                    }
                    Err(e) => last_err = Some(e),
                }
            }

            if caps.can_write() {
                return Ok(found(LinkMode::WriteOnly));
            }
        }

        Err(exhausted(strategy, last_err, "No suitable combination found"))
    }

    /// All characteristics of all services; unreadable services are skipped.
    async fn enumerate(
        &self,
        strategy: StrategyKind,
        server: &GattServer,
    ) -> std::result::Result<(Vec<CharacteristicHandle>, Option<TransportError>), StrategyFailure> {
        let services = self
            .transport
            .list_services(server)
            .await
            .map_err(|e| StrategyFailure::from_transport(strategy, &e))?;
        debug!("{}: found {} services", strategy, services.len());

        let mut chars = Vec::new();
        let mut last_err = None;
        for service in &services {
            match self.transport.list_characteristics(service).await {
                Ok(found) => {
                    debug!("Service {}: {} characteristics", service.uuid, found.len());
                    chars.extend(found);
                }
                Err(e) if e.classify().is_terminal() => return Err(StrategyFailure::from_transport(strategy, &e)),
                Err(e) => {
                    warn!("Error accessing service {}: {}", service.uuid, e);
                    last_err = Some(e);
                }
            }
        }
        Ok((chars, last_err))
    }

    async fn find_characteristic(
        &self,
        server: &GattServer,
        service_uuid: &str,
        char_uuid: &str,
    ) -> std::result::Result<CharacteristicHandle, TransportError> {
        let services = self.transport.list_services(server).await?;
        let service: ServiceHandle = services
            .into_iter()
            .find(|s| same_uuid(&s.uuid, service_uuid))
            .ok_or_else(|| TransportError::not_found(format!("Service {service_uuid} not found")))?;

        self.transport
            .list_characteristics(&service)
            .await?
            .into_iter()
            .find(|c| same_uuid(&c.uuid, char_uuid))
            .ok_or_else(|| TransportError::not_found(format!("Characteristic {char_uuid} not found")))
    }

    /// Subscribe when the characteristic can stream replies.
    async fn attach(
        &self,
        target: &CharacteristicHandle,
        sink: &NotificationSink,
    ) -> std::result::Result<LinkMode, TransportError> {
        let caps = target.capabilities;
        if !caps.can_subscribe() {
            return Ok(LinkMode::WriteOnly);
        }

        self.transport.subscribe(target, sink.clone()).await?;
        debug!("Enabled notifications on {}", target.uuid);
        Ok(if caps.notify { LinkMode::Notify } else { LinkMode::Indicate })
    }

    /// Persist the pair and the device, watch for disconnects and hand out the link.
    fn establish(
        &self,
        device: &DeviceHandle,
        found: Found,
        strategy: StrategyKind,
        notifications: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> LinkHandle {
        let mut connection = self.store.load();
        connection.remember(
            normalize(&found.characteristic.service_uuid),
            normalize(&found.characteristic.uuid),
        );
        if let Err(e) = self.store.save(&connection) {
            warn!("Failed to save connection UUIDs: {}", e);
        }
        if let Err(e) = self.store.record_device(DeviceEntry::from_handle(device, Utc::now())) {
            warn!("Failed to update device history: {}", e);
        }

        let (observer, disconnected) = oneshot::channel();
        self.transport.on_disconnect(device, observer);

        LinkHandle {
            device: device.clone(),
            characteristic: found.characteristic,
            strategy,
            mode: found.mode,
            notifications,
            disconnected,
        }
    }
}

/// Failure for a strategy that ran out of candidates.
fn exhausted(strategy: StrategyKind, last_err: Option<TransportError>, fallback: &str) -> StrategyFailure {
    match last_err {
        Some(e) => StrategyFailure::new(strategy, e.classify(), format!("{fallback}: {e}")),
        None => StrategyFailure::new(strategy, ErrorKind::GattNotFound, fallback),
    }
}
