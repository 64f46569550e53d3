//! Scripted in-memory transport for tests.

use super::transport::{
    BleTransport, Capabilities, CharacteristicHandle, DeviceHandle, GattServer, NotificationSink, ServiceHandle,
    TransportError,
};
use super::uuid::same_uuid;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Capability presets.
pub(crate) fn notify() -> Capabilities {
    Capabilities {
        notify: true,
        ..Default::default()
    }
}

pub(crate) fn write_only() -> Capabilities {
    Capabilities {
        write: true,
        ..Default::default()
    }
}

pub(crate) fn read_only() -> Capabilities {
    Capabilities {
        read: true,
        ..Default::default()
    }
}

pub(crate) fn notify_write() -> Capabilities {
    Capabilities {
        notify: true,
        write: true,
        ..Default::default()
    }
}

#[derive(Default)]
pub(crate) struct MockTransport {
    device: Option<DeviceHandle>,
    services: Vec<(String, Vec<(String, Capabilities)>)>,
    scan_error: Option<TransportError>,
    connect_error: Option<TransportError>,
    failing_subscribe: Vec<String>,
    failing_read: Vec<String>,
    failing_write: Option<TransportError>,
    calls: Mutex<Vec<String>>,
    writes: Mutex<Vec<Vec<u8>>>,
    sinks: Mutex<HashMap<String, NotificationSink>>,
    observers: Mutex<Vec<oneshot::Sender<()>>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            device: Some(DeviceHandle::new("dev-1").with_name("R6 PRO")),
            ..Default::default()
        }
    }

    pub(crate) fn with_service(mut self, uuid: &str, chars: &[(&str, Capabilities)]) -> Self {
        self.services.push((
            uuid.to_string(),
            chars.iter().map(|(c, caps)| ((*c).to_string(), *caps)).collect(),
        ));
        self
    }

    pub(crate) fn with_scan_error(mut self, err: TransportError) -> Self {
        self.scan_error = Some(err);
        self
    }

    pub(crate) fn with_connect_error(mut self, err: TransportError) -> Self {
        self.connect_error = Some(err);
        self
    }

    pub(crate) fn with_failing_subscribe(mut self, char_uuid: &str) -> Self {
        self.failing_subscribe.push(char_uuid.to_string());
        self
    }

    pub(crate) fn with_failing_read(mut self, char_uuid: &str) -> Self {
        self.failing_read.push(char_uuid.to_string());
        self
    }

    pub(crate) fn with_failing_write(mut self, err: TransportError) -> Self {
        self.failing_write = Some(err);
        self
    }

    pub(crate) fn device(&self) -> DeviceHandle {
        self.device.clone().unwrap_or_else(|| DeviceHandle::new("dev-1"))
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Push a notification payload as if the reader had sent it.
    pub(crate) fn notify(&self, bytes: &[u8]) {
        let sinks = self.sinks.lock().unwrap();
        for sink in sinks.values() {
            let _ = sink.send(bytes.to_vec());
        }
    }

    pub(crate) fn has_subscription(&self) -> bool {
        !self.sinks.lock().unwrap().is_empty()
    }

    /// Simulate the device dropping the link.
    pub(crate) fn drop_link(&self) {
        for observer in self.observers.lock().unwrap().drain(..) {
            let _ = observer.send(());
        }
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn scan_and_pick(&self) -> Result<DeviceHandle, TransportError> {
        self.log("scan".to_string());
        match &self.scan_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.device()),
        }
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<GattServer, TransportError> {
        self.log(format!("connect {}", device.id));
        match &self.connect_error {
            Some(err) => Err(err.clone()),
            None => Ok(GattServer {
                device_id: device.id.clone(),
            }),
        }
    }

    async fn list_services(&self, server: &GattServer) -> Result<Vec<ServiceHandle>, TransportError> {
        self.log("list_services".to_string());
        Ok(self
            .services
            .iter()
            .map(|(uuid, _)| ServiceHandle {
                device_id: server.device_id.clone(),
                uuid: uuid.clone(),
            })
            .collect())
    }

    async fn list_characteristics(&self, service: &ServiceHandle) -> Result<Vec<CharacteristicHandle>, TransportError> {
        self.log(format!("list_characteristics {}", service.uuid));
        let (_, chars) = self
            .services
            .iter()
            .find(|(uuid, _)| same_uuid(uuid, &service.uuid))
            .ok_or_else(|| TransportError::not_found("No such service"))?;
        Ok(chars
            .iter()
            .map(|(uuid, caps)| CharacteristicHandle {
                device_id: service.device_id.clone(),
                service_uuid: service.uuid.clone(),
                uuid: uuid.clone(),
                capabilities: *caps,
            })
            .collect())
    }

    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
        sink: NotificationSink,
    ) -> Result<(), TransportError> {
        self.log(format!("subscribe {}", characteristic.uuid));
        if self.failing_subscribe.iter().any(|c| same_uuid(c, &characteristic.uuid)) {
            return Err(TransportError::new("NotSupportedError", "notifications unavailable"));
        }
        self.sinks.lock().unwrap().insert(characteristic.uuid.clone(), sink);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), TransportError> {
        self.log(format!("unsubscribe {}", characteristic.uuid));
        self.sinks.lock().unwrap().remove(&characteristic.uuid);
        Ok(())
    }

    async fn write(&self, characteristic: &CharacteristicHandle, bytes: &[u8]) -> Result<(), TransportError> {
        self.log(format!("write {}", characteristic.uuid));
        if let Some(err) = &self.failing_write {
            return Err(err.clone());
        }
        self.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    async fn read(&self, characteristic: &CharacteristicHandle) -> Result<Vec<u8>, TransportError> {
        self.log(format!("read {}", characteristic.uuid));
        if self.failing_read.iter().any(|c| same_uuid(c, &characteristic.uuid)) {
            return Err(TransportError::new("OperationError", "read rejected"));
        }
        Ok(vec![0x00])
    }

    async fn disconnect(&self, device: &DeviceHandle) -> Result<(), TransportError> {
        self.log(format!("disconnect {}", device.id));
        self.drop_link();
        Ok(())
    }

    fn on_disconnect(&self, device: &DeviceHandle, observer: oneshot::Sender<()>) {
        self.log(format!("on_disconnect {}", device.id));
        self.observers.lock().unwrap().push(observer);
    }
}
