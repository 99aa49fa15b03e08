use std::{
  collections::{BTreeSet, HashMap},
  sync::Arc,
};

use btleplug::{
  api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service},
  platform::{Adapter, Manager as BtleManager, Peripheral},
};
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::{
  models::{
    AttributeDescriptor, AttributeHandle, PeripheralId, PeripheralInfo, ServiceDescriptor,
    ServiceEvent, ServiceHandle,
  },
  transport::{DiscoveryTransport, TransportFuture},
  Error, Result,
};

/// [`DiscoveryTransport`] backed by the first btleplug adapter.
#[derive(Clone)]
pub struct BtleplugTransport {
  inner: Arc<NativeState>,
}

struct NativeState {
  adapter: Adapter,
  peripherals: RwLock<HashMap<PeripheralId, Peripheral>>,
}

impl BtleplugTransport {
  pub async fn connect() -> Result<Self> {
    let manager = BtleManager::new().await?;
    let mut adapters = manager.adapters().await?;
    if adapters.is_empty() {
      return Err(Error::NoAdapter);
    }
    let adapter = adapters.remove(0);
    adapter.start_scan(ScanFilter::default()).await?;
    log::info!("Bluetooth adapter ready, scanning started");
    Ok(Self::from_adapter(adapter))
  }

  pub fn from_adapter(adapter: Adapter) -> Self {
    Self {
      inner: Arc::new(NativeState {
        adapter,
        peripherals: RwLock::new(HashMap::new()),
      }),
    }
  }

  /// Turns adapter events into service events by diffing each peripheral's
  /// services against what was last seen for it.
  pub async fn watch_services(&self) -> Result<mpsc::UnboundedReceiver<ServiceEvent>> {
    let mut events = self.inner.adapter.events().await?;
    let (tx, rx) = mpsc::unbounded_channel();
    let state = self.inner.clone();
    tokio::spawn(async move {
      let mut known: HashMap<PeripheralId, Vec<ServiceSnapshot>> = HashMap::new();
      while let Some(event) = events.next().await {
        let (id, refresh) = match event {
          CentralEvent::DeviceConnected(id) => (id, Refresh::Discover),
          CentralEvent::DeviceUpdated(id) | CentralEvent::ServicesAdvertisement { id, .. } => (id, Refresh::Cached),
          CentralEvent::DeviceDisconnected(id) => (id, Refresh::Gone),
          _ => continue,
        };
        let peripheral = match state.adapter.peripheral(&id).await {
          Ok(peripheral) => peripheral,
          Err(err) => {
            log::warn!("Failed to look up peripheral for adapter event | err={err}");
            continue;
          }
        };
        let key = peripheral_key(&peripheral);
        state.remember(&key, &peripheral).await;

        let current = match refresh {
          Refresh::Gone => Vec::new(),
          Refresh::Discover => {
            if let Err(err) = peripheral.discover_services().await {
              log::warn!("Service discovery failed | device_id={key} | err={err}");
            }
            snapshot_services(&key, &peripheral.services())
          }
          Refresh::Cached => snapshot_services(&key, &peripheral.services()),
        };
        let previous = known.insert(key, current.clone()).unwrap_or_default();
        for event in diff_services(&previous, &current) {
          if tx.send(event).is_err() {
            log::info!("Service event receiver dropped, stopping adapter listener");
            return;
          }
        }
      }
      log::warn!("Bluetooth adapter event stream ended");
    });
    Ok(rx)
  }
}

enum Refresh {
  Discover,
  Cached,
  Gone,
}

impl NativeState {
  async fn remember(&self, key: &PeripheralId, peripheral: &Peripheral) {
    let mut cache = self.peripherals.write().await;
    if !cache.contains_key(key) {
      cache.insert(key.clone(), peripheral.clone());
    }
  }

  async fn get_or_try_load_peripheral(&self, id: &PeripheralId) -> Result<Peripheral> {
    if let Some(peripheral) = self.peripherals.read().await.get(id) {
      return Ok(peripheral.clone());
    }
    for peripheral in self.adapter.peripherals().await? {
      if peripheral_key(&peripheral) == *id {
        self.remember(id, &peripheral).await;
        return Ok(peripheral);
      }
    }
    Err(Error::DeviceNotFound(id.to_string()))
  }

  async fn describe(&self, peripheral: &Peripheral) -> Result<PeripheralInfo> {
    let properties = peripheral.properties().await?;
    Ok(PeripheralInfo {
      id: peripheral_key(peripheral),
      name: properties.and_then(|properties| properties.local_name),
    })
  }

  async fn services(&self, peripheral: &Peripheral) -> Result<BTreeSet<Service>> {
    if peripheral.is_connected().await.unwrap_or(false) {
      peripheral.discover_services().await?;
    }
    Ok(peripheral.services())
  }

  async fn resolve_service(&self, key: &ServiceKey) -> Result<(Peripheral, Service)> {
    let peripheral = self.get_or_try_load_peripheral(&key.peripheral).await?;
    let mut services = peripheral.services();
    if services.is_empty() {
      services = self.services(&peripheral).await?;
    }
    let service = services
      .into_iter()
      .filter(|service| service.uuid == key.uuid)
      .nth(key.occurrence)
      .ok_or_else(|| Error::ServiceNotFound {
        device_id: key.peripheral.to_string(),
        service_uuid: key.uuid.to_string(),
      })?;
    Ok((peripheral, service))
  }

  async fn resolve_characteristic(&self, key: &AttributeKey) -> Result<(Peripheral, Characteristic)> {
    let (peripheral, service) = self.resolve_service(&key.service).await?;
    let characteristic = service
      .characteristics
      .into_iter()
      .filter(|characteristic| characteristic.uuid == key.uuid)
      .nth(key.occurrence)
      .ok_or_else(|| Error::CharacteristicNotFound {
        device_id: key.service.peripheral.to_string(),
        characteristic_uuid: key.uuid.to_string(),
      })?;
    Ok((peripheral, characteristic))
  }
}

impl DiscoveryTransport for BtleplugTransport {
  fn list_peripherals(&self) -> TransportFuture<Vec<PeripheralInfo>> {
    let state = self.inner.clone();
    async move {
      let peripherals = state.adapter.peripherals().await?;
      let mut devices = Vec::with_capacity(peripherals.len());
      for peripheral in peripherals {
        let name = peripheral
          .properties()
          .await
          .map(|properties| properties.and_then(|properties| properties.local_name))
          .map_err(Error::from);
        let info = listed_peripheral(peripheral_key(&peripheral), name);
        state.remember(&info.id, &peripheral).await;
        devices.push(info);
      }
      Ok(devices)
    }
    .boxed()
  }

  fn peripheral(&self, id: &PeripheralId) -> TransportFuture<PeripheralInfo> {
    let state = self.inner.clone();
    let id = id.clone();
    async move {
      let peripheral = state.get_or_try_load_peripheral(&id).await?;
      state.describe(&peripheral).await
    }
    .boxed()
  }

  fn list_services(&self, id: &PeripheralId) -> TransportFuture<Vec<ServiceDescriptor>> {
    let state = self.inner.clone();
    let id = id.clone();
    async move {
      let peripheral = state.get_or_try_load_peripheral(&id).await?;
      let services = state.services(&peripheral).await?;
      Ok(
        snapshot_services(&id, &services)
          .into_iter()
          .map(|snapshot| snapshot.descriptor)
          .collect(),
      )
    }
    .boxed()
  }

  fn list_attributes(&self, service: &ServiceDescriptor) -> TransportFuture<Vec<AttributeDescriptor>> {
    let state = self.inner.clone();
    let handle = service.handle.clone();
    async move {
      let key = ServiceKey::parse(&handle)?;
      let (_, service) = state.resolve_service(&key).await?;
      let uuids = service.characteristics.iter().map(|characteristic| characteristic.uuid);
      Ok(
        occurrences(uuids)
          .into_iter()
          .map(|(uuid, occurrence)| AttributeDescriptor {
            handle: AttributeKey {
              service: key.clone(),
              uuid,
              occurrence,
            }
            .handle(),
            uuid,
          })
          .collect(),
      )
    }
    .boxed()
  }

  fn read_attribute(&self, attribute: &AttributeHandle) -> TransportFuture<Vec<u8>> {
    let state = self.inner.clone();
    let handle = attribute.clone();
    async move {
      let key = AttributeKey::parse(&handle)?;
      let (peripheral, characteristic) = state.resolve_characteristic(&key).await?;
      Ok(peripheral.read(&characteristic).await?)
    }
    .boxed()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceSnapshot {
  descriptor: ServiceDescriptor,
  characteristics: Vec<Uuid>,
}

/// `address/service-uuid/occurrence`
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServiceKey {
  peripheral: PeripheralId,
  uuid: Uuid,
  occurrence: usize,
}

impl ServiceKey {
  fn handle(&self) -> ServiceHandle {
    ServiceHandle::new(format!("{}/{}/{}", self.peripheral, self.uuid, self.occurrence))
  }

  fn parse(handle: &ServiceHandle) -> Result<Self> {
    let invalid = || Error::InvalidHandle(handle.to_string());
    let mut parts = handle.as_str().splitn(3, '/');
    let (Some(peripheral), Some(uuid), Some(occurrence)) = (parts.next(), parts.next(), parts.next()) else {
      return Err(invalid());
    };
    Ok(Self {
      peripheral: PeripheralId::new(peripheral),
      uuid: Uuid::parse_str(uuid).map_err(|_| invalid())?,
      occurrence: occurrence.parse().map_err(|_| invalid())?,
    })
  }
}

/// Service handle followed by `/characteristic-uuid/occurrence`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeKey {
  service: ServiceKey,
  uuid: Uuid,
  occurrence: usize,
}

impl AttributeKey {
  fn handle(&self) -> AttributeHandle {
    AttributeHandle::new(format!("{}/{}/{}", self.service.handle(), self.uuid, self.occurrence))
  }

  fn parse(handle: &AttributeHandle) -> Result<Self> {
    let invalid = || Error::InvalidHandle(handle.to_string());
    let mut parts = handle.as_str().rsplitn(3, '/');
    let (Some(occurrence), Some(uuid), Some(service)) = (parts.next(), parts.next(), parts.next()) else {
      return Err(invalid());
    };
    Ok(Self {
      service: ServiceKey::parse(&ServiceHandle::new(service)).map_err(|_| invalid())?,
      uuid: Uuid::parse_str(uuid).map_err(|_| invalid())?,
      occurrence: occurrence.parse().map_err(|_| invalid())?,
    })
  }
}

/// Numbers repeated UUIDs in iteration order.
fn occurrences(uuids: impl IntoIterator<Item = Uuid>) -> Vec<(Uuid, usize)> {
  let mut seen: HashMap<Uuid, usize> = HashMap::new();
  uuids
    .into_iter()
    .map(|uuid| {
      let count = seen.entry(uuid).or_insert(0);
      let occurrence = *count;
      *count += 1;
      (uuid, occurrence)
    })
    .collect()
}

fn snapshot_services(peripheral: &PeripheralId, services: &BTreeSet<Service>) -> Vec<ServiceSnapshot> {
  occurrences(services.iter().map(|service| service.uuid))
    .into_iter()
    .zip(services)
    .map(|((uuid, occurrence), service)| ServiceSnapshot {
      descriptor: ServiceDescriptor {
        handle: ServiceKey {
          peripheral: peripheral.clone(),
          uuid,
          occurrence,
        }
        .handle(),
        peripheral: peripheral.clone(),
        uuid,
      },
      characteristics: service.characteristics.iter().map(|characteristic| characteristic.uuid).collect(),
    })
    .collect()
}

fn diff_services(previous: &[ServiceSnapshot], current: &[ServiceSnapshot]) -> Vec<ServiceEvent> {
  let mut events = Vec::new();
  for old in previous {
    match current.iter().find(|new| new.descriptor.handle == old.descriptor.handle) {
      None => events.push(ServiceEvent::Removed(old.descriptor.clone())),
      Some(new) if new.characteristics != old.characteristics => {
        events.push(ServiceEvent::Changed(new.descriptor.clone()))
      }
      Some(_) => {}
    }
  }
  for new in current {
    if !previous.iter().any(|old| old.descriptor.handle == new.descriptor.handle) {
      events.push(ServiceEvent::Added(new.descriptor.clone()));
    }
  }
  events
}

/// A peripheral whose properties cannot be read is still listed, unnamed.
fn listed_peripheral(id: PeripheralId, name: Result<Option<String>>) -> PeripheralInfo {
  let name = name.unwrap_or_else(|err| {
    log::warn!("Failed to read peripheral properties, listing unnamed | device_id={id} | err={err}");
    None
  });
  PeripheralInfo { id, name }
}

fn peripheral_key(peripheral: &Peripheral) -> PeripheralId {
  PeripheralId::new(peripheral.address().to_string())
}
