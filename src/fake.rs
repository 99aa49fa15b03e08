//! In-memory transport and recording sink for driving a session in tests.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  sync::{Arc, Mutex},
  time::Duration,
};

use futures::FutureExt;

use crate::{
  config::parse_uuid,
  models::{
    AttributeDescriptor, AttributeHandle, AttributeValue, PeripheralId, PeripheralInfo,
    PeripheralRecord, ServiceDescriptor, ServiceHandle,
  },
  transport::{DiscoveryTransport, PresentationSink, TransportFuture},
  Error,
};

#[derive(Default)]
struct World {
  peripherals: BTreeMap<PeripheralId, Option<String>>,
  services: BTreeMap<PeripheralId, Vec<ServiceDescriptor>>,
  failing_services: HashSet<PeripheralId>,
  attributes: HashMap<ServiceHandle, Vec<AttributeDescriptor>>,
  values: HashMap<AttributeHandle, Vec<u8>>,
  read_delays: HashMap<AttributeHandle, Duration>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
  world: Arc<Mutex<World>>,
}

impl FakeTransport {
  fn with_world<T>(&self, f: impl FnOnce(&mut World) -> T) -> T {
    let mut world = self.world.lock().unwrap();
    f(&mut world)
  }

  pub fn add_peripheral(&self, id: &str, name: Option<&str>) {
    self.with_world(|world| {
      world.peripherals.insert(id.into(), name.map(str::to_string));
    });
  }

  pub fn add_service(&self, peripheral: &str, handle: &str, uuid: &str) -> ServiceDescriptor {
    let service = ServiceDescriptor {
      handle: handle.into(),
      peripheral: peripheral.into(),
      uuid: parse_uuid(uuid).unwrap(),
    };
    self.with_world(|world| {
      world
        .services
        .entry(peripheral.into())
        .or_default()
        .push(service.clone());
    });
    service
  }

  pub fn remove_service(&self, peripheral: &str, handle: &str) {
    self.with_world(|world| {
      if let Some(services) = world.services.get_mut(&PeripheralId::from(peripheral)) {
        services.retain(|service| service.handle.as_str() != handle);
      }
    });
  }

  pub fn fail_services(&self, peripheral: &str) {
    self.with_world(|world| {
      world.failing_services.insert(peripheral.into());
    });
  }

  /// A `None` value makes reads of the attribute fail.
  pub fn add_attribute(&self, service: &str, handle: &str, uuid: &str, value: Option<Vec<u8>>) {
    self.with_world(|world| {
      world.attributes.entry(service.into()).or_default().push(AttributeDescriptor {
        handle: handle.into(),
        uuid: parse_uuid(uuid).unwrap(),
      });
      if let Some(value) = value {
        world.values.insert(handle.into(), value);
      }
    });
  }

  pub fn delay_read(&self, handle: &str, delay: Duration) {
    self.with_world(|world| {
      world.read_delays.insert(handle.into(), delay);
    });
  }
}

impl DiscoveryTransport for FakeTransport {
  fn list_peripherals(&self) -> TransportFuture<Vec<PeripheralInfo>> {
    let peripherals = self.with_world(|world| {
      world
        .peripherals
        .iter()
        .map(|(id, name)| PeripheralInfo {
          id: id.clone(),
          name: name.clone(),
        })
        .collect()
    });
    futures::future::ready(Ok(peripherals)).boxed()
  }

  fn peripheral(&self, id: &PeripheralId) -> TransportFuture<PeripheralInfo> {
    let result = self.with_world(|world| {
      world
        .peripherals
        .get(id)
        .map(|name| PeripheralInfo {
          id: id.clone(),
          name: name.clone(),
        })
        .ok_or_else(|| Error::DeviceNotFound(id.to_string()))
    });
    futures::future::ready(result).boxed()
  }

  fn list_services(&self, id: &PeripheralId) -> TransportFuture<Vec<ServiceDescriptor>> {
    let result = self.with_world(|world| {
      if world.failing_services.contains(id) {
        return Err(Error::Transport(format!("services of {id} unavailable")));
      }
      Ok(world.services.get(id).cloned().unwrap_or_default())
    });
    futures::future::ready(result).boxed()
  }

  fn list_attributes(&self, service: &ServiceDescriptor) -> TransportFuture<Vec<AttributeDescriptor>> {
    let attributes = self.with_world(|world| world.attributes.get(&service.handle).cloned().unwrap_or_default());
    futures::future::ready(Ok(attributes)).boxed()
  }

  fn read_attribute(&self, attribute: &AttributeHandle) -> TransportFuture<Vec<u8>> {
    let (result, delay) = self.with_world(|world| {
      let result = world
        .values
        .get(attribute)
        .cloned()
        .ok_or_else(|| Error::Transport(format!("read of {attribute} failed")));
      (result, world.read_delays.get(attribute).copied())
    });
    async move {
      if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
      }
      result
    }
    .boxed()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
  Directory(Vec<PeripheralRecord>),
  SelectionCleared,
  Selected(ServiceHandle),
  Value(String, String),
}

#[derive(Clone, Default)]
pub struct RecordingSink {
  events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
  pub fn events(&self) -> Vec<SinkEvent> {
    self.events.lock().unwrap().clone()
  }

  pub fn clear(&self) {
    self.events.lock().unwrap().clear();
  }

  fn record(&self, event: SinkEvent) {
    self.events.lock().unwrap().push(event);
  }
}

impl PresentationSink for RecordingSink {
  fn on_directory_changed(&mut self, devices: &[PeripheralRecord]) {
    self.record(SinkEvent::Directory(devices.to_vec()));
  }

  fn on_selection_cleared(&mut self) {
    self.record(SinkEvent::SelectionCleared);
  }

  fn on_service_selected(&mut self, service: &ServiceDescriptor) {
    self.record(SinkEvent::Selected(service.handle.clone()));
  }

  fn on_attribute_value_changed(&mut self, value: &AttributeValue) {
    self.record(SinkEvent::Value(value.kind.clone(), value.display.clone()));
  }
}
