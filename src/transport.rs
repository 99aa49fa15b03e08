use futures::future::BoxFuture;

use crate::{
  models::{
    AttributeDescriptor, AttributeHandle, AttributeValue, PeripheralId, PeripheralInfo,
    PeripheralRecord, ServiceDescriptor,
  },
  Result,
};

pub type TransportFuture<T> = BoxFuture<'static, Result<T>>;

/// Discovery and GATT access the session drives.
///
/// Every call may fail and may complete in any order relative to other calls
/// and to incoming service events.
pub trait DiscoveryTransport: Send + Sync + 'static {
  fn list_peripherals(&self) -> TransportFuture<Vec<PeripheralInfo>>;

  /// Resolves one peripheral, mainly for its display name.
  fn peripheral(&self, id: &PeripheralId) -> TransportFuture<PeripheralInfo>;

  fn list_services(&self, id: &PeripheralId) -> TransportFuture<Vec<ServiceDescriptor>>;

  fn list_attributes(&self, service: &ServiceDescriptor) -> TransportFuture<Vec<AttributeDescriptor>>;

  fn read_attribute(&self, attribute: &AttributeHandle) -> TransportFuture<Vec<u8>>;
}

/// Receives render updates. Holds no synchronization logic of its own.
pub trait PresentationSink: Send + 'static {
  fn on_directory_changed(&mut self, devices: &[PeripheralRecord]);

  fn on_selection_cleared(&mut self);

  fn on_service_selected(&mut self, service: &ServiceDescriptor);

  fn on_attribute_value_changed(&mut self, value: &AttributeValue);
}
