use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use crate::{
  config::WatchConfig,
  dispatch::{Notification, Operation, ServicesPurpose, Step},
  models::{PeripheralId, PeripheralInfo, PeripheralRecord, ServiceDescriptor},
  Result,
};

/// Peripherals currently known to expose the qualifying service, keyed by
/// identity.
#[derive(Debug)]
pub struct PeripheralDirectory {
  config: Arc<WatchConfig>,
  entries: BTreeMap<PeripheralId, String>,
  /// Peripherals with a qualifying service that are waiting on name resolution.
  resolving: BTreeSet<PeripheralId>,
}

impl PeripheralDirectory {
  pub fn new(config: Arc<WatchConfig>) -> Self {
    Self {
      config,
      entries: BTreeMap::new(),
      resolving: BTreeSet::new(),
    }
  }

  pub fn contains(&self, id: &PeripheralId) -> bool {
    self.entries.contains_key(id)
  }

  pub fn snapshot(&self) -> Vec<PeripheralRecord> {
    self
      .entries
      .iter()
      .map(|(id, display_name)| PeripheralRecord {
        id: id.clone(),
        display_name: display_name.clone(),
      })
      .collect()
  }

  /// Starts the bulk enumeration.
  pub fn start(&self) -> Step {
    Step::operation(Operation::ListPeripherals)
  }

  pub fn on_peripherals_listed(&mut self, result: Result<Vec<PeripheralInfo>>) -> Step {
    let peripherals = match result {
      Ok(peripherals) => peripherals,
      Err(err) => {
        log::warn!("Failed to list peripherals | err={err}");
        return Step::default();
      }
    };
    log::info!("Enumerating services | peripherals={}", peripherals.len());
    let mut step = Step::default();
    for info in peripherals {
      step.push_operation(Operation::ListServices {
        peripheral: info.id.clone(),
        purpose: ServicesPurpose::Enumerate { name: info.name },
      });
    }
    step
  }

  pub fn on_enumerated(
    &mut self,
    peripheral: PeripheralId,
    name: Option<String>,
    result: Result<Vec<ServiceDescriptor>>,
  ) -> Step {
    let services = match result {
      Ok(services) => services,
      Err(err) => {
        log::warn!("Skipping peripheral during enumeration | device_id={peripheral} | err={err}");
        return Step::default();
      }
    };
    if !services.iter().any(|service| self.config.is_qualifying(service)) {
      log::debug!("Peripheral has no qualifying service | device_id={peripheral}");
      return Step::default();
    }
    log::info!("Found device with qualifying service | device_id={peripheral}");
    self.insert(PeripheralInfo { id: peripheral, name })
  }

  /// Handles a service-added event.
  pub fn add_if_qualifying(&mut self, service: &ServiceDescriptor) -> Step {
    if !self.config.is_qualifying(service) || self.contains(&service.peripheral) {
      return Step::default();
    }
    self.resolving.insert(service.peripheral.clone());
    log::info!(
      "Qualifying service added | device_id={} | service={}",
      service.peripheral,
      service.handle
    );
    Step::operation(Operation::ResolvePeripheral(service.peripheral.clone()))
  }

  pub fn on_peripheral_resolved(&mut self, peripheral: PeripheralId, result: Result<PeripheralInfo>) -> Step {
    let info = match result {
      Ok(info) => info,
      Err(err) => {
        log::warn!("Failed to resolve peripheral | device_id={peripheral} | err={err}");
        return Step::default();
      }
    };
    if self.contains(&peripheral) || !self.resolving.remove(&peripheral) {
      log::debug!("Peripheral no longer needs adding, ignoring resolution | device_id={peripheral}");
      return Step::default();
    }
    self.insert(PeripheralInfo {
      id: peripheral,
      name: info.name,
    })
  }

  /// Handles a service-removed event.
  pub fn remove_if_no_longer_qualifying(&self, service: &ServiceDescriptor) -> Step {
    let tracked = self.contains(&service.peripheral) || self.resolving.contains(&service.peripheral);
    if !self.config.is_qualifying(service) || !tracked {
      return Step::default();
    }
    log::info!(
      "Qualifying service removed | device_id={} | service={}",
      service.peripheral,
      service.handle
    );
    Step::operation(Operation::ListServices {
      peripheral: service.peripheral.clone(),
      purpose: ServicesPurpose::Reconcile,
    })
  }

  pub fn on_reconciled(&mut self, peripheral: PeripheralId, result: Result<Vec<ServiceDescriptor>>) -> Step {
    match result {
      Ok(services) if services.iter().any(|service| self.config.is_qualifying(service)) => {
        log::debug!("Peripheral still exposes a qualifying service | device_id={peripheral}");
        Step::default()
      }
      Ok(_) => {
        log::info!("Removing device | device_id={peripheral}");
        self.remove(&peripheral)
      }
      Err(err) => {
        log::warn!("Failed to re-list services, removing device | device_id={peripheral} | err={err}");
        self.remove(&peripheral)
      }
    }
  }

  fn insert(&mut self, info: PeripheralInfo) -> Step {
    let record = PeripheralRecord::from(info);
    if self.entries.get(&record.id) == Some(&record.display_name) {
      return Step::default();
    }
    self.entries.insert(record.id, record.display_name);
    self.changed()
  }

  fn remove(&mut self, peripheral: &PeripheralId) -> Step {
    self.resolving.remove(peripheral);
    if self.entries.remove(peripheral).is_none() {
      return Step::default();
    }
    self.changed()
  }

  fn changed(&self) -> Step {
    Step::notification(Notification::DirectoryChanged(self.snapshot()))
  }
}
