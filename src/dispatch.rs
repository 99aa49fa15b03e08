//! Fans transport events and user input out to the directory and the
//! selection controller.
//!
//! Every entry point is synchronous and returns a [`Step`]: the notifications
//! to render and the transport operations to start. Operation results come
//! back through [`Dispatcher::complete`] in whatever order they finish.

use std::sync::Arc;

use crate::{
  config::WatchConfig,
  directory::PeripheralDirectory,
  models::{
    AttributeDescriptor, AttributeHandle, AttributeValue, PeripheralId, PeripheralInfo,
    PeripheralRecord, ServiceDescriptor, ServiceEvent, ServiceHandle, SessionView,
  },
  selection::SelectionController,
  Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
  DirectoryChanged(Vec<PeripheralRecord>),
  SelectionCleared,
  ServiceSelected(ServiceDescriptor),
  AttributeValueChanged(AttributeValue),
}

/// Why a peripheral's services are being listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServicesPurpose {
  /// Startup enumeration, carrying the name from the peripheral listing.
  Enumerate { name: Option<String> },
  /// A qualifying service went away; check whether another instance remains.
  Reconcile,
  /// The user picked this peripheral.
  Pick { ticket: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  ListPeripherals,
  ListServices {
    peripheral: PeripheralId,
    purpose: ServicesPurpose,
  },
  ResolvePeripheral(PeripheralId),
  ListAttributes(ServiceDescriptor),
  ReadAttribute {
    service: ServiceHandle,
    kind: String,
    attribute: AttributeHandle,
  },
}

#[derive(Debug)]
pub enum Completion {
  PeripheralsListed(Result<Vec<PeripheralInfo>>),
  ServicesListed {
    peripheral: PeripheralId,
    purpose: ServicesPurpose,
    result: Result<Vec<ServiceDescriptor>>,
  },
  PeripheralResolved {
    peripheral: PeripheralId,
    result: Result<PeripheralInfo>,
  },
  AttributesListed {
    service: ServiceHandle,
    result: Result<Vec<AttributeDescriptor>>,
  },
  AttributeRead {
    service: ServiceHandle,
    kind: String,
    attribute: AttributeHandle,
    result: Result<Vec<u8>>,
  },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Step {
  pub notifications: Vec<Notification>,
  pub operations: Vec<Operation>,
}

impl Step {
  pub fn notification(notification: Notification) -> Self {
    Self {
      notifications: vec![notification],
      operations: Vec::new(),
    }
  }

  pub fn operation(operation: Operation) -> Self {
    Self {
      notifications: Vec::new(),
      operations: vec![operation],
    }
  }

  pub fn push_notification(&mut self, notification: Notification) {
    self.notifications.push(notification);
  }

  pub fn push_operation(&mut self, operation: Operation) {
    self.operations.push(operation);
  }

  pub fn merge(mut self, other: Step) -> Self {
    self.notifications.extend(other.notifications);
    self.operations.extend(other.operations);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.notifications.is_empty() && self.operations.is_empty()
  }
}

#[derive(Debug)]
pub struct Dispatcher {
  directory: PeripheralDirectory,
  selection: SelectionController,
}

impl Dispatcher {
  pub fn new(config: WatchConfig) -> Self {
    let config = Arc::new(config);
    Self {
      directory: PeripheralDirectory::new(config.clone()),
      selection: SelectionController::new(config),
    }
  }

  pub fn directory(&self) -> &PeripheralDirectory {
    &self.directory
  }

  pub fn selection(&self) -> &SelectionController {
    &self.selection
  }

  pub fn start(&self) -> Step {
    self.directory.start()
  }

  pub fn handle_event(&mut self, event: ServiceEvent) -> Step {
    match event {
      ServiceEvent::Added(service) => self.directory.add_if_qualifying(&service),
      ServiceEvent::Removed(service) => self
        .selection
        .on_service_removed(&service)
        .merge(self.directory.remove_if_no_longer_qualifying(&service)),
      ServiceEvent::Changed(service) => self.selection.on_service_changed(service),
    }
  }

  pub fn pick_peripheral(&mut self, peripheral: Option<PeripheralId>) -> Step {
    self.selection.pick_peripheral(peripheral)
  }

  pub fn select_service(&mut self, service: Option<ServiceDescriptor>) -> Step {
    self.selection.select(service)
  }

  pub fn complete(&mut self, completion: Completion) -> Step {
    match completion {
      Completion::PeripheralsListed(result) => self.directory.on_peripherals_listed(result),
      Completion::ServicesListed {
        peripheral,
        purpose,
        result,
      } => match purpose {
        ServicesPurpose::Enumerate { name } => self.directory.on_enumerated(peripheral, name, result),
        ServicesPurpose::Reconcile => self.reconcile(peripheral, result),
        ServicesPurpose::Pick { ticket } => self.selection.on_picked(ticket, peripheral, result),
      },
      Completion::PeripheralResolved { peripheral, result } => {
        self.directory.on_peripheral_resolved(peripheral, result)
      }
      Completion::AttributesListed { service, result } => self.selection.on_attributes_listed(&service, result),
      Completion::AttributeRead {
        service,
        kind,
        attribute,
        result,
      } => self.selection.on_attribute_read(&service, &kind, &attribute, result),
    }
  }

  /// A peripheral dropped from the directory takes the selection with it.
  fn reconcile(&mut self, peripheral: PeripheralId, result: Result<Vec<ServiceDescriptor>>) -> Step {
    let was_listed = self.directory.contains(&peripheral);
    let step = self.directory.on_reconciled(peripheral.clone(), result);
    let dropped = was_listed && !self.directory.contains(&peripheral);
    let selected_here = self
      .selection
      .selected()
      .is_some_and(|service| service.peripheral == peripheral);
    if dropped && selected_here {
      log::info!("Selected device left the directory | device_id={peripheral}");
      return step.merge(self.selection.select(None));
    }
    step
  }

  pub fn view(&self) -> SessionView {
    SessionView {
      devices: self.directory.snapshot(),
      selected: self.selection.selected().cloned(),
      fields: self.selection.fields(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::collections::{BTreeMap, VecDeque};

  use super::*;
  use crate::{config::parse_uuid, Error};

  fn service(peripheral: &str, instance: &str, short: &str) -> ServiceDescriptor {
    ServiceDescriptor {
      handle: format!("{peripheral}/{instance}").into(),
      peripheral: peripheral.into(),
      uuid: parse_uuid(short).unwrap(),
    }
  }

  fn attribute(service: &ServiceDescriptor, instance: &str, short: &str) -> AttributeDescriptor {
    AttributeDescriptor {
      handle: format!("{}/{instance}", service.handle).into(),
      uuid: parse_uuid(short).unwrap(),
    }
  }

  fn selection_notifications(step: &Step) -> usize {
    step
      .notifications
      .iter()
      .filter(|notification| !matches!(notification, Notification::DirectoryChanged(_)))
      .count()
  }

  fn select_and_list(dispatcher: &mut Dispatcher, target: &ServiceDescriptor) -> Vec<Operation> {
    dispatcher.select_service(Some(target.clone()));
    dispatcher
      .complete(Completion::AttributesListed {
        service: target.handle.clone(),
        result: Ok(vec![attribute(target, "name", "2a29"), attribute(target, "serial", "2a25")]),
      })
      .operations
  }

  #[test]
  fn removing_selected_peripheral_clears_once_in_either_order() {
    for directory_first in [false, true] {
      let mut dispatcher = Dispatcher::new(WatchConfig::default());
      let a = service("A", "1", "180a");
      dispatcher.complete(Completion::ServicesListed {
        peripheral: "A".into(),
        purpose: ServicesPurpose::Enumerate { name: None },
        result: Ok(vec![a.clone()]),
      });
      select_and_list(&mut dispatcher, &a);

      let mut cleared = 0;
      let mut directory_changes = 0;
      let mut count = |step: &Step| {
        for notification in &step.notifications {
          match notification {
            Notification::SelectionCleared => cleared += 1,
            Notification::DirectoryChanged(_) => directory_changes += 1,
            _ => {}
          }
        }
      };

      let reconcile = Completion::ServicesListed {
        peripheral: "A".into(),
        purpose: ServicesPurpose::Reconcile,
        result: Err(Error::DeviceNotFound("A".into())),
      };
      if directory_first {
        // the directory learns of the loss through its own re-listing first
        let step = dispatcher.complete(reconcile);
        count(&step);
        let step = dispatcher.handle_event(ServiceEvent::Removed(a.clone()));
        count(&step);
      } else {
        let step = dispatcher.handle_event(ServiceEvent::Removed(a.clone()));
        count(&step);
        let step = dispatcher.complete(reconcile);
        count(&step);
      }

      assert_eq!(cleared, 1);
      assert_eq!(directory_changes, 1);
      assert!(dispatcher.view().devices.is_empty());
      assert!(dispatcher.view().selected.is_none());
    }
  }

  #[test]
  fn losing_a_sibling_instance_that_drops_the_peripheral_clears_selection() {
    let mut dispatcher = Dispatcher::new(WatchConfig::default());
    let first = service("A", "1", "180a");
    let second = service("A", "2", "180a");
    dispatcher.complete(Completion::ServicesListed {
      peripheral: "A".into(),
      purpose: ServicesPurpose::Enumerate { name: None },
      result: Ok(vec![first.clone(), second.clone()]),
    });
    select_and_list(&mut dispatcher, &second);

    let step = dispatcher.handle_event(ServiceEvent::Removed(first));
    assert_eq!(selection_notifications(&step), 0);
    let step = dispatcher.complete(Completion::ServicesListed {
      peripheral: "A".into(),
      purpose: ServicesPurpose::Reconcile,
      result: Err(Error::Transport("gone".into())),
    });

    assert!(step.notifications.contains(&Notification::DirectoryChanged(Vec::new())));
    assert!(step.notifications.contains(&Notification::SelectionCleared));
    let view = dispatcher.view();
    assert!(view.devices.is_empty());
    assert!(view.selected.is_none());
  }

  #[test]
  fn reconcile_that_keeps_the_peripheral_keeps_selection() {
    let mut dispatcher = Dispatcher::new(WatchConfig::default());
    let first = service("A", "1", "180a");
    let second = service("A", "2", "180a");
    dispatcher.complete(Completion::ServicesListed {
      peripheral: "A".into(),
      purpose: ServicesPurpose::Enumerate { name: None },
      result: Ok(vec![first.clone(), second.clone()]),
    });
    select_and_list(&mut dispatcher, &second);

    dispatcher.handle_event(ServiceEvent::Removed(first));
    let step = dispatcher.complete(Completion::ServicesListed {
      peripheral: "A".into(),
      purpose: ServicesPurpose::Reconcile,
      result: Ok(vec![second.clone()]),
    });

    assert!(step.is_empty());
    assert_eq!(dispatcher.view().selected, Some(second));
  }

  #[test]
  fn change_on_unselected_service_is_silent() {
    let mut dispatcher = Dispatcher::new(WatchConfig::default());
    let a = service("A", "1", "180a");
    let b = service("B", "1", "180a");
    for target in [&a, &b] {
      dispatcher.complete(Completion::ServicesListed {
        peripheral: target.peripheral.clone(),
        purpose: ServicesPurpose::Enumerate { name: None },
        result: Ok(vec![target.clone()]),
      });
    }
    select_and_list(&mut dispatcher, &a);

    let step = dispatcher.handle_event(ServiceEvent::Changed(b));
    assert!(step.is_empty());
    assert_eq!(selection_notifications(&step), 0);
  }

  #[test]
  fn change_on_selected_service_reselects() {
    let mut dispatcher = Dispatcher::new(WatchConfig::default());
    let a = service("A", "1", "180a");
    let reads = select_and_list(&mut dispatcher, &a);
    for operation in reads {
      if let Operation::ReadAttribute { service, kind, attribute } = operation {
        dispatcher.complete(Completion::AttributeRead { service, kind, attribute, result: Ok(b"X".to_vec()) });
      }
    }

    let step = dispatcher.handle_event(ServiceEvent::Changed(a.clone()));
    assert!(step.notifications.contains(&Notification::ServiceSelected(a.clone())));
    assert_eq!(step.operations, vec![Operation::ListAttributes(a)]);
    assert!(dispatcher.view().fields.iter().all(|field| field.display == crate::PLACEHOLDER));
  }

  #[test]
  fn removal_of_non_qualifying_service_with_same_handle_keeps_selection() {
    let mut dispatcher = Dispatcher::new(WatchConfig::default());
    let a = service("A", "1", "180a");
    dispatcher.select_service(Some(a.clone()));
    let mut imposter = a.clone();
    imposter.uuid = parse_uuid("180f").unwrap();
    assert!(dispatcher.handle_event(ServiceEvent::Removed(imposter)).is_empty());
    assert_eq!(dispatcher.view().selected, Some(a));
  }

  /// Replays a generated add/remove sequence, delivering operation results in
  /// a shuffled order against a world that keeps changing, and checks the
  /// directory converges on the set of peripherals with a qualifying service.
  #[test]
  fn directory_matches_reference_model_after_replay() {
    let peripherals = ["A", "B", "C", "D"];
    let kinds = ["180a", "180f"];
    let mut seed: u64 = 0x5eed_1234;
    let mut next = move |bound: usize| {
      seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
      ((seed >> 33) as usize) % bound
    };

    for _round in 0..50 {
      let mut dispatcher = Dispatcher::new(WatchConfig::default());
      let mut world: BTreeMap<String, Vec<ServiceDescriptor>> = BTreeMap::new();
      let mut pending: VecDeque<Operation> = VecDeque::new();
      let mut instance = 0;

      let execute = |world: &BTreeMap<String, Vec<ServiceDescriptor>>, operation: Operation| match operation {
        Operation::ListServices { peripheral, purpose } => Completion::ServicesListed {
          result: Ok(world.get(peripheral.as_str()).cloned().unwrap_or_default()),
          peripheral,
          purpose,
        },
        Operation::ResolvePeripheral(peripheral) => Completion::PeripheralResolved {
          result: Ok(PeripheralInfo { id: peripheral.clone(), name: None }),
          peripheral,
        },
        other => panic!("unexpected operation {other:?}"),
      };

      for _ in 0..40 {
        let peripheral = peripherals[next(peripherals.len())];
        let existing = world.entry(peripheral.to_string()).or_default();
        let event = if existing.is_empty() || next(2) == 0 {
          instance += 1;
          let added = service(peripheral, &instance.to_string(), kinds[next(kinds.len())]);
          existing.push(added.clone());
          ServiceEvent::Added(added)
        } else {
          let removed = existing.remove(next(existing.len()));
          ServiceEvent::Removed(removed)
        };
        pending.extend(dispatcher.handle_event(event).operations);

        // deliver a random subset of outstanding results, out of order
        while !pending.is_empty() && next(3) != 0 {
          let operation = pending.remove(next(pending.len())).unwrap();
          let completion = execute(&world, operation);
          pending.extend(dispatcher.complete(completion).operations);
        }
      }
      while let Some(operation) = pending.pop_front() {
        let completion = execute(&world, operation);
        pending.extend(dispatcher.complete(completion).operations);
      }

      let qualifying = parse_uuid("180a").unwrap();
      let expected: Vec<String> = world
        .iter()
        .filter(|(_, services)| services.iter().any(|service| service.uuid == qualifying))
        .map(|(peripheral, _)| peripheral.clone())
        .collect();
      let actual: Vec<String> = dispatcher
        .directory()
        .snapshot()
        .into_iter()
        .map(|record| record.id.to_string())
        .collect();
      assert_eq!(actual, expected);
    }
  }
}
