use std::{collections::BTreeMap, sync::Arc};

use crate::{
  config::{ValueStyle, WatchConfig, WatchedAttribute},
  dispatch::{Notification, Operation, ServicesPurpose, Step},
  models::{
    AttributeDescriptor, AttributeHandle, AttributeValue, PeripheralId, ServiceDescriptor,
    ServiceHandle, PLACEHOLDER,
  },
  Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct WatchedSlot {
  attribute: AttributeHandle,
  value: Option<Vec<u8>>,
}

/// The single selected service and the values read from it.
///
/// Responses are never cancelled. A late response is dropped when the service
/// it belongs to is no longer selected, or when its attribute handle is no
/// longer the one tracked for its kind.
#[derive(Debug)]
pub struct SelectionController {
  config: Arc<WatchConfig>,
  selected: Option<ServiceDescriptor>,
  watched: BTreeMap<String, WatchedSlot>,
  pick_ticket: u64,
}

impl SelectionController {
  pub fn new(config: Arc<WatchConfig>) -> Self {
    Self {
      config,
      selected: None,
      watched: BTreeMap::new(),
      pick_ticket: 0,
    }
  }

  pub fn selected(&self) -> Option<&ServiceDescriptor> {
    self.selected.as_ref()
  }

  pub fn tracked_attribute(&self, kind: &str) -> Option<&AttributeHandle> {
    self.watched.get(kind).map(|slot| &slot.attribute)
  }

  /// Current rendering of every configured field.
  pub fn fields(&self) -> Vec<AttributeValue> {
    self
      .config
      .attributes
      .iter()
      .map(|watched| {
        let raw = self.watched.get(&watched.kind).and_then(|slot| slot.value.as_deref());
        render(watched, raw)
      })
      .collect()
  }

  pub fn select(&mut self, service: Option<ServiceDescriptor>) -> Step {
    let Some(service) = service else {
      return self.clear();
    };
    log::info!("GATT service selected | service={} | device_id={}", service.handle, service.peripheral);
    self.selected = Some(service.clone());
    self.watched.clear();

    let mut step = Step::notification(Notification::ServiceSelected(service.clone()));
    self.push_placeholders(&mut step);
    step.push_operation(Operation::ListAttributes(service));
    step
  }

  /// The user chose an entry from the device list. The peripheral's services
  /// are re-listed to find a qualifying one to display.
  pub fn pick_peripheral(&mut self, peripheral: Option<PeripheralId>) -> Step {
    self.pick_ticket += 1;
    let Some(peripheral) = peripheral else {
      return self.clear();
    };
    Step::operation(Operation::ListServices {
      peripheral,
      purpose: ServicesPurpose::Pick {
        ticket: self.pick_ticket,
      },
    })
  }

  pub fn on_picked(&mut self, ticket: u64, peripheral: PeripheralId, result: Result<Vec<ServiceDescriptor>>) -> Step {
    if ticket != self.pick_ticket {
      log::debug!("Dropping superseded device pick | device_id={peripheral}");
      return Step::default();
    }
    match result {
      Ok(services) => {
        let found = services
          .into_iter()
          .filter(|service| self.config.is_qualifying(service))
          .last();
        if found.is_none() {
          log::info!("Picked device has no qualifying service | device_id={peripheral}");
        }
        self.select(found)
      }
      Err(err) => {
        log::warn!("Failed to list services of picked device | device_id={peripheral} | err={err}");
        self.select(None)
      }
    }
  }

  pub fn on_attributes_listed(&mut self, service: &ServiceHandle, result: Result<Vec<AttributeDescriptor>>) -> Step {
    let attributes = match result {
      Ok(attributes) => attributes,
      Err(err) => {
        log::warn!("Failed to list characteristics | service={service} | err={err}");
        return Step::default();
      }
    };
    if !self.is_selected(service) {
      log::debug!("Service no longer selected, dropping characteristics | service={service}");
      return Step::default();
    }
    if attributes.is_empty() {
      log::info!("Service has no characteristics | service={service}");
      return Step::default();
    }

    let mut step = Step::default();
    for attribute in attributes {
      let Some(watched) = self.config.watched_for(&attribute.uuid) else {
        continue;
      };
      log::info!("Tracking characteristic | kind={} | characteristic={}", watched.kind, attribute.handle);
      self.watched.insert(
        watched.kind.clone(),
        WatchedSlot {
          attribute: attribute.handle.clone(),
          value: None,
        },
      );
      step.push_operation(Operation::ReadAttribute {
        service: service.clone(),
        kind: watched.kind.clone(),
        attribute: attribute.handle,
      });
    }
    step
  }

  pub fn on_attribute_read(
    &mut self,
    service: &ServiceHandle,
    kind: &str,
    attribute: &AttributeHandle,
    result: Result<Vec<u8>>,
  ) -> Step {
    let value = match result {
      Ok(value) => value,
      Err(err) => {
        log::warn!("Failed to read characteristic | kind={kind} | characteristic={attribute} | err={err}");
        return Step::default();
      }
    };
    if !self.is_selected(service) {
      return Step::default();
    }
    let Some(slot) = self.watched.get_mut(kind).filter(|slot| slot.attribute == *attribute) else {
      log::debug!("Dropping stale read | kind={kind} | characteristic={attribute}");
      return Step::default();
    };
    slot.value = Some(value);

    let Some(watched) = self.config.watched(kind) else {
      return Step::default();
    };
    let rendered = render(watched, slot.value.as_deref());
    log::info!("Value read | kind={kind} | value={}", rendered.display);
    Step::notification(Notification::AttributeValueChanged(rendered))
  }

  /// A changed event for the selected service re-runs the whole selection.
  pub fn on_service_changed(&mut self, service: ServiceDescriptor) -> Step {
    if !self.is_selected(&service.handle) {
      return Step::default();
    }
    log::info!("The selected service has changed | service={}", service.handle);
    self.select(Some(service))
  }

  pub fn on_service_removed(&mut self, service: &ServiceDescriptor) -> Step {
    if !self.config.is_qualifying(service) || !self.is_selected(&service.handle) {
      return Step::default();
    }
    log::info!("The selected service disappeared | service={}", service.handle);
    self.select(None)
  }

  fn clear(&mut self) -> Step {
    if self.selected.take().is_none() {
      return Step::default();
    }
    log::info!("No service selected");
    self.watched.clear();
    let mut step = Step::notification(Notification::SelectionCleared);
    self.push_placeholders(&mut step);
    step
  }

  fn push_placeholders(&self, step: &mut Step) {
    for watched in &self.config.attributes {
      step.push_notification(Notification::AttributeValueChanged(render(watched, None)));
    }
  }

  fn is_selected(&self, service: &ServiceHandle) -> bool {
    self
      .selected
      .as_ref()
      .map(|selected| selected.handle == *service)
      .unwrap_or(false)
  }
}

/// Decodes one byte per character, then quotes names.
pub fn display_value(style: ValueStyle, value: Option<&[u8]>) -> String {
  let Some(value) = value else {
    return PLACEHOLDER.to_string();
  };
  let decoded: String = value.iter().map(|&byte| char::from(byte)).collect();
  match style {
    ValueStyle::Name => format!("\"{decoded}\""),
    ValueStyle::Identifier => decoded,
  }
}

fn render(watched: &WatchedAttribute, value: Option<&[u8]>) -> AttributeValue {
  AttributeValue {
    kind: watched.kind.clone(),
    display: display_value(watched.style, value),
    raw: value.map(<[u8]>::to_vec),
  }
}
