use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_DEVICES_CHANGED: &str = "device-info://devices-changed";
pub const EVENT_SELECTION_CHANGED: &str = "device-info://selection-changed";
pub const EVENT_VALUE_CHANGED: &str = "device-info://value-changed";

/// Shown for a watched field that has no value yet.
pub const PLACEHOLDER: &str = "-";

macro_rules! opaque_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
      }

      pub fn as_str(&self) -> &str {
        &self.0
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl From<&str> for $name {
      fn from(value: &str) -> Self {
        Self::new(value)
      }
    }

    impl From<String> for $name {
      fn from(value: String) -> Self {
        Self(value)
      }
    }
  };
}

opaque_id!(
  /// Stable identity of a physical peripheral, usually its address.
  PeripheralId
);
opaque_id!(
  /// One instance of a service on one peripheral.
  ServiceHandle
);
opaque_id!(
  /// One characteristic instance inside a service instance.
  AttributeHandle
);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralInfo {
  pub id: PeripheralId,
  pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeripheralRecord {
  pub id: PeripheralId,
  pub display_name: String,
}

impl From<PeripheralInfo> for PeripheralRecord {
  fn from(info: PeripheralInfo) -> Self {
    let display_name = info
      .name
      .filter(|name| !name.is_empty())
      .unwrap_or_else(|| info.id.to_string());
    Self {
      id: info.id,
      display_name,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
  pub handle: ServiceHandle,
  pub peripheral: PeripheralId,
  pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDescriptor {
  pub handle: AttributeHandle,
  pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
  Added(ServiceDescriptor),
  Removed(ServiceDescriptor),
  Changed(ServiceDescriptor),
}

impl ServiceEvent {
  pub fn service(&self) -> &ServiceDescriptor {
    match self {
      ServiceEvent::Added(service)
      | ServiceEvent::Removed(service)
      | ServiceEvent::Changed(service) => service,
    }
  }
}

/// Rendered state of one watched field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeValue {
  pub kind: String,
  /// Decoded text, or [`PLACEHOLDER`] while unread.
  pub display: String,
  #[serde(skip)]
  pub raw: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
  pub devices: Vec<PeripheralRecord>,
  pub selected: Option<ServiceDescriptor>,
  pub fields: Vec<AttributeValue>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectDeviceRequest {
  pub device_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicesChangedPayload {
  pub devices: Vec<PeripheralRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChangedPayload {
  pub device_id: Option<PeripheralId>,
  pub service: Option<ServiceHandle>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChangedPayload {
  pub kind: String,
  pub display: String,
  /// base64 encoded raw value, absent while unread
  pub value: Option<String>,
}
