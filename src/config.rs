use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{models::ServiceDescriptor, Error, Result};

const DEVICE_INFORMATION_SERVICE: u16 = 0x180a;
const DEFAULT_ATTRIBUTES: [(&str, u16, ValueStyle); 2] = [
  ("manufacturerName", 0x2a29, ValueStyle::Name),
  ("serialNumber", 0x2a25, ValueStyle::Identifier),
];

/// Plugin configuration as written under `plugins.device-info`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfoConfig {
  #[serde(default = "default_service")]
  pub service: String,
  #[serde(default = "default_attributes")]
  pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConfig {
  pub kind: String,
  pub uuid: String,
  #[serde(default)]
  pub style: ValueStyle,
}

/// How a decoded value is presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueStyle {
  /// Human readable names are wrapped in double quotes.
  Name,
  #[default]
  Identifier,
}

fn default_service() -> String {
  format!("{DEVICE_INFORMATION_SERVICE:04x}")
}

fn default_attributes() -> Vec<AttributeConfig> {
  DEFAULT_ATTRIBUTES
    .iter()
    .map(|&(kind, short, style)| AttributeConfig {
      kind: kind.into(),
      uuid: format!("{short:04x}"),
      style,
    })
    .collect()
}

impl Default for DeviceInfoConfig {
  fn default() -> Self {
    Self {
      service: default_service(),
      attributes: default_attributes(),
    }
  }
}

/// Validated form of [`DeviceInfoConfig`] shared by the directory and the
/// selection controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
  pub qualifying_service: Uuid,
  pub attributes: Vec<WatchedAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedAttribute {
  pub kind: String,
  pub uuid: Uuid,
  pub style: ValueStyle,
}

impl TryFrom<DeviceInfoConfig> for WatchConfig {
  type Error = Error;

  fn try_from(config: DeviceInfoConfig) -> Result<Self> {
    let qualifying_service = parse_uuid(&config.service)?;
    let mut seen = HashSet::new();
    let mut seen_uuids = HashSet::new();
    let attributes = config
      .attributes
      .into_iter()
      .map(|attribute| {
        let kind = attribute.kind.trim().to_string();
        if kind.is_empty() {
          return Err(Error::InvalidConfig("attribute kind must not be empty".into()));
        }
        if !seen.insert(kind.clone()) {
          return Err(Error::InvalidConfig(format!("attribute kind '{kind}' is listed twice")));
        }
        let uuid = parse_uuid(&attribute.uuid)?;
        if !seen_uuids.insert(uuid) {
          return Err(Error::InvalidConfig(format!(
            "attribute '{kind}' reuses characteristic {uuid}"
          )));
        }
        Ok(WatchedAttribute {
          kind,
          uuid,
          style: attribute.style,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      qualifying_service,
      attributes,
    })
  }
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      qualifying_service: expand_short_uuid(DEVICE_INFORMATION_SERVICE),
      attributes: DEFAULT_ATTRIBUTES
        .iter()
        .map(|&(kind, short, style)| WatchedAttribute {
          kind: kind.into(),
          uuid: expand_short_uuid(short),
          style,
        })
        .collect(),
    }
  }
}

impl WatchConfig {
  /// The one match rule both components use to decide whether a service is of
  /// interest.
  pub fn is_qualifying(&self, service: &ServiceDescriptor) -> bool {
    service.uuid == self.qualifying_service
  }

  pub fn watched_for(&self, uuid: &Uuid) -> Option<&WatchedAttribute> {
    self.attributes.iter().find(|attribute| attribute.uuid == *uuid)
  }

  pub fn watched(&self, kind: &str) -> Option<&WatchedAttribute> {
    self.attributes.iter().find(|attribute| attribute.kind == kind)
  }
}

fn expand_short_uuid(short: u16) -> Uuid {
  Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

/// Accepts 16-bit (`180a`), 32-bit and full UUID strings, with or without `0x`.
pub fn parse_uuid(input: &str) -> Result<Uuid> {
  let trimmed = input.trim().trim_start_matches("0x");
  let normalized = match trimmed.len() {
    4 => format!("0000{trimmed}-0000-1000-8000-00805f9b34fb"),
    8 => format!("{trimmed}-0000-1000-8000-00805f9b34fb"),
    _ => trimmed.to_string(),
  };
  Ok(Uuid::parse_str(&normalized)?)
}
