use serde::{ser::Serializer, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[cfg(feature = "native")]
  #[error(transparent)]
  Btleplug(#[from] btleplug::Error),
  #[error(transparent)]
  UuidParse(#[from] uuid::Error),
  #[error("Bluetooth adapter is not available on this system")]
  NoAdapter,
  #[error("Device {0} not found")]
  DeviceNotFound(String),
  #[error("Service {service_uuid} not found for device {device_id}")]
  ServiceNotFound {
    device_id: String,
    service_uuid: String,
  },
  #[error("Characteristic {characteristic_uuid} not found for device {device_id}")]
  CharacteristicNotFound {
    device_id: String,
    characteristic_uuid: String,
  },
  #[error("Malformed handle '{0}'")]
  InvalidHandle(String),
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),
  #[error("{0}")]
  Transport(String),
  #[error("Device info session has shut down")]
  SessionClosed,
  #[error("Device info is not implemented for this platform yet")]
  UnsupportedPlatform,
}

impl Serialize for Error {
  fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(self.to_string().as_ref())
  }
}
