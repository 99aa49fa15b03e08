//! Tracks nearby peripherals that expose a GATT service and shows the device
//! information of the one the user picks.
//!
//! The synchronization core ([`Dispatcher`], [`Session`]) is transport and UI
//! agnostic. The `native` feature adds a btleplug transport and the `plugin`
//! feature wires everything into a Tauri plugin.

#[cfg(feature = "plugin")]
use tauri::{
  plugin::{Builder, TauriPlugin},
  Manager, Runtime,
};

pub use models::*;

#[cfg(all(feature = "plugin", desktop))]
mod desktop;
#[cfg(all(feature = "plugin", mobile))]
mod mobile;

#[cfg(feature = "plugin")]
mod commands;
mod config;
mod directory;
mod dispatch;
mod error;
#[cfg(test)]
mod fake;
mod models;
#[cfg(feature = "native")]
mod native;
mod selection;
mod session;
mod transport;

pub use config::{parse_uuid, AttributeConfig, DeviceInfoConfig, ValueStyle, WatchConfig, WatchedAttribute};
pub use directory::PeripheralDirectory;
pub use dispatch::{Completion, Dispatcher, Notification, Operation, ServicesPurpose, Step};
pub use error::{Error, Result};
#[cfg(feature = "native")]
pub use native::BtleplugTransport;
pub use selection::{display_value, SelectionController};
pub use session::{Session, SessionHandle};
pub use transport::{DiscoveryTransport, PresentationSink, TransportFuture};

#[cfg(all(feature = "plugin", desktop))]
use desktop::DeviceInfo;
#[cfg(all(feature = "plugin", mobile))]
use mobile::DeviceInfo;

/// Extensions to [`tauri::App`], [`tauri::AppHandle`] and [`tauri::Window`] to access the device-info APIs.
#[cfg(feature = "plugin")]
pub trait DeviceInfoExt<R: Runtime> {
  fn device_info(&self) -> &DeviceInfo<R>;
}

#[cfg(feature = "plugin")]
impl<R: Runtime, T: Manager<R>> crate::DeviceInfoExt<R> for T {
  fn device_info(&self) -> &DeviceInfo<R> {
    self.state::<DeviceInfo<R>>().inner()
  }
}

/// Initializes the plugin.
#[cfg(feature = "plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R, Option<DeviceInfoConfig>> {
  Builder::<R, Option<DeviceInfoConfig>>::new("device-info")
    .invoke_handler(commands::handlers())
    .setup(|app, api| {
      #[cfg(mobile)]
      let device_info = mobile::init(app, api)?;
      #[cfg(desktop)]
      let device_info = desktop::init(app, api)?;
      app.manage(device_info);
      Ok(())
    })
    .build()
}
