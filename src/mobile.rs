use std::marker::PhantomData;

use tauri::{plugin::PluginApi, AppHandle, Runtime};

use crate::{models::*, DeviceInfoConfig, Error, Result};

pub fn init<R: Runtime>(
  _app: &AppHandle<R>,
  _api: PluginApi<R, Option<DeviceInfoConfig>>,
) -> Result<DeviceInfo<R>> {
  Ok(DeviceInfo(PhantomData))
}

/// Access to the device-info APIs.
pub struct DeviceInfo<R: Runtime>(PhantomData<fn() -> R>);

impl<R: Runtime> DeviceInfo<R> {
  pub async fn get_view(&self) -> Result<SessionView> {
    Err(Error::UnsupportedPlatform)
  }

  pub async fn select_device(&self, _request: SelectDeviceRequest) -> Result<()> {
    Err(Error::UnsupportedPlatform)
  }
}
