use std::{marker::PhantomData, sync::Arc};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::Serialize;
use tauri::{async_runtime, plugin::PluginApi, AppHandle, Emitter, Runtime};
use tokio::sync::mpsc;

use crate::{
  models::*, BtleplugTransport, DeviceInfoConfig, PresentationSink, Result, Session, SessionHandle,
  WatchConfig,
};

pub fn init<R: Runtime>(
  app: &AppHandle<R>,
  api: PluginApi<R, Option<DeviceInfoConfig>>,
) -> Result<DeviceInfo<R>> {
  let config = WatchConfig::try_from(api.config().clone().unwrap_or_default())?;
  log::info!(
    "device-info plugin starting | service={} | watched={}",
    config.qualifying_service,
    config.attributes.len()
  );
  let transport = async_runtime::block_on(BtleplugTransport::connect())?;
  let (session, handle) = Session::new(
    config,
    Arc::new(transport.clone()),
    Box::new(WebviewSink { app: app.clone() }),
  );

  async_runtime::spawn(async move {
    let events = match transport.watch_services().await {
      Ok(events) => events,
      Err(err) => {
        log::error!("Failed to subscribe to Bluetooth adapter events: {err}");
        mpsc::unbounded_channel().1
      }
    };
    session.run(events).await;
  });

  Ok(DeviceInfo {
    session: handle,
    _runtime: PhantomData,
  })
}

/// Access to the device-info APIs.
pub struct DeviceInfo<R: Runtime> {
  session: SessionHandle,
  _runtime: PhantomData<fn() -> R>,
}

impl<R: Runtime> DeviceInfo<R> {
  pub async fn get_view(&self) -> Result<SessionView> {
    self.session.view().await
  }

  /// An empty or missing id selects the placeholder entry and clears the view.
  pub async fn select_device(&self, request: SelectDeviceRequest) -> Result<()> {
    let device_id = request
      .device_id
      .filter(|id| !id.is_empty())
      .map(PeripheralId::from);
    log::info!("select_device invoked | device_id={:?}", device_id);
    self.session.pick_peripheral(device_id)
  }
}

struct WebviewSink<R: Runtime> {
  app: AppHandle<R>,
}

impl<R: Runtime> WebviewSink<R> {
  fn emit<S: Serialize + Clone>(&self, event: &str, payload: S) {
    if let Err(err) = self.app.emit(event, payload) {
      log::warn!("Failed to emit device-info event | event={} | err={:?}", event, err);
    }
  }
}

impl<R: Runtime> PresentationSink for WebviewSink<R> {
  fn on_directory_changed(&mut self, devices: &[PeripheralRecord]) {
    if devices.is_empty() {
      log::info!("No devices found with the watched service");
    }
    self.emit(
      EVENT_DEVICES_CHANGED,
      DevicesChangedPayload {
        devices: devices.to_vec(),
      },
    );
  }

  fn on_selection_cleared(&mut self) {
    self.emit(
      EVENT_SELECTION_CHANGED,
      SelectionChangedPayload {
        device_id: None,
        service: None,
      },
    );
  }

  fn on_service_selected(&mut self, service: &ServiceDescriptor) {
    self.emit(
      EVENT_SELECTION_CHANGED,
      SelectionChangedPayload {
        device_id: Some(service.peripheral.clone()),
        service: Some(service.handle.clone()),
      },
    );
  }

  fn on_attribute_value_changed(&mut self, value: &AttributeValue) {
    self.emit(
      EVENT_VALUE_CHANGED,
      ValueChangedPayload {
        kind: value.kind.clone(),
        display: value.display.clone(),
        value: value.raw.as_ref().map(|raw| BASE64_STANDARD.encode(raw)),
      },
    );
  }
}
