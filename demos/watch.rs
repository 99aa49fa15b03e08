//! Console front-end: lists devices exposing the Device Information service and
//! shows the manufacturer name and serial number of the first one found.
//!
//! `RUST_LOG=info cargo run --example watch --features native`

use std::{error::Error, sync::Arc, time::Duration};

use tauri_plugin_device_info::{
  AttributeValue, BtleplugTransport, PeripheralRecord, PresentationSink, ServiceDescriptor, Session,
  WatchConfig,
};

struct ConsoleSink;

impl PresentationSink for ConsoleSink {
  fn on_directory_changed(&mut self, devices: &[PeripheralRecord]) {
    if devices.is_empty() {
      println!("No connected devices");
      return;
    }
    println!("Connected devices found:");
    for device in devices {
      println!("  {} ({})", device.display_name, device.id);
    }
  }

  fn on_selection_cleared(&mut self) {
    println!("No device selected");
  }

  fn on_service_selected(&mut self, service: &ServiceDescriptor) {
    println!("Showing {} on {}", service.handle, service.peripheral);
  }

  fn on_attribute_value_changed(&mut self, value: &AttributeValue) {
    println!("  {}: {}", value.kind, value.display);
  }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
  pretty_env_logger::init();

  let transport = BtleplugTransport::connect().await?;
  let events = transport.watch_services().await?;
  let (session, handle) = Session::new(WatchConfig::default(), Arc::new(transport), Box::new(ConsoleSink));
  let task = tokio::spawn(session.run(events));

  let mut picked = false;
  for _ in 0..60 {
    tokio::time::sleep(Duration::from_secs(1)).await;
    let view = handle.view().await?;
    if !picked {
      if let Some(device) = view.devices.first() {
        handle.pick_peripheral(Some(device.id.clone()))?;
        picked = true;
      }
    }
  }

  drop(handle);
  task.await?;
  Ok(())
}
