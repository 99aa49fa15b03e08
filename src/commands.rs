use tauri::{command, AppHandle, Runtime};

use crate::models::*;
use crate::{DeviceInfoExt, Result};

#[command]
pub(crate) async fn get_view<R: Runtime>(app: AppHandle<R>) -> Result<SessionView> {
    app.device_info().get_view().await
}

#[command]
pub(crate) async fn select_device<R: Runtime>(app: AppHandle<R>, request: SelectDeviceRequest) -> Result<()> {
    app.device_info().select_device(request).await
}

pub(crate) fn handlers<R: Runtime>() -> impl Fn(tauri::ipc::Invoke<R>) -> bool {
    tauri::generate_handler![get_view, select_device]
}
