#[cfg(feature = "plugin")]
const COMMANDS: &[&str] = &["get_view", "select_device"];

fn main() {
  println!("cargo:rustc-check-cfg=cfg(desktop)");
  println!("cargo:rustc-check-cfg=cfg(mobile)");
  #[cfg(feature = "plugin")]
  tauri_plugin::Builder::new(COMMANDS).build();
}
