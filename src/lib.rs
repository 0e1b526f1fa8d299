// adbdeck - Android device console
//
// This is the library crate containing the package-list loader, the adb
// backends and the device selection source.
// The binary crate (main.rs) provides the console entry point.

pub mod config;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod selection;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use loader::{LoadOrchestrator, LoadTicket, LoadView, ProgressChannel, SessionStatus};
pub use models::{DeckConfig, DeviceInfo, DeviceKey, PackageInfo, ViewState};
pub use selection::DeviceSelection;
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
