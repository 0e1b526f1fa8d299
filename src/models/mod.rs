//! Data models for adbdeck.
//!
//! - [`DeviceKey`] / [`DeviceInfo`]: device identity and connected-device records
//! - [`PackageInfo`]: one installed package, the record type of the package list
//! - [`ProgressSnapshot`]: progress report of an in-flight enumeration
//! - [`ViewState`]: what the presentation layer shows (results, loading, progress, error)
//! - [`DeckConfig`]: settings loaded from `adbdeck.yaml`
//!
//! Config and record types derive `Serialize`/`Deserialize`; `ViewState` is
//! wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager).

pub mod config;
pub mod device;
pub mod package;
pub mod progress;
pub mod view_state;

pub use config::DeckConfig;
pub use device::{DeviceInfo, DeviceKey};
pub use package::PackageInfo;
pub use progress::ProgressSnapshot;
pub use view_state::ViewState;
