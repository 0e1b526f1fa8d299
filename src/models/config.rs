use serde::{Deserialize, Serialize};

/// Settings from `adbdeck.yaml`, overridable through `ADBDECK_*` environment
/// variables (see [`crate::config::ConfigManager`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckConfig {
    /// adb executable, either a bare name resolved via `PATH` or a full path
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    /// Packages per `dumpsys` invocation; progress is reported per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Quiet period before a device-list change reaches the selection source
    #[serde(default = "default_device_debounce_ms")]
    pub device_debounce_ms: u64,

    #[serde(default = "default_tracker_reconnect_secs")]
    pub tracker_reconnect_secs: u64,

    /// Delay before retrying the model-name lookup of a device that is still authorizing
    #[serde(default = "default_name_retry_delay_ms")]
    pub name_retry_delay_ms: u64,

    /// Buffer size of the progress broadcast channel
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub debug_mode: bool,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            batch_size: default_batch_size(),
            command_timeout_secs: default_command_timeout_secs(),
            device_debounce_ms: default_device_debounce_ms(),
            tracker_reconnect_secs: default_tracker_reconnect_secs(),
            name_retry_delay_ms: default_name_retry_delay_ms(),
            progress_capacity: default_progress_capacity(),
            log_dir: default_log_dir(),
            debug_mode: false,
        }
    }
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_command_timeout_secs() -> u64 {
    60
}

fn default_device_debounce_ms() -> u64 {
    500
}

fn default_tracker_reconnect_secs() -> u64 {
    3
}

fn default_name_retry_delay_ms() -> u64 {
    1500
}

fn default_progress_capacity() -> usize {
    64
}

fn default_log_dir() -> String {
    "logs".to_string()
}
