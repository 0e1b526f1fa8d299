use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key used when the console is not distinguishing between devices.
const SINGLE_DEVICE_LABEL: &str = "_default_";

/// Stable identifier for a device.
///
/// The empty key stands for single-device mode: with exactly one device
/// attached, adb commands are issued without `-s <serial>` and results are
/// cached under this key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The key used when only one device is attached.
    pub fn single_device() -> Self {
        Self::default()
    }

    pub fn is_single_device(&self) -> bool {
        self.0.is_empty()
    }

    /// Serial to pass to `adb -s`, or `None` in single-device mode.
    pub fn serial(&self) -> Option<&str> {
        if self.0.is_empty() {
            None
        } else {
            Some(&self.0)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(SINGLE_DEVICE_LABEL)
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for DeviceKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceKey {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A connected device as reported by the device tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
