// Device tracker
//
// Follows `adb track-devices`, resolves model names for new devices and feeds
// the debounced device list into the selection source. Reconnects when the
// adb server connection drops.

use crate::models::{DeckConfig, DeviceInfo};
use crate::selection::DeviceSelection;
use crate::services::adb::{AdbClient, AdbError};
use indexmap::IndexMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Device states that mean the model name cannot be read yet
const NOT_READY_MARKERS: [&str; 3] = ["authorizing", "unauthorized", "offline"];

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("invalid frame length '{0}'")]
    InvalidLength(String),

    #[error("track-devices stream closed: {0}")]
    Io(#[from] std::io::Error),

    #[error("track-devices has no stdout")]
    MissingStdout,

    #[error(transparent)]
    Adb(#[from] AdbError),
}

/// Read one `track-devices` frame: four hex digits of payload length, then
/// the payload. A zero length yields an empty payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<String, TrackerError>
where
    R: AsyncRead + Unpin,
{
    let mut length_bytes = [0u8; 4];
    reader.read_exact(&mut length_bytes).await?;

    let length_text = String::from_utf8_lossy(&length_bytes).into_owned();
    let length = usize::from_str_radix(&length_text, 16)
        .map_err(|_| TrackerError::InvalidLength(length_text.clone()))?;

    if length == 0 {
        return Ok(String::new());
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(String::from_utf8_lossy(&payload).into_owned())
}

/// Serials of the usable devices in a `track-devices` payload.
///
/// Each line is `<serial>\t<state>`; headers, blank lines, unauthorized
/// devices and lines without exactly two fields are skipped.
pub fn parse_device_list(payload: &str) -> Vec<String> {
    payload
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains("List of devices") && !line.contains("unauthorized"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [serial, _state] => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Whether a `getprop ro.product.model` answer is a real model name.
pub fn is_usable_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && !NOT_READY_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Long-running `adb track-devices` follower
pub struct DeviceTracker {
    client: AdbClient,
    selection: DeviceSelection,
    debounce: Duration,
    reconnect_delay: Duration,
    name_retry_delay: Duration,
    /// Resolved model names by serial
    known_names: IndexMap<String, String>,
}

impl DeviceTracker {
    pub fn new(client: AdbClient, selection: DeviceSelection, config: &DeckConfig) -> Self {
        Self {
            client,
            selection,
            debounce: Duration::from_millis(config.device_debounce_ms),
            reconnect_delay: Duration::from_secs(config.tracker_reconnect_secs),
            name_retry_delay: Duration::from_millis(config.name_retry_delay_ms),
            known_names: IndexMap::new(),
        }
    }

    /// Track devices until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Device tracker started");

        let (list_tx, list_rx) = watch::channel(None);
        let publisher = tokio::spawn(publish_debounced(list_rx, self.selection.clone(), self.debounce));

        loop {
            if cancel.is_cancelled() {
                break;
            }

            tracing::debug!("Starting adb track-devices connection");
            if let Err(e) = self.run_connection(&list_tx, &cancel).await {
                tracing::warn!("Device tracking interrupted: {}", e);
            }
            if cancel.is_cancelled() {
                break;
            }

            tracing::info!(
                "Lost adb connection, clearing device list and reconnecting in {:?}",
                self.reconnect_delay
            );
            list_tx.send_replace(Some(Vec::new()));

            tokio::select! {
                () = tokio::time::sleep(self.reconnect_delay) => {}
                () = cancel.cancelled() => break,
            }
        }

        drop(list_tx);
        if let Err(e) = publisher.await {
            tracing::debug!("Device list publisher ended abnormally: {}", e);
        }
        tracing::info!("Device tracker stopped");
    }

    async fn run_connection(
        &mut self,
        list_tx: &watch::Sender<Option<Vec<DeviceInfo>>>,
        cancel: &CancellationToken,
    ) -> Result<(), TrackerError> {
        let mut child = self.client.spawn_track_devices()?;
        let mut stdout = child.stdout.take().ok_or(TrackerError::MissingStdout)?;

        loop {
            let frame = tokio::select! {
                frame = read_frame(&mut stdout) => frame,
                () = cancel.cancelled() => return Ok(()),
            };

            match frame {
                Ok(payload) => {
                    let serials = parse_device_list(&payload);
                    tracing::debug!("Device list update: {:?}", serials);
                    let devices = self.resolve_devices(&serials, cancel).await;
                    list_tx.send_replace(Some(devices));
                }
                Err(TrackerError::InvalidLength(length)) => {
                    tracing::warn!("Skipping frame with invalid length '{}'", length);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attach model names, reusing names resolved earlier. Devices whose
    /// name cannot be read even after one retry are left out.
    async fn resolve_devices(&mut self, serials: &[String], cancel: &CancellationToken) -> Vec<DeviceInfo> {
        let mut devices = Vec::with_capacity(serials.len());

        for serial in serials {
            if let Some(name) = self.known_names.get(serial) {
                devices.push(DeviceInfo::new(serial.as_str(), name.as_str()));
                continue;
            }

            let mut name = self.lookup_name(serial, cancel).await;
            if !is_usable_name(&name) {
                tracing::debug!("Device {} not ready ({}), retrying name lookup", serial, name);
                tokio::select! {
                    () = tokio::time::sleep(self.name_retry_delay) => {}
                    () = cancel.cancelled() => return devices,
                }
                name = self.lookup_name(serial, cancel).await;
            }

            if is_usable_name(&name) {
                let name = name.trim().to_string();
                tracing::info!("Device connected: {} ({})", name, serial);
                self.known_names.insert(serial.clone(), name.clone());
                devices.push(DeviceInfo::new(serial.as_str(), name));
            } else {
                tracing::warn!("Could not resolve name of device {}, leaving it out", serial);
            }
        }

        devices
    }

    /// Failures come back as their message so readiness markers in adb's
    /// error output (e.g. "device unauthorized") are recognised.
    async fn lookup_name(&self, serial: &str, cancel: &CancellationToken) -> String {
        match self.client.device_model(serial, cancel).await {
            Ok(name) => name,
            Err(e) => e.to_string(),
        }
    }
}

/// Forward the latest device list after it has been quiet for `debounce`.
async fn publish_debounced(
    mut rx: watch::Receiver<Option<Vec<DeviceInfo>>>,
    selection: DeviceSelection,
    debounce: Duration,
) {
    while rx.changed().await.is_ok() {
        loop {
            tokio::select! {
                () = tokio::time::sleep(debounce) => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let latest = rx.borrow_and_update().clone();
        if let Some(devices) = latest {
            tracing::debug!("Publishing {} devices", devices.len());
            selection.set_devices(devices);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_frame() {
        let mut reader = Builder::new()
            .read(b"0016")
            .read(b"emulator-5554\tdevice\n\n")
            .build();

        let payload = read_frame(&mut reader).await.unwrap();
        assert_eq!(payload, "emulator-5554\tdevice\n\n");
    }

    #[tokio::test]
    async fn test_read_empty_frame() {
        let mut reader = Builder::new().read(b"0000").build();
        assert_eq!(read_frame(&mut reader).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_read_frame_split_across_reads() {
        let mut reader = Builder::new().read(b"00").read(b"05ab").read(b"cde").build();
        assert_eq!(read_frame(&mut reader).await.unwrap(), "abcde");
    }

    #[tokio::test]
    async fn test_invalid_length() {
        let mut reader = Builder::new().read(b"zzzz").build();
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidLength(ref l) if l == "zzzz"));
    }

    #[tokio::test]
    async fn test_truncated_payload() {
        let mut reader = Builder::new().read(b"0010").read(b"short").build();
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, TrackerError::Io(_)));
    }

    #[test]
    fn test_parse_device_list() {
        let payload = "List of devices attached\n\
                       emulator-5554\tdevice\n\
                       \n\
                       R58M12345\tunauthorized\n\
                       192.168.1.20:5555\tdevice\n\
                       weird line with many fields\n";

        assert_eq!(
            parse_device_list(payload),
            vec!["emulator-5554".to_string(), "192.168.1.20:5555".to_string()]
        );
    }

    #[test]
    fn test_usable_names() {
        assert!(is_usable_name("Pixel 7"));
        assert!(!is_usable_name("  "));
        assert!(!is_usable_name("error: device offline"));
        assert!(!is_usable_name("adb: device unauthorized."));
        assert!(!is_usable_name("device still authorizing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_publish_keeps_latest() {
        let selection = DeviceSelection::new();
        let (tx, rx) = watch::channel(None);
        let publisher = tokio::spawn(publish_debounced(rx, selection.clone(), Duration::from_millis(500)));

        tx.send_replace(Some(vec![DeviceInfo::new("a", "A")]));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send_replace(Some(vec![DeviceInfo::new("a", "A"), DeviceInfo::new("b", "B")]));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(selection.devices().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(selection.devices().len(), 2);

        drop(tx);
        publisher.await.unwrap();
    }
}
