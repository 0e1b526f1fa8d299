use crate::models::{DeckConfig, DeviceKey};
use camino::{Utf8Path, Utf8PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Errors from running an adb subprocess
#[derive(Error, Debug)]
pub enum AdbError {
    #[error("failed to spawn adb: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("adb timed out after {0:?}")]
    Timeout(Duration),

    #[error("adb command cancelled")]
    Cancelled,

    #[error("adb exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("adb output unavailable: {0}")]
    Io(#[from] std::io::Error),
}

/// Thin async wrapper around the adb executable.
///
/// Every command runs with `kill_on_drop`, so cancelling or timing out a call
/// also kills the subprocess.
#[derive(Debug, Clone)]
pub struct AdbClient {
    adb_path: Utf8PathBuf,
    command_timeout: Duration,
}

impl AdbClient {
    pub fn new(adb_path: impl Into<Utf8PathBuf>, command_timeout: Duration) -> Self {
        Self {
            adb_path: adb_path.into(),
            command_timeout,
        }
    }

    pub fn from_config(config: &DeckConfig) -> Self {
        Self::new(
            config.adb_path.as_str(),
            Duration::from_secs(config.command_timeout_secs),
        )
    }

    pub fn adb_path(&self) -> &Utf8Path {
        &self.adb_path
    }

    pub fn is_configured(&self) -> bool {
        !self.adb_path.as_str().trim().is_empty()
    }

    /// Arguments for `adb [-s serial] <args...>`
    pub fn device_args(device: &DeviceKey, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = device.serial() {
            full.push("-s".to_string());
            full.push(serial.to_string());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    /// Arguments for `adb [-s serial] shell <command>`
    pub fn shell_args(device: &DeviceKey, command: &str) -> Vec<String> {
        Self::device_args(device, &["shell", command])
    }

    /// Run adb with `args` and return its stdout.
    pub async fn run(&self, args: &[String], cancel: &CancellationToken) -> Result<String, AdbError> {
        tracing::debug!("Executing: {} {}", self.adb_path, args.join(" "));

        let start = Instant::now();

        let output = Command::new(self.adb_path.as_std_path())
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = timeout(self.command_timeout, output) => {
                result
                    .map_err(|_| {
                        tracing::warn!("adb timed out after {:?}", self.command_timeout);
                        AdbError::Timeout(self.command_timeout)
                    })?
                    .map_err(AdbError::Spawn)?
            }
            () = cancel.cancelled() => {
                tracing::debug!("adb command cancelled: {}", args.join(" "));
                return Err(AdbError::Cancelled);
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        tracing::trace!(
            "adb completed in {:.2}s with exit code {}",
            start.elapsed().as_secs_f32(),
            exit_code
        );

        if !output.status.success() {
            return Err(AdbError::Failed {
                code: exit_code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a shell command on `device`.
    pub async fn shell(
        &self,
        device: &DeviceKey,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AdbError> {
        self.run(&Self::shell_args(device, command), cancel).await
    }

    /// Model name of a device, as shown in the device picker.
    pub async fn device_model(&self, serial: &str, cancel: &CancellationToken) -> Result<String, AdbError> {
        let output = self
            .shell(&DeviceKey::new(serial), "getprop ro.product.model", cancel)
            .await?;
        Ok(output.trim().to_string())
    }

    /// Start a long-running `adb track-devices` process with stdout piped.
    pub fn spawn_track_devices(&self) -> Result<Child, AdbError> {
        Command::new(self.adb_path.as_std_path())
            .arg("track-devices")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(AdbError::Spawn)
    }
}
