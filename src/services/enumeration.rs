use crate::loader::ProgressSink;
use crate::models::DeviceKey;
use crate::services::adb::AdbError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by an [`EnumerationService`]
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("enumeration cancelled")]
    Cancelled,

    #[error("adb path not configured")]
    AdbNotConfigured,

    #[error("failed to list packages: {0}")]
    PackageList(String),

    #[error(transparent)]
    Adb(#[from] AdbError),

    #[error("{0}")]
    Backend(String),
}

/// How the orchestrator treats a failed enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The call was cancelled or its execution context went away; not shown
    Cancellation,

    /// Anything else; surfaced to the user and blanks the cached list
    Transport,
}

impl EnumerationError {
    /// Cancellation-class errors are recognised by variant or, for errors
    /// relayed from elsewhere as text, by their description.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled | Self::Adb(AdbError::Cancelled) => true,
            other => {
                let description = other.to_string().to_lowercase();
                description.contains("cancel") || description.contains("context")
            }
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_cancellation() {
            ErrorClass::Cancellation
        } else {
            ErrorClass::Transport
        }
    }
}

/// Backend that produces the record list for a device.
///
/// Implementations may take arbitrarily long and should report progress
/// through the supplied [`ProgressSink`]. `cancel` is advisory: it asks the
/// running enumeration to stop, and the orchestrator never waits on it.
#[async_trait]
pub trait EnumerationService: Send + Sync {
    type Record: Send + Sync + 'static;

    async fn enumerate(
        &self,
        device: &DeviceKey,
        progress: ProgressSink,
    ) -> Result<Vec<Self::Record>, EnumerationError>;

    async fn cancel(&self) -> Result<(), EnumerationError>;
}
