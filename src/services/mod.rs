//! Services module - adb-facing backends.
//!
//! Everything here talks to the `adb` executable and knows nothing about
//! caching or visible state; the [`loader`](crate::loader) decides what to do
//! with the results.
//!
//! # Components
//!
//! - [`AdbClient`]: runs adb commands with timeout and cancellation, killing
//!   the subprocess when a call is abandoned
//! - [`EnumerationService`]: the backend seam of the loader, with
//!   [`EnumerationError`] and its cancellation/transport classification
//! - [`AdbPackageEnumerator`]: lists installed packages and their version
//!   metadata, in batches with progress
//! - [`DeviceTracker`]: follows `adb track-devices` and feeds the
//!   [`DeviceSelection`](crate::selection::DeviceSelection)
//!
//! # Usage Example
//!
//! ```ignore
//! use adbdeck::services::{AdbPackageEnumerator, EnumerationService};
//!
//! let enumerator = AdbPackageEnumerator::from_config(&config)?;
//! let packages = enumerator
//!     .enumerate(&DeviceKey::single_device(), ProgressSink::detached())
//!     .await?;
//! ```

pub mod adb;
pub mod device_tracker;
pub mod enumeration;
pub mod packages;

pub use adb::{AdbClient, AdbError};
pub use device_tracker::{DeviceTracker, TrackerError};
pub use enumeration::{EnumerationError, EnumerationService, ErrorClass};
pub use packages::{AdbPackageEnumerator, PackageDetails};
