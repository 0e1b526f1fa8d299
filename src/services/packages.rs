// Package enumeration over adb
//
// Lists installed packages with `pm list packages -f`, then fetches version
// and install metadata from `dumpsys package` in batches, reporting progress
// after each batch.

use crate::loader::ProgressSink;
use crate::models::{DeckConfig, DeviceKey, PackageInfo};
use crate::services::adb::{AdbClient, AdbError};
use crate::services::enumeration::{EnumerationError, EnumerationService};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Line prefix separating packages in batched dumpsys output
const SECTION_MARKER: &str = "@@pkg ";

/// Metadata parsed from one package's dumpsys section
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackageDetails {
    pub version_name: Option<String>,
    pub version_code: Option<u64>,
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,
    pub first_install_time: Option<String>,
    pub last_update_time: Option<String>,
}

struct Patterns {
    package_line: Regex,
    package_name: Regex,
    version_name: Regex,
    version_code: Regex,
    min_sdk: Regex,
    target_sdk: Regex,
    first_install_time: Regex,
    last_update_time: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            package_line: Regex::new(r"^package:(.+)=([^=\s]+)$")?,
            package_name: Regex::new(r"^[A-Za-z0-9_.]+$")?,
            version_name: Regex::new(r"versionName=(\S+)")?,
            version_code: Regex::new(r"versionCode=(\d+)")?,
            min_sdk: Regex::new(r"minSdk=(\d+)")?,
            target_sdk: Regex::new(r"targetSdk=(\d+)")?,
            first_install_time: Regex::new(r"firstInstallTime=(.+)")?,
            last_update_time: Regex::new(r"lastUpdateTime=(.+)")?,
        })
    }
}

/// [`EnumerationService`] producing the installed packages of a device
///
/// Only one enumeration runs at a time: starting a new one cancels the
/// previous one, and [`cancel`](EnumerationService::cancel) stops whichever is
/// running.
pub struct AdbPackageEnumerator {
    client: AdbClient,
    batch_size: usize,
    /// Id and token of the running enumeration
    current: Mutex<Option<(u64, CancellationToken)>>,
    next_run: AtomicU64,
    patterns: Patterns,
}

impl AdbPackageEnumerator {
    pub fn new(client: AdbClient, batch_size: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            batch_size: batch_size.max(1),
            current: Mutex::new(None),
            next_run: AtomicU64::new(0),
            patterns: Patterns::new()?,
        })
    }

    pub fn from_config(config: &DeckConfig) -> Result<Self, regex::Error> {
        Self::new(AdbClient::from_config(config), config.batch_size)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Parse `pm list packages -f` output into packages without metadata.
    ///
    /// Lines look like `package:/data/app/~~x==/com.example-1/base.apk=com.example`;
    /// the apk path may itself contain `=`, so the package name is whatever
    /// follows the last one.
    pub fn parse_package_list(&self, output: &str) -> Vec<PackageInfo> {
        let mut packages: Vec<PackageInfo> = output
            .lines()
            .filter_map(|line| {
                let caps = self.patterns.package_line.captures(line.trim())?;
                Some(PackageInfo::new(&caps[2], &caps[1]))
            })
            .collect();
        packages.sort_by(|a, b| a.package_name.cmp(&b.package_name));
        packages.dedup_by(|a, b| a.package_name == b.package_name);
        packages
    }

    /// Split batched dumpsys output into per-package details.
    pub fn parse_batch_details(&self, output: &str) -> HashMap<String, PackageDetails> {
        let mut details = HashMap::new();
        let mut current: Option<(String, Vec<&str>)> = None;

        for line in output.lines() {
            if let Some(name) = line.trim().strip_prefix(SECTION_MARKER) {
                if let Some((package, section)) = current.take() {
                    details.insert(package, self.parse_details(&section));
                }
                current = Some((name.trim().to_string(), Vec::new()));
            } else if let Some((_, section)) = current.as_mut() {
                section.push(line);
            }
        }
        if let Some((package, section)) = current {
            details.insert(package, self.parse_details(&section));
        }

        details
    }

    /// Only the first occurrence of each field counts; later ones belong to
    /// hidden system copies of the package.
    fn parse_details(&self, lines: &[&str]) -> PackageDetails {
        let first = |re: &Regex| -> Option<String> {
            lines
                .iter()
                .find_map(|line| re.captures(line).map(|caps| caps[1].trim().to_string()))
        };

        PackageDetails {
            version_name: first(&self.patterns.version_name),
            version_code: first(&self.patterns.version_code).and_then(|v| v.parse().ok()),
            min_sdk: first(&self.patterns.min_sdk).and_then(|v| v.parse().ok()),
            target_sdk: first(&self.patterns.target_sdk).and_then(|v| v.parse().ok()),
            first_install_time: first(&self.patterns.first_install_time),
            last_update_time: first(&self.patterns.last_update_time),
        }
    }

    /// Shell script dumping the interesting lines of each package in `names`.
    pub fn batch_script(&self, names: &[&str]) -> String {
        let safe: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.patterns.package_name.is_match(name))
            .collect();

        format!(
            "for p in {}; do echo \"{}$p\"; dumpsys package $p | grep -E 'versionName=|versionCode=|firstInstallTime=|lastUpdateTime='; done; exit 0",
            safe.join(" "),
            SECTION_MARKER
        )
    }

    /// Install a fresh token for a new enumeration, cancelling the previous one.
    fn begin(&self) -> (u64, CancellationToken) {
        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, previous)) = current.replace((run, token.clone())) {
            if !previous.is_cancelled() {
                tracing::debug!("Cancelling previous package enumeration");
                previous.cancel();
            }
        }
        (run, token)
    }

    /// Forget run `run` if it is still the current one.
    fn finish(&self, run: u64) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|(id, _)| *id == run) {
            *current = None;
        }
    }

    async fn run(
        &self,
        device: &DeviceKey,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageInfo>, EnumerationError> {
        let listing = self
            .client
            .shell(device, "pm list packages -f", cancel)
            .await
            .map_err(|e| match e {
                AdbError::Cancelled => EnumerationError::Cancelled,
                other => EnumerationError::PackageList(other.to_string()),
            })?;

        let listed = self.parse_package_list(&listing);
        tracing::info!(device = %device, "Found {} packages", listed.len());

        let client = &self.client;
        self.collect_details(listed, progress, cancel, move |script| async move {
            client.shell(device, &script, cancel).await
        })
        .await
    }

    /// Fetch metadata for `listed` one batch at a time through `fetch`.
    ///
    /// A batch whose fetch fails is logged and left out of the result.
    /// Cancellation is checked before every batch and once more before the
    /// completion snapshot.
    async fn collect_details<F, Fut>(
        &self,
        listed: Vec<PackageInfo>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
        mut fetch: F,
    ) -> Result<Vec<PackageInfo>, EnumerationError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<String, AdbError>>,
    {
        let total = listed.len() as u64;
        let mut loaded = Vec::with_capacity(listed.len());
        let mut remaining = listed.into_iter();
        let mut start = 0usize;
        progress.report(0, total, false);

        loop {
            let batch: Vec<PackageInfo> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                return Err(EnumerationError::Cancelled);
            }

            let end = start + batch.len();
            tracing::debug!("Fetching batch {}-{} of {}", start + 1, end, total);

            let script = {
                let names: Vec<&str> = batch.iter().map(|p| p.package_name.as_str()).collect();
                self.batch_script(&names)
            };
            match fetch(script).await {
                Ok(output) => {
                    let mut details = self.parse_batch_details(&output);
                    loaded.extend(batch.into_iter().map(|mut package| {
                        if let Some(found) = details.remove(&package.package_name) {
                            apply_details(&mut package, found);
                        }
                        package
                    }));
                    progress.report(loaded.len() as u64, total, false);
                }
                Err(AdbError::Cancelled) => return Err(EnumerationError::Cancelled),
                Err(_) if cancel.is_cancelled() => return Err(EnumerationError::Cancelled),
                Err(e) => tracing::warn!("Failed to get batch {}-{}: {}", start + 1, end, e),
            }

            start = end;
        }

        if cancel.is_cancelled() {
            return Err(EnumerationError::Cancelled);
        }

        tracing::info!("Completed: {}/{} packages loaded", loaded.len(), total);
        progress.report(loaded.len() as u64, total, true);
        Ok(loaded)
    }
}

fn apply_details(package: &mut PackageInfo, details: PackageDetails) {
    package.version_name = details.version_name;
    package.version_code = details.version_code;
    package.min_sdk = details.min_sdk;
    package.target_sdk = details.target_sdk;
    package.first_install_time = details.first_install_time;
    package.last_update_time = details.last_update_time;
}

#[async_trait]
impl EnumerationService for AdbPackageEnumerator {
    type Record = PackageInfo;

    async fn enumerate(
        &self,
        device: &DeviceKey,
        progress: ProgressSink,
    ) -> Result<Vec<PackageInfo>, EnumerationError> {
        if !self.client.is_configured() {
            return Err(EnumerationError::AdbNotConfigured);
        }

        let (run, cancel) = self.begin();
        let result = self.run(device, &progress, &cancel).await;
        self.finish(run);
        result
    }

    async fn cancel(&self) -> Result<(), EnumerationError> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, token)) = current.as_ref() {
            tracing::info!("Cancelling package enumeration");
            token.cancel();
        }
        Ok(())
    }
}
