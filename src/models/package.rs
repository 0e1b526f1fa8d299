use serde::{Deserialize, Serialize};

/// Install locations that mark a package as part of the system image.
const SYSTEM_PREFIXES: [&str; 4] = ["/system", "/product", "/vendor", "/apex"];

/// Metadata for one installed package.
///
/// Everything except the name and APK path is best-effort: it comes from
/// `dumpsys package`, whose output varies between Android releases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub package_name: String,
    pub apk_path: String,
    pub system: bool,
    pub version_name: Option<String>,
    pub version_code: Option<u64>,
    pub min_sdk: Option<u32>,
    pub target_sdk: Option<u32>,
    pub first_install_time: Option<String>,
    pub last_update_time: Option<String>,
}

impl PackageInfo {
    /// Create a record from a `pm list packages -f` entry.
    pub fn new(package_name: impl Into<String>, apk_path: impl Into<String>) -> Self {
        let apk_path = apk_path.into();
        Self {
            package_name: package_name.into(),
            system: is_system_path(&apk_path),
            apk_path,
            ..Self::default()
        }
    }
}

/// Whether an APK path lives on one of the read-only system partitions.
pub fn is_system_path(apk_path: &str) -> bool {
    SYSTEM_PREFIXES
        .iter()
        .any(|prefix| apk_path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_detection() {
        assert!(PackageInfo::new("com.android.settings", "/system/priv-app/Settings/Settings.apk").system);
        assert!(PackageInfo::new("com.google.android.gms", "/product/priv-app/Gms/Gms.apk").system);
        assert!(!PackageInfo::new("org.example.app", "/data/app/~~abc/org.example.app-1/base.apk").system);
    }

    #[test]
    fn test_new_leaves_metadata_empty() {
        let info = PackageInfo::new("org.example.app", "/data/app/base.apk");
        assert_eq!(info.version_name, None);
        assert_eq!(info.version_code, None);
    }
}
