//! Project metadata and host platform facts.

use std::fs;
use std::path::Path;

use devlens_core::{PlatformInfo, ProjectMetadata};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sysinfo::System;

use super::{CollectorError, MetadataSource};

/// Metadata bag written by the setup step, relative to the project root.
pub const METADATA_FILE: &str = ".devlens/metadata.json";

const PACKAGE_MANIFEST: &str = "package.json";
const FRAMEWORK_PACKAGE: &str = "next";

/// Reads `.devlens/metadata.json` and fills gaps from `package.json`.
///
/// Missing files are not an error; unparseable ones are.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectMetadataFile;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: serde_json::Map<String, serde_json::Value>,
}

impl PackageManifest {
    fn framework_version(&self) -> Option<String> {
        self.dependencies
            .get(FRAMEWORK_PACKAGE)
            .or_else(|| self.dev_dependencies.get(FRAMEWORK_PACKAGE))
            .and_then(serde_json::Value::as_str)
            .map(|v| v.trim_start_matches(&['^', '~', '='][..]).to_string())
    }
}

impl MetadataSource for ProjectMetadataFile {
    fn load(&self, project_root: &Path) -> Result<ProjectMetadata, CollectorError> {
        let injected: ProjectMetadata =
            read_json(&project_root.join(METADATA_FILE))?.unwrap_or_default();
        let manifest: PackageManifest =
            read_json(&project_root.join(PACKAGE_MANIFEST))?.unwrap_or_default();

        let from_manifest = ProjectMetadata {
            app_name: manifest.name.clone(),
            next_version: manifest.framework_version(),
            package_version: manifest.version.clone(),
            ..Default::default()
        };
        Ok(injected.or(from_manifest))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CollectorError> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| CollectorError::io(path, e))?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| CollectorError::parse(path, e))
}

/// Host operating system facts.
pub fn platform_info() -> PlatformInfo {
    PlatformInfo {
        os: System::name(),
        os_version: System::os_version(),
        kernel_version: System::kernel_version(),
        arch: std::env::consts::ARCH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_yield_empty_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = ProjectMetadataFile.load(dir.path()).unwrap();
        assert_eq!(metadata, ProjectMetadata::default());
    }

    #[test]
    fn test_injected_metadata_wins_over_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".devlens")).unwrap();
        fs::write(
            dir.path().join(METADATA_FILE),
            r#"{"appName":"shop","gitBranch":"main","gitSha":"abc123","port":"3000"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(PACKAGE_MANIFEST),
            r#"{"name":"shop-web","version":"2.1.0","dependencies":{"next":"^14.2.3","react":"18.3.1"}}"#,
        )
        .unwrap();

        let metadata = ProjectMetadataFile.load(dir.path()).unwrap();
        assert_eq!(metadata.app_name.as_deref(), Some("shop"));
        assert_eq!(metadata.package_version.as_deref(), Some("2.1.0"));
        assert_eq!(metadata.next_version.as_deref(), Some("14.2.3"));
        assert_eq!(metadata.git_branch.as_deref(), Some("main"));
        assert_eq!(metadata.port.as_deref(), Some("3000"));
    }

    #[test]
    fn test_invalid_manifest_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PACKAGE_MANIFEST), "{").unwrap();
        assert!(matches!(
            ProjectMetadataFile.load(dir.path()),
            Err(CollectorError::Parse { .. })
        ));
    }

    #[test]
    fn test_platform_info_has_arch() {
        assert!(!platform_info().arch.is_empty());
    }
}
