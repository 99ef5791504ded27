//! Diagnostic document types.
//!
//! The full export combines the runtime snapshot, the error/log buffers,
//! collaborator output (bundles, routes, project metadata) and environment
//! data. Every section has a neutral empty value so a failed collaborator
//! never prevents the document from being produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::OverlayConfig;
use crate::error_log::ErrorLogSnapshot;
use crate::performance::PerformanceSnapshot;
use crate::session::RuntimeSnapshot;

// ============================================================================
// Project metadata & environment
// ============================================================================

/// Opaque key/value bag written into the host project at setup time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub next_version: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub git_sha: Option<String>,
    #[serde(default)]
    pub git_dirty: Option<bool>,
    #[serde(default)]
    pub port: Option<String>,
    /// `version` field of the host's package manifest.
    #[serde(default)]
    pub package_version: Option<String>,
}

impl ProjectMetadata {
    /// Fills unset fields from `other`.
    #[must_use]
    pub fn or(self, other: ProjectMetadata) -> Self {
        Self {
            app_name: self.app_name.or(other.app_name),
            next_version: self.next_version.or(other.next_version),
            git_branch: self.git_branch.or(other.git_branch),
            git_sha: self.git_sha.or(other.git_sha),
            git_dirty: self.git_dirty.or(other.git_dirty),
            port: self.port.or(other.port),
            package_version: self.package_version.or(other.package_version),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitInfo {
    pub branch: Option<String>,
    pub sha: Option<String>,
    pub dirty: Option<bool>,
}

/// Host platform facts captured when the document is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfo {
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub arch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub project_root: PathBuf,
    pub app_name: Option<String>,
    pub package_version: Option<String>,
    pub framework_version: Option<String>,
    pub port: Option<String>,
    pub git: GitInfo,
    pub platform: PlatformInfo,
    pub devlens_version: String,
}

impl EnvironmentInfo {
    pub fn new(project_root: PathBuf, metadata: ProjectMetadata, platform: PlatformInfo) -> Self {
        Self {
            project_root,
            app_name: metadata.app_name,
            package_version: metadata.package_version,
            framework_version: metadata.next_version,
            port: metadata.port,
            git: GitInfo {
                branch: metadata.git_branch,
                sha: metadata.git_sha,
                dirty: metadata.git_dirty,
            },
            platform,
            devlens_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ============================================================================
// Bundles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetTarget {
    Client,
    Server,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleAsset {
    /// Path relative to the build output directory.
    pub name: String,
    pub size: u64,
    pub target: AssetTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleChunk {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBundle {
    pub route: String,
    pub chunks: Vec<String>,
    pub total_size: u64,
}

/// Build output summary; absent when the project has no build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlesSnapshot {
    pub assets: Vec<BundleAsset>,
    pub chunks: Vec<BundleChunk>,
    pub route_mapping: Vec<RouteBundle>,
    pub total_client_size: u64,
    pub total_server_size: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// Routes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    Page,
    RouteHandler,
    Api,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub path: String,
    /// Source file relative to the project root.
    pub file: String,
    pub kind: RouteKind,
}

/// One segment directory of the app router.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteNode {
    pub segment: String,
    pub path: String,
    pub has_page: bool,
    pub has_layout: bool,
    pub has_loading: bool,
    pub has_error: bool,
    pub has_route_handler: bool,
    pub children: Vec<RouteNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesSnapshot {
    pub app_router_tree: Option<RouteNode>,
    pub app_routes: Vec<RouteEntry>,
    pub pages_routes: Vec<RouteEntry>,
}

// ============================================================================
// Document
// ============================================================================

/// The exportable diagnostic dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub generated_at: DateTime<Utc>,
    pub environment: EnvironmentInfo,
    pub config: OverlayConfig,
    pub runtime: RuntimeSnapshot,
    pub errors_and_logs: ErrorLogSnapshot,
    pub bundles: Option<BundlesSnapshot>,
    pub routes: RoutesSnapshot,
    pub performance: PerformanceSnapshot,
}
