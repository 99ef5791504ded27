//! Diagnostics snapshot assembly.
//!
//! Combines the store snapshots with collaborator output (build output scan,
//! route enumeration, project metadata) and host platform facts into one
//! exportable [`DiagnosticSnapshot`].
//!
//! # Async Safety
//!
//! Collaborators do blocking filesystem work and run via `spawn_blocking`.
//! A collaborator that errors or panics is logged and its section falls back
//! to the neutral value; it never fails the whole document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use devlens_core::{
    BundlesSnapshot, DiagnosticSnapshot, EnvironmentInfo, OverlayConfig, PerformanceSnapshot,
    ProjectMetadata, RoutesSnapshot,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{StoreError, StoreHandle};

mod bundles;
mod metadata;
mod routes;

pub use bundles::{BuildOutputScanner, DEFAULT_BUILD_DIR};
pub use metadata::{platform_info, ProjectMetadataFile, METADATA_FILE};
pub use routes::FsRouteEnumerator;

// ============================================================================
// Error Types
// ============================================================================

/// Errors a collaborator can report.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl CollectorError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Summarizes the host's build output.
pub trait BundleScanner: Send + Sync + 'static {
    /// `Ok(None)` when the project has no build output.
    fn scan(&self, project_root: &Path) -> Result<Option<BundlesSnapshot>, CollectorError>;
}

/// Enumerates the host's file-based routes.
pub trait RouteEnumerator: Send + Sync + 'static {
    fn enumerate(&self, project_root: &Path) -> Result<RoutesSnapshot, CollectorError>;
}

/// Loads the project metadata bag.
pub trait MetadataSource: Send + Sync + 'static {
    fn load(&self, project_root: &Path) -> Result<ProjectMetadata, CollectorError>;
}

// ============================================================================
// Assembler
// ============================================================================

/// Builds diagnostic documents on demand.
#[derive(Clone)]
pub struct DiagnosticsAssembler {
    store: StoreHandle,
    config: OverlayConfig,
    project_root: PathBuf,
    bundles: Arc<dyn BundleScanner>,
    routes: Arc<dyn RouteEnumerator>,
    metadata: Arc<dyn MetadataSource>,
}

impl DiagnosticsAssembler {
    /// Creates an assembler with the filesystem collaborators.
    pub fn new(store: StoreHandle, config: OverlayConfig, project_root: PathBuf) -> Self {
        Self {
            store,
            config,
            project_root,
            bundles: Arc::new(BuildOutputScanner::default()),
            routes: Arc::new(FsRouteEnumerator),
            metadata: Arc::new(ProjectMetadataFile),
        }
    }

    #[must_use]
    pub fn with_bundle_scanner(mut self, scanner: impl BundleScanner) -> Self {
        self.bundles = Arc::new(scanner);
        self
    }

    #[must_use]
    pub fn with_route_enumerator(mut self, enumerator: impl RouteEnumerator) -> Self {
        self.routes = Arc::new(enumerator);
        self
    }

    #[must_use]
    pub fn with_metadata_source(mut self, source: impl MetadataSource) -> Self {
        self.metadata = Arc::new(source);
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Assembles the full document for `project_root` (or the default root).
    ///
    /// # Errors
    ///
    /// Only `StoreError::ChannelClosed`; collaborator failures degrade to
    /// empty sections.
    pub async fn build_snapshot(
        &self,
        project_root: Option<&Path>,
    ) -> Result<DiagnosticSnapshot, StoreError> {
        let root = project_root.unwrap_or(&self.project_root).to_path_buf();
        debug!(root = %root.display(), "Assembling diagnostics");

        let (runtime, errors_and_logs) = self.store.snapshots().await?;

        let bundles_source = Arc::clone(&self.bundles);
        let routes_source = Arc::clone(&self.routes);
        let metadata_source = Arc::clone(&self.metadata);
        let (bundles, routes, metadata, platform) = tokio::join!(
            collect("bundles", root.clone(), move |r| bundles_source.scan(r)),
            collect("routes", root.clone(), move |r| routes_source.enumerate(r)),
            collect("metadata", root.clone(), move |r| metadata_source.load(r)),
            collect("platform", root.clone(), |_| Ok(platform_info())),
        );

        let performance = PerformanceSnapshot::from_runtime(&runtime);

        Ok(DiagnosticSnapshot {
            generated_at: Utc::now(),
            environment: EnvironmentInfo::new(
                root,
                metadata.unwrap_or_default(),
                platform.unwrap_or_default(),
            ),
            config: self.config.clone(),
            runtime,
            errors_and_logs,
            bundles: bundles.flatten(),
            routes: routes.unwrap_or_else(RoutesSnapshot::default),
            performance,
        })
    }

    /// Runs the bundle scanner alone.
    pub async fn scan_bundles(&self, project_root: Option<&Path>) -> Option<BundlesSnapshot> {
        let root = project_root.unwrap_or(&self.project_root).to_path_buf();
        let source = Arc::clone(&self.bundles);
        collect("bundles", root, move |r| source.scan(r))
            .await
            .flatten()
    }
}

/// Runs one collaborator on the blocking pool. `None` on error or panic.
async fn collect<T, F>(name: &'static str, root: PathBuf, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> Result<T, CollectorError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&root)).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(collector = name, error = %e, "Collector failed, using empty section");
            None
        }
        Err(e) => {
            warn!(collector = name, error = %e, "Collector task panicked, using empty section");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{spawn_store, StoreLimits};
    use devlens_core::RouteEntry;

    struct FailingRoutes;

    impl RouteEnumerator for FailingRoutes {
        fn enumerate(&self, project_root: &Path) -> Result<RoutesSnapshot, CollectorError> {
            Err(CollectorError::parse(project_root, "corrupt route table"))
        }
    }

    struct PanickingBundles;

    impl BundleScanner for PanickingBundles {
        fn scan(&self, _: &Path) -> Result<Option<BundlesSnapshot>, CollectorError> {
            panic!("scanner bug")
        }
    }

    struct FixedRoutes;

    impl RouteEnumerator for FixedRoutes {
        fn enumerate(&self, _: &Path) -> Result<RoutesSnapshot, CollectorError> {
            Ok(RoutesSnapshot {
                app_router_tree: None,
                app_routes: vec![RouteEntry {
                    path: "/".to_string(),
                    file: "app/page.tsx".to_string(),
                    kind: devlens_core::RouteKind::Page,
                }],
                pages_routes: Vec::new(),
            })
        }
    }

    struct FixedMetadata;

    impl MetadataSource for FixedMetadata {
        fn load(&self, _: &Path) -> Result<ProjectMetadata, CollectorError> {
            Ok(ProjectMetadata {
                app_name: Some("storefront".to_string()),
                next_version: Some("14.2.3".to_string()),
                ..Default::default()
            })
        }
    }

    fn assembler() -> DiagnosticsAssembler {
        let store = spawn_store(StoreLimits::default());
        DiagnosticsAssembler::new(store, OverlayConfig::default(), PathBuf::from("/nonexistent"))
    }

    #[tokio::test]
    async fn test_failing_collaborators_degrade_to_empty() {
        let assembler = assembler()
            .with_route_enumerator(FailingRoutes)
            .with_bundle_scanner(PanickingBundles);

        let snapshot = assembler.build_snapshot(None).await.unwrap();
        assert_eq!(snapshot.routes, RoutesSnapshot::default());
        assert!(snapshot.bundles.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_uses_collaborators_and_store() {
        let assembler = assembler()
            .with_route_enumerator(FixedRoutes)
            .with_metadata_source(FixedMetadata);
        assembler.store.begin_session("/").await.unwrap();

        let snapshot = assembler.build_snapshot(None).await.unwrap();
        assert_eq!(snapshot.routes.app_routes.len(), 1);
        assert_eq!(snapshot.environment.app_name.as_deref(), Some("storefront"));
        assert_eq!(snapshot.environment.framework_version.as_deref(), Some("14.2.3"));
        assert_eq!(snapshot.runtime.sessions.len(), 1);
        assert_eq!(snapshot.performance.sessions.len(), 1);
        assert!(snapshot.config.enabled);
    }

    #[tokio::test]
    async fn test_project_root_override() {
        let assembler = assembler();
        let snapshot = assembler
            .build_snapshot(Some(Path::new("/elsewhere")))
            .await
            .unwrap();
        assert_eq!(snapshot.environment.project_root, PathBuf::from("/elsewhere"));
    }
}
