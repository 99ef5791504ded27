//! Build output scanning.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use devlens_core::{AssetTarget, BundleAsset, BundleChunk, BundlesSnapshot, RouteBundle};
use serde::Deserialize;
use tracing::debug;

use super::{BundleScanner, CollectorError};

/// Build output directory name inside the project root.
pub const DEFAULT_BUILD_DIR: &str = ".next";

const APP_BUILD_MANIFEST: &str = "app-build-manifest.json";

/// Scans `<root>/.next` for JavaScript assets.
///
/// `static/` holds client assets (chunks live in `static/chunks/`),
/// `server/` holds server assets. The route mapping comes from the app
/// build manifest when present.
#[derive(Debug, Clone)]
pub struct BuildOutputScanner {
    build_dir: String,
}

impl BuildOutputScanner {
    pub fn new(build_dir: impl Into<String>) -> Self {
        Self {
            build_dir: build_dir.into(),
        }
    }
}

impl Default for BuildOutputScanner {
    fn default() -> Self {
        Self::new(DEFAULT_BUILD_DIR)
    }
}

#[derive(Debug, Deserialize)]
struct AppBuildManifest {
    #[serde(default)]
    pages: BTreeMap<String, Vec<String>>,
}

impl BundleScanner for BuildOutputScanner {
    fn scan(&self, project_root: &Path) -> Result<Option<BundlesSnapshot>, CollectorError> {
        let build = project_root.join(&self.build_dir);
        if !build.is_dir() {
            debug!(path = %build.display(), "No build output");
            return Ok(None);
        }

        let mut assets = Vec::new();
        for (dir, target) in [("static", AssetTarget::Client), ("server", AssetTarget::Server)] {
            let mut files = Vec::new();
            collect_js_files(&build.join(dir), &mut files)?;
            for (path, size) in files {
                assets.push(BundleAsset {
                    name: relative_name(&build, &path),
                    size,
                    target,
                });
            }
        }
        assets.sort_by(|a, b| a.name.cmp(&b.name));

        let chunks: Vec<BundleChunk> = assets
            .iter()
            .filter(|a| a.target == AssetTarget::Client && a.name.starts_with("static/chunks/"))
            .map(|a| BundleChunk {
                name: a.name.clone(),
                size: a.size,
            })
            .collect();

        let sizes: HashMap<&str, u64> = assets.iter().map(|a| (a.name.as_str(), a.size)).collect();
        let route_mapping = read_route_mapping(&build.join(APP_BUILD_MANIFEST), &sizes)?;

        let total = |target| {
            assets
                .iter()
                .filter(|a| a.target == target)
                .map(|a| a.size)
                .sum::<u64>()
        };
        let total_client_size = total(AssetTarget::Client);
        let total_server_size = total(AssetTarget::Server);

        debug!(
            assets = assets.len(),
            routes = route_mapping.len(),
            total_client_size,
            "Build output scanned"
        );

        Ok(Some(BundlesSnapshot {
            assets,
            chunks,
            route_mapping,
            total_client_size,
            total_server_size,
            generated_at: Utc::now(),
        }))
    }
}

/// Recursively collects `.js` files with their sizes. A missing directory
/// yields nothing.
fn collect_js_files(dir: &Path, out: &mut Vec<(PathBuf, u64)>) -> Result<(), CollectorError> {
    if !dir.is_dir() {
        return Ok(());
    }
    let entries = fs::read_dir(dir).map_err(|e| CollectorError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| CollectorError::io(dir, e))?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| CollectorError::io(&path, e))?;
        if metadata.is_dir() {
            collect_js_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "js") {
            out.push((path, metadata.len()));
        }
    }
    Ok(())
}

fn relative_name(base: &Path, path: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_route_mapping(
    manifest: &Path,
    sizes: &HashMap<&str, u64>,
) -> Result<Vec<RouteBundle>, CollectorError> {
    if !manifest.is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(manifest).map_err(|e| CollectorError::io(manifest, e))?;
    let parsed: AppBuildManifest =
        serde_json::from_str(&content).map_err(|e| CollectorError::parse(manifest, e))?;

    Ok(parsed
        .pages
        .into_iter()
        .map(|(entry, chunks)| {
            let total_size = chunks
                .iter()
                .filter_map(|c| sizes.get(c.as_str()))
                .sum();
            RouteBundle {
                route: route_from_entry(&entry),
                chunks,
                total_size,
            }
        })
        .collect())
}

/// `/blog/[slug]/page` -> `/blog/[slug]`, `/page` -> `/`.
fn route_from_entry(entry: &str) -> String {
    let trimmed = ["/page", "/route", "/layout"]
        .iter()
        .find_map(|suffix| entry.strip_suffix(*suffix))
        .unwrap_or(entry);
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
