//! File-based route enumeration.
//!
//! App router: every directory under `app/` is a segment. `page.*` makes it
//! a page, `route.*` a route handler. Route groups `(name)` and parallel
//! slots `@name` do not appear in the URL; `_private` folders are skipped.
//!
//! Pages router: every module under `pages/` is a route, `index` collapses
//! to its parent, `pages/api/**` are API routes, `_app`/`_document`/`_error`
//! are framework files and excluded.

use std::fs;
use std::path::{Path, PathBuf};

use devlens_core::{RouteEntry, RouteKind, RouteNode, RoutesSnapshot};

use super::{CollectorError, RouteEnumerator};

const SOURCE_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mdx"];
const PAGES_FRAMEWORK_FILES: &[&str] = &["_app", "_document", "_error"];

/// Walks `app/` (or `src/app/`) and `pages/` (or `src/pages/`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRouteEnumerator;

impl RouteEnumerator for FsRouteEnumerator {
    fn enumerate(&self, project_root: &Path) -> Result<RoutesSnapshot, CollectorError> {
        let mut snapshot = RoutesSnapshot::default();

        if let Some(app_dir) = first_dir(project_root, &["app", "src/app"]) {
            let tree = walk_app_segment(project_root, &app_dir, "", "/", &mut snapshot.app_routes)?;
            snapshot.app_router_tree = Some(tree);
        }

        if let Some(pages_dir) = first_dir(project_root, &["pages", "src/pages"]) {
            walk_pages(project_root, &pages_dir, &pages_dir, &mut snapshot.pages_routes)?;
        }

        snapshot.app_routes.sort_by(|a, b| a.path.cmp(&b.path));
        snapshot.pages_routes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(snapshot)
    }
}

fn first_dir(root: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|c| root.join(c))
        .find(|p| p.is_dir())
}

/// Splits `name.ext` into its stem when the extension is a source file.
fn source_stem(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !SOURCE_EXTENSIONS.contains(&ext) {
        return None;
    }
    path.file_stem()?.to_str().map(str::to_string)
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn join_url(parent: &str, segment: &str) -> String {
    if parent == "/" {
        format!("/{segment}")
    } else {
        format!("{parent}/{segment}")
    }
}

fn is_url_transparent(segment: &str) -> bool {
    (segment.starts_with('(') && segment.ends_with(')')) || segment.starts_with('@')
}

fn sorted_entries(dir: &Path) -> Result<Vec<fs::DirEntry>, CollectorError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| CollectorError::io(dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CollectorError::io(dir, e))?;
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}

fn walk_app_segment(
    root: &Path,
    dir: &Path,
    segment: &str,
    url: &str,
    routes: &mut Vec<RouteEntry>,
) -> Result<RouteNode, CollectorError> {
    let mut node = RouteNode {
        segment: segment.to_string(),
        path: url.to_string(),
        ..Default::default()
    };

    for entry in sorted_entries(dir)? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if path.is_dir() {
            if name.starts_with('_') {
                continue;
            }
            let child_url = if is_url_transparent(&name) {
                url.to_string()
            } else {
                join_url(url, &name)
            };
            node.children
                .push(walk_app_segment(root, &path, &name, &child_url, routes)?);
            continue;
        }

        match source_stem(&path).as_deref() {
            Some("page") => {
                node.has_page = true;
                routes.push(RouteEntry {
                    path: url.to_string(),
                    file: relative(root, &path),
                    kind: RouteKind::Page,
                });
            }
            Some("route") => {
                node.has_route_handler = true;
                routes.push(RouteEntry {
                    path: url.to_string(),
                    file: relative(root, &path),
                    kind: RouteKind::RouteHandler,
                });
            }
            Some("layout") => node.has_layout = true,
            Some("loading") => node.has_loading = true,
            Some("error") => node.has_error = true,
            _ => {}
        }
    }

    Ok(node)
}

fn walk_pages(
    root: &Path,
    pages_dir: &Path,
    dir: &Path,
    routes: &mut Vec<RouteEntry>,
) -> Result<(), CollectorError> {
    for entry in sorted_entries(dir)? {
        let path = entry.path();
        if path.is_dir() {
            walk_pages(root, pages_dir, &path, routes)?;
            continue;
        }

        let Some(stem) = source_stem(&path) else {
            continue;
        };
        if dir == pages_dir && PAGES_FRAMEWORK_FILES.contains(&stem.as_str()) {
            continue;
        }

        let parent = relative(pages_dir, dir);
        let mut segments: Vec<&str> = parent.split('/').filter(|s| !s.is_empty()).collect();
        if stem != "index" {
            segments.push(&stem);
        }
        let url = format!("/{}", segments.join("/"));
        let kind = if segments.first() == Some(&"api") {
            RouteKind::Api
        } else {
            RouteKind::Page
        };

        routes.push(RouteEntry {
            path: url,
            file: relative(root, &path),
            kind,
        });
    }
    Ok(())
}
