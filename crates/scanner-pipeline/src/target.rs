//! # Target Resolver (spec §4.1)
//!
//! Classifies a user-supplied target string into one of four modes and
//! produces the initial Work Set. Directory walks are iterative (an explicit
//! stack, no recursion), never follow a symlink that would escape the walk
//! root, and skip hidden directories plus the conventional build/vendor
//! directories.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use scanner_core::{Artifact, ScanConfig};

use crate::error::{PipelineError, Result};

const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "build", "coverage", ".git"];
const RECOGNIZED_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "tsx", "jsx", "json"];

/// Which of the four target shapes a scan resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    File,
    ManifestDir,
    RawDir,
    Registry,
}

/// One item the Scheduler will dispatch to the Analyzer Suite: an artifact
/// plus, for text artifacts, its decoded content.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub artifact: Artifact,
    pub content: Option<String>,
    /// `true` for files admitted to the text analyzers; `false` for
    /// oversized or unrecognized-extension files that still contribute a
    /// fingerprint and size but are not parsed.
    pub analyzable: bool,
}

/// The resolved scan scope: a mode plus the files/packages it produced.
#[derive(Debug, Clone)]
pub struct WorkSet {
    pub mode: TargetMode,
    pub items: Vec<WorkItem>,
    pub manifest: Option<(PathBuf, String)>,
    pub files_skipped: u64,
    pub bytes_scanned: u64,
}

pub struct TargetResolver;

impl TargetResolver {
    /// Resolve `target` against `config`'s walk policy. Registry targets
    /// (bare names) are reported as `TargetMode::Registry` with an empty
    /// Work Set; the Artifact Fetcher populates it from there.
    pub fn resolve(target: &str, config: &ScanConfig) -> Result<WorkSet> {
        let looks_like_path = target.contains('/') || target.contains('\\') || target == "." || target == "..";
        let path = Path::new(target);

        if !path.exists() {
            if looks_like_path {
                return Err(PipelineError::TargetNotFound(target.to_string()));
            }
            return Ok(WorkSet {
                mode: TargetMode::Registry,
                items: Vec::new(),
                manifest: None,
                files_skipped: 0,
                bytes_scanned: 0,
            });
        }

        if path.is_file() {
            let bytes = fs::read(path).map_err(|e| PipelineError::TargetNotFound(e.to_string()))?;
            let item = Self::build_item(path.to_path_buf(), bytes, config.max_file_size_bytes);
            let files_skipped = u64::from(!item.analyzable && item.artifact.size_bytes > config.max_file_size_bytes);
            return Ok(WorkSet {
                mode: TargetMode::File,
                bytes_scanned: item.artifact.size_bytes,
                items: vec![item],
                manifest: None,
                files_skipped,
            });
        }

        let manifest_path = path.join("package.json");
        if manifest_path.is_file() {
            let raw = fs::read_to_string(&manifest_path)
                .map_err(|e| PipelineError::InvalidManifest(e.to_string()))?;
            serde_json::from_str::<serde_json::Value>(&raw)
                .map_err(|e| PipelineError::InvalidManifest(e.to_string()))?;
            let mut set = Self::walk(path, config)?;
            set.mode = TargetMode::ManifestDir;
            set.manifest = Some((manifest_path, raw));
            return Ok(set);
        }

        let mut set = Self::walk(path, config)?;
        set.mode = TargetMode::RawDir;
        Ok(set)
    }

    fn walk(root: &Path, config: &ScanConfig) -> Result<WorkSet> {
        let canonical_root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let mut items = Vec::new();
        let mut files_skipped = 0u64;
        let mut bytes_scanned = 0u64;
        let mut stack = vec![root.to_path_buf()];
        let mut visited = HashSet::new();

        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            for entry in entries.flatten() {
                let entry_path = entry.path();
                let file_name = entry.file_name();
                let name_lossy = file_name.to_string_lossy();

                if name_lossy.starts_with('.') && name_lossy != "." {
                    continue;
                }
                if SKIPPED_DIRS.contains(&name_lossy.as_ref()) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(_) => continue,
                };

                if metadata.is_symlink() {
                    let Ok(resolved) = fs::canonicalize(&entry_path) else { continue };
                    if !resolved.starts_with(&canonical_root) {
                        continue;
                    }
                    if !visited.insert(resolved) {
                        continue;
                    }
                }

                if entry_path.is_dir() {
                    stack.push(entry_path);
                    continue;
                }

                let Ok(bytes) = fs::read(&entry_path) else { continue };
                bytes_scanned += bytes.len() as u64;
                let item = Self::build_item(entry_path, bytes, config.max_file_size_bytes);
                if !item.analyzable && item.artifact.size_bytes > config.max_file_size_bytes {
                    files_skipped += 1;
                }
                items.push(item);
            }
        }

        Ok(WorkSet {
            mode: TargetMode::RawDir,
            items,
            manifest: None,
            files_skipped,
            bytes_scanned,
        })
    }

    fn build_item(path: PathBuf, bytes: Vec<u8>, max_file_size_bytes: u64) -> WorkItem {
        let artifact = Artifact::for_file(path.clone(), &bytes);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let within_budget = artifact.size_bytes <= max_file_size_bytes;
        let recognized = RECOGNIZED_EXTENSIONS.contains(&ext.as_str());
        let analyzable = within_budget && recognized;
        let content = if analyzable {
            Some(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            None
        };
        WorkItem { artifact, content, analyzable }
    }
}
