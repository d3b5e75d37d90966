//! File Walker (C3): enumerates target files under a root, honoring
//! ignore rules and binary-file sniffing, and groups them into
//! deterministic batches.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use git2::Repository;
use ignore::WalkBuilder;
use tracing::{info, warn};

use crate::core::config::WalkerConfig;
use crate::core::errors::{Result, VigilError};
use crate::core::safety::SafetyEnvelope;
use crate::lang::registry::language_key_for_path;

const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    "dist",
    "build",
    ".venv",
];

const BINARY_EXTENSIONS: &[&str] = &[
    "zip", "tar", "gz", "bz2", "xz", "7z", "rar", "png", "jpg", "jpeg", "gif", "bmp", "svg", "ico",
    "webp", "mp3", "mp4", "avi", "wav", "flv", "mov", "wmv", "mkv", "pdf", "doc", "docx", "xls",
    "xlsx", "ppt", "pptx", "exe", "dll", "so", "dylib", "bin", "deb", "rpm", "sqlite", "db",
    "woff", "woff2", "ttf", "eot",
];

/// Which files a walk should cover.
pub enum Scope {
    /// Every tracked (or ignore-rule-respecting) file under the root.
    FullTree,
    /// Files changed relative to `base_ref` (e.g. `HEAD~1`, `main`).
    GitDiff {
        /// Git ref/revision to diff against.
        base_ref: String,
    },
    /// An explicit list of paths. A single path that is a file (not a
    /// directory) is analyzed via an isolated temp copy so the analyzer
    /// never mutates the original in place.
    Explicit {
        /// Paths to analyze, relative or absolute.
        paths: Vec<PathBuf>,
    },
}

/// A batch of files ready to hand to the orchestrator.
#[derive(Debug, Clone)]
pub struct FileBatch {
    /// Files in this batch, in deterministic (sorted) order.
    pub files: Vec<PathBuf>,
}

/// Enumerates files honoring ignore rules, binary sniffing, and the
/// project boundary, then batches them.
pub struct FileWalker<'a> {
    envelope: &'a SafetyEnvelope,
    config: WalkerConfig,
}

impl<'a> FileWalker<'a> {
    /// Build a walker scoped to `envelope`'s project root.
    pub fn new(envelope: &'a SafetyEnvelope, config: WalkerConfig) -> Self {
        Self { envelope, config }
    }

    /// Discover files for `scope`, emit them in sorted order, and split
    /// into batches of the configured size.
    pub fn discover(&self, scope: &Scope) -> Result<Vec<FileBatch>> {
        let files = match scope {
            Scope::FullTree => self.discover_full_tree()?,
            Scope::GitDiff { base_ref } => self.discover_git_diff(base_ref)?,
            Scope::Explicit { paths } => self.discover_explicit(paths)?,
        };
        Ok(batch(files, self.config.batch_size))
    }

    fn discover_full_tree(&self) -> Result<Vec<PathBuf>> {
        let root = self.envelope.project_root();
        let mut unique = HashSet::new();
        let mut collected = Vec::new();

        if let Ok(repo) = Repository::discover(root) {
            if let Some(workdir) = repo.workdir() {
                info!(workdir = %workdir.display(), "using git index for file discovery");
                for path in tracked_files(&repo, workdir)? {
                    if should_keep(&path) && unique.insert(path.clone()) {
                        collected.push(path);
                    }
                }
                collected.sort();
                return Ok(collected);
            }
        }

        warn!("no git repository found, falling back to filesystem walk");
        let walker = WalkBuilder::new(root)
            .standard_filters(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .hidden(false)
            .build();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                        continue;
                    }
                    if should_keep(path) && unique.insert(path.to_path_buf()) {
                        collected.push(path.to_path_buf());
                    }
                }
                Err(err) => warn!(%err, "failed to walk directory entry"),
            }
        }
        collected.sort();
        Ok(collected)
    }

    fn discover_git_diff(&self, base_ref: &str) -> Result<Vec<PathBuf>> {
        let root = self.envelope.project_root();
        let repo = Repository::discover(root)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| VigilError::storage("git repository has no working directory"))?;
        let base = repo.revparse_single(base_ref)?.peel_to_commit()?;
        let base_tree = base.tree()?;
        let diff = repo.diff_tree_to_workdir_with_index(Some(&base_tree), None)?;

        let mut unique = HashSet::new();
        let mut collected = Vec::new();
        diff.foreach(
            &mut |delta, _| {
                if let Some(path) = delta.new_file().path() {
                    let absolute = workdir.join(path);
                    if should_keep(&absolute) && unique.insert(absolute.clone()) {
                        collected.push(absolute);
                    }
                }
                true
            },
            None,
            None,
            None,
        )?;
        collected.sort();
        Ok(collected)
    }

    fn discover_explicit(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut collected = Vec::new();
        for path in paths {
            let resolved = self.envelope.resolve_in_project(path)?;
            if resolved.is_dir() {
                let walker = WalkBuilder::new(&resolved)
                    .standard_filters(true)
                    .hidden(false)
                    .build();
                for entry in walker.flatten() {
                    if entry.file_type().map(|ft| ft.is_file()).unwrap_or(false)
                        && should_keep(entry.path())
                    {
                        collected.push(entry.path().to_path_buf());
                    }
                }
            } else if resolved.is_file() {
                if should_keep(&resolved) {
                    collected.push(isolated_copy(&resolved)?);
                }
            } else {
                return Err(VigilError::not_found(resolved.display().to_string()));
            }
        }
        collected.sort();
        Ok(collected)
    }
}

/// Copy a single file into an isolated temp location so analysis never
/// touches the original path in place, then return the copy's path.
fn isolated_copy(path: &Path) -> Result<PathBuf> {
    let dir = tempfile::Builder::new().prefix("vigil-single-file-").tempdir()?;
    let name = path.file_name().ok_or_else(|| VigilError::not_found(path.display().to_string()))?;
    let dest = dir.into_path().join(name);
    fs::copy(path, &dest)?;
    Ok(dest)
}

fn tracked_files(repo: &Repository, workdir: &Path) -> Result<Vec<PathBuf>> {
    let index = repo.index()?;
    let mut files = Vec::with_capacity(index.len());
    for entry in index.iter() {
        let rel = String::from_utf8_lossy(entry.path.as_ref()).into_owned();
        let absolute = workdir.join(rel);
        if absolute.is_file() {
            files.push(absolute);
        }
    }
    Ok(files)
}

fn should_keep(path: &Path) -> bool {
    for component in path.components() {
        if let std::path::Component::Normal(name) = component {
            if let Some(name) = name.to_str() {
                if DEFAULT_EXCLUDES.contains(&name) {
                    return false;
                }
            }
        }
    }
    if language_key_for_path(path).is_none() {
        return false;
    }
    !is_binary(path).unwrap_or(true)
}

/// Magic-byte/heuristic binary sniff: known binary extensions short-circuit,
/// otherwise the first 1KB is sampled for a high null-byte ratio.
fn is_binary(path: &Path) -> Result<bool> {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if BINARY_EXTENSIONS.iter().any(|b| ext.eq_ignore_ascii_case(b)) {
            return Ok(true);
        }
    }
    let metadata = fs::metadata(path)?;
    if metadata.len() > 10 * 1024 * 1024 {
        return Ok(true);
    }
    let sample_size = std::cmp::min(1024, metadata.len() as usize);
    if sample_size == 0 {
        return Ok(false);
    }
    let mut buffer = vec![0u8; sample_size];
    let mut file = fs::File::open(path)?;
    file.read_exact(&mut buffer)?;
    let null_bytes = buffer.iter().filter(|&&b| b == 0).count();
    Ok((null_bytes as f64 / buffer.len() as f64) > 0.01)
}

fn batch(files: Vec<PathBuf>, batch_size: usize) -> Vec<FileBatch> {
    let batch_size = batch_size.max(1);
    files
        .chunks(batch_size)
        .map(|chunk| FileBatch {
            files: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SafetyConfig;
    use tempfile::tempdir;

    #[test]
    fn full_tree_discovery_skips_ignored_dirs_and_binaries() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/vendored.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("main.py"), "def f():\n    pass\n").unwrap();
        fs::write(dir.path().join("logo.png"), b"\x89PNG\r\n\x1a\n").unwrap();

        let envelope = SafetyEnvelope::new(dir.path(), &SafetyConfig::default()).unwrap();
        let walker = FileWalker::new(&envelope, WalkerConfig { batch_size: 50 });
        let batches = walker.discover(&Scope::FullTree).unwrap();
        let files: Vec<_> = batches.into_iter().flat_map(|b| b.files).collect();

        assert!(files.iter().any(|f| f.ends_with("main.py")));
        assert!(!files.iter().any(|f| f.ends_with("vendored.py")));
        assert!(!files.iter().any(|f| f.ends_with("logo.png")));
    }

    #[test]
    fn batches_respect_configured_size() {
        let files: Vec<PathBuf> = (0..120).map(|i| PathBuf::from(format!("f{i}.py"))).collect();
        let batches = batch(files, 50);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].files.len(), 50);
        assert_eq!(batches[2].files.len(), 20);
    }

    #[test]
    fn explicit_single_file_is_analyzed_via_isolated_copy() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("one.py"), "x = 1\n").unwrap();
        let envelope = SafetyEnvelope::new(dir.path(), &SafetyConfig::default()).unwrap();
        let walker = FileWalker::new(&envelope, WalkerConfig { batch_size: 50 });
        let batches = walker
            .discover(&Scope::Explicit {
                paths: vec![PathBuf::from("one.py")],
            })
            .unwrap();
        let files: Vec<_> = batches.into_iter().flat_map(|b| b.files).collect();
        assert_eq!(files.len(), 1);
        assert!(!files[0].starts_with(dir.path()));
    }
}
