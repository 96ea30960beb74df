//! Loaders: rooted access to kustomization directories
//!
//! A loader is rooted at one kustomization directory. File paths are resolved
//! relative to that root and may not escape it; `child` opens another directory
//! (a base) which may live anywhere, and the returned loader is rooted there.
//!
//! Paths are normalized lexically (`.` and `..` are folded without touching the
//! filesystem), so the same directory reached through different relative paths
//! has the same root. Cycle detection relies on this.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// File names recognized as a kustomization descriptor, in lookup order
pub const KUSTOMIZATION_FILE_NAMES: &[&str] =
    &["kustomization.yaml", "kustomization.yml", "Kustomization"];

pub trait Loader: Send + Sync {
    /// Normalized root directory of this loader
    fn root(&self) -> String;

    /// Read a file relative to the root
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    /// Loader rooted at a directory relative to this root
    fn child(&self, path: &str) -> Result<Box<dyn Loader>>;

    /// Read a file as UTF-8
    fn load_string(&self, path: &str) -> Result<String> {
        let bytes = self.load(path)?;
        String::from_utf8(bytes).map_err(|e| CoreError::Loader {
            path: path.to_string(),
            message: format!("file is not valid UTF-8: {}", e),
        })
    }

    /// Name and content of the kustomization file at the root
    fn find_kustomization(&self) -> Result<(String, String)> {
        for name in KUSTOMIZATION_FILE_NAMES {
            if self.exists(name) {
                return Ok((name.to_string(), self.load_string(name)?));
            }
        }
        Err(CoreError::Loader {
            path: self.root(),
            message: format!(
                "no kustomization file found (looked for {})",
                KUSTOMIZATION_FILE_NAMES.join(", ")
            ),
        })
    }

    /// Whether `path` is a directory holding a kustomization file
    fn is_kustomization_dir(&self, path: &str) -> bool {
        if !self.is_dir(path) {
            return false;
        }
        self.child(path)
            .is_ok_and(|child| KUSTOMIZATION_FILE_NAMES.iter().any(|name| child.exists(name)))
    }
}

/// Filesystem loader
#[derive(Debug, Clone)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    /// Root a loader at `dir`, which must be an existing directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };
        let root = normalize_path(&absolute);
        if !root.is_dir() {
            return Err(CoreError::Loader {
                path: root.display().to_string(),
                message: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    /// Resolve `relative` and check it stays inside the root
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let requested = Path::new(relative);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };
        let resolved = normalize_path(&joined);
        if !resolved.starts_with(&self.root) {
            return Err(CoreError::Loader {
                path: relative.to_string(),
                message: format!("file is outside the root {}", self.root.display()),
            });
        }
        Ok(resolved)
    }
}

impl Loader for FsLoader {
    fn root(&self) -> String {
        self.root.display().to_string()
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path)?;
        std::fs::read(&resolved).map_err(|e| CoreError::Loader {
            path: resolved.display().to_string(),
            message: e.to_string(),
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }

    fn is_dir(&self, path: &str) -> bool {
        normalize_path(&self.root.join(path)).is_dir()
    }

    fn child(&self, path: &str) -> Result<Box<dyn Loader>> {
        Ok(Box::new(FsLoader::new(self.root.join(path))?))
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// In-memory loader
///
/// Files are keyed by absolute `/`-separated paths; relative paths given to the
/// builder methods are taken relative to `/`.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    root: String,
    files: Arc<BTreeMap<String, Vec<u8>>>,
}

impl Default for MemoryLoader {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            files: Arc::new(BTreeMap::new()),
        }
    }
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        let key = normalize_str("/", path);
        Arc::make_mut(&mut self.files).insert(key, content.into());
        self
    }

    pub fn with_text_file(self, path: &str, content: &str) -> Self {
        self.with_file(path, content.as_bytes().to_vec())
    }

    /// Same files, rooted at another directory
    pub fn rooted_at(&self, dir: &str) -> Self {
        Self {
            root: normalize_str(&self.root, dir),
            files: Arc::clone(&self.files),
        }
    }

    fn resolve(&self, relative: &str) -> Result<String> {
        let resolved = normalize_str(&self.root, relative);
        let inside = self.root == "/"
            || resolved == self.root
            || resolved.starts_with(&format!("{}/", self.root));
        if !inside {
            return Err(CoreError::Loader {
                path: relative.to_string(),
                message: format!("file is outside the root {}", self.root),
            });
        }
        Ok(resolved)
    }
}

impl Loader for MemoryLoader {
    fn root(&self) -> String {
        self.root.clone()
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path)?;
        self.files
            .get(&resolved)
            .cloned()
            .ok_or_else(|| CoreError::Loader {
                path: resolved,
                message: "file not found".to_string(),
            })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .is_ok_and(|p| self.files.contains_key(&p))
    }

    fn is_dir(&self, path: &str) -> bool {
        let dir = normalize_str(&self.root, path);
        let prefix = if dir == "/" { dir } else { format!("{}/", dir) };
        self.files.keys().any(|k| k.starts_with(&prefix))
    }

    fn child(&self, path: &str) -> Result<Box<dyn Loader>> {
        if !self.is_dir(path) {
            return Err(CoreError::Loader {
                path: normalize_str(&self.root, path),
                message: "not a directory".to_string(),
            });
        }
        Ok(Box::new(self.rooted_at(path)))
    }
}

/// Join `path` onto `base` and fold `.`/`..` segments
fn normalize_str(base: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", base, path)
    };
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}
