//! File-system capability consumed by the codecs.
//!
//! The engine never touches the OS directly; loading includes and saving
//! trees goes through a [`FileSystem`] supplied by the caller.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub trait FileSystem {
    fn load(&self, name: &str) -> Result<Vec<u8>>;
    fn save(&self, name: &str, data: &[u8]) -> Result<()>;
}

impl<T: FileSystem + ?Sized> FileSystem for &T {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        (**self).load(name)
    }
    fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        (**self).save(name, data)
    }
}

/// Joins `name` onto the directory part of `base` with `/` separators.
pub fn sibling_path(base: &str, name: &str) -> String {
    if name.starts_with('/') {
        return name.to_string();
    }
    match base.rfind(['/', '\\']) {
        Some(pos) => format!("{}/{}", &base[..pos], name),
        None => name.to_string(),
    }
}

/// Files below a root directory. Names are relative `/` paths; `..` segments
/// and absolute names are refused.
#[derive(Debug, Clone)]
pub struct DirFileSystem {
    root: PathBuf,
}

impl DirFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let mut out = self.root.clone();
        for seg in name.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".") {
            if seg == ".." || seg.contains(':') {
                return Err(Error::io(format!("path escapes file system root: {name}")));
            }
            out.push(seg);
        }
        Ok(out)
    }

    /// Relative names of all files with extension `ext` (any file when empty),
    /// sorted.
    pub fn list(&self, ext: &str) -> Vec<String> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).into_iter().flatten() {
            let p = entry.path();
            if !p.is_file() {
                continue;
            }
            if !ext.is_empty() && p.extension().and_then(|s| s.to_str()) != Some(ext) {
                continue;
            }
            if let Ok(rel) = p.strip_prefix(&self.root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        out.sort();
        out
    }
}

impl FileSystem for DirFileSystem {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(name.to_string()),
            _ => Error::io(format!("{}: {e}", path.display())),
        })
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data).map_err(|e| Error::io(format!("{}: {e}", path.display())))
    }
}

/// In-memory files, for embedding resources and for tests.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, data: impl Into<Vec<u8>>) {
        self.files.write().insert(name.to_string(), data.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut v: Vec<String> = self.files.read().keys().cloned().collect();
        v.sort();
        v
    }
}

impl FileSystem for MemoryFileSystem {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name.to_string()))
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        self.insert(name, data);
        Ok(())
    }
}
