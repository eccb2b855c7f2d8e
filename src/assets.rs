//! Read-only asset trees
//!
//! The UI router reads its files through [`AssetSource`], so assets can be
//! compiled into the binary ([`EmbeddedAssets`]), read from disk
//! ([`DirAssets`]) or built in memory ([`MemoryAssets`]).
//!
//! Keys are relative, `/`-separated paths such as `www/index.html`. The
//! empty key names the root directory.

use crate::error::AssetError;
use crate::paths;
use hyper::body::Bytes;
use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A read-only hierarchical file tree
pub trait AssetSource: Send + Sync + 'static {
    /// Read the full content of a file
    fn open(&self, path: &str) -> Result<Bytes, AssetError>;

    /// Names of the direct children of a directory, sorted
    ///
    /// Fails with [`AssetError::NotFound`] if `dir` is not a directory.
    fn list(&self, dir: &str) -> Result<Vec<String>, AssetError>;

    fn is_dir(&self, path: &str) -> bool {
        self.list(path).is_ok()
    }
}

impl<T: AssetSource + ?Sized> AssetSource for Arc<T> {
    fn open(&self, path: &str) -> Result<Bytes, AssetError> {
        (**self).open(path)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, AssetError> {
        (**self).list(dir)
    }

    fn is_dir(&self, path: &str) -> bool {
        (**self).is_dir(path)
    }
}

/// Children of `dir` derived from a flat list of file keys
fn list_from_keys<'a>(keys: impl Iterator<Item = &'a str>, dir: &str) -> Result<Vec<String>, AssetError> {
    let dir = dir.trim_matches('/');
    let mut children = BTreeSet::new();
    for key in keys {
        let rest = if dir.is_empty() {
            Some(key)
        } else {
            key.strip_prefix(dir).and_then(|r| r.strip_prefix('/'))
        };
        if let Some(rest) = rest {
            if let Some(child) = rest.split('/').next().filter(|c| !c.is_empty()) {
                children.insert(child.to_string());
            }
        }
    }
    if children.is_empty() {
        return Err(AssetError::NotFound(dir.to_string()));
    }
    Ok(children.into_iter().collect())
}

/// View of an asset source restricted to a subdirectory
///
/// Paths passed to a scoped view are request-style (`/index.html`) and are
/// resolved with [`paths::join_confined`], so they cannot leave the subtree.
#[derive(Clone)]
pub struct ScopedAssets {
    inner: Arc<dyn AssetSource>,
    /// Asset key of the subtree root, `""` for the whole tree
    base: String,
}

impl std::fmt::Debug for ScopedAssets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedAssets").field("base", &self.base).finish()
    }
}

impl ScopedAssets {
    /// Scope `inner` to `prefix` (e.g. `/www`)
    ///
    /// Fails if the prefix is not a valid asset path. The subtree does not
    /// have to exist; lookups in a missing subtree are simply not found.
    pub fn new(inner: Arc<dyn AssetSource>, prefix: &str) -> Result<Self, AssetError> {
        let key = prefix.strip_prefix('/').unwrap_or(prefix);
        let key = if key.is_empty() { "." } else { key };
        if !paths::is_valid_path(key) {
            return Err(AssetError::InvalidPrefix(prefix.to_string()));
        }
        let base = if key == "." { String::new() } else { key.to_string() };
        Ok(Self { inner, base })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn resolve(&self, request_path: &str) -> Result<String, AssetError> {
        paths::join_confined(&self.base, request_path)
            .ok_or_else(|| AssetError::InvalidPath(request_path.to_string()))
    }
}

impl AssetSource for ScopedAssets {
    fn open(&self, path: &str) -> Result<Bytes, AssetError> {
        let key = self.resolve(path)?;
        self.inner.open(&key)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, AssetError> {
        let key = self.resolve(dir)?;
        self.inner.list(&key)
    }
}

/// In-memory asset tree
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: BTreeMap<String, Bytes>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: impl Into<Bytes>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Bytes>) {
        self.files.insert(path.trim_matches('/').to_string(), content.into());
    }
}

impl AssetSource for MemoryAssets {
    fn open(&self, path: &str) -> Result<Bytes, AssetError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, AssetError> {
        list_from_keys(self.files.keys().map(String::as_str), dir)
    }
}

/// Assets compiled into the binary with `#[derive(RustEmbed)]`
pub struct EmbeddedAssets<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E> EmbeddedAssets<E> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<E> Default for EmbeddedAssets<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RustEmbed + 'static> AssetSource for EmbeddedAssets<E> {
    fn open(&self, path: &str) -> Result<Bytes, AssetError> {
        let file = E::get(path).ok_or_else(|| AssetError::NotFound(path.to_string()))?;
        Ok(match file.data {
            Cow::Borrowed(data) => Bytes::from_static(data),
            Cow::Owned(data) => Bytes::from(data),
        })
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, AssetError> {
        let keys: Vec<Cow<'static, str>> = E::iter().collect();
        list_from_keys(keys.iter().map(|k| &**k), dir)
    }
}

/// Assets read from a directory on disk
///
/// Symlinks that resolve outside the root are treated as missing.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AssetError> {
        let root = root.into().canonicalize()?;
        Ok(Self { root })
    }

    fn locate(&self, path: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(path);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(AssetError::InvalidPath(path.to_string()));
        }
        let full = self.root.join(relative).canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(path.to_string()),
            _ => AssetError::Io(e),
        })?;
        if !full.starts_with(&self.root) {
            return Err(AssetError::NotFound(path.to_string()));
        }
        Ok(full)
    }
}

impl AssetSource for DirAssets {
    fn open(&self, path: &str) -> Result<Bytes, AssetError> {
        let full = self.locate(path)?;
        if !full.is_file() {
            return Err(AssetError::NotFound(path.to_string()));
        }
        Ok(Bytes::from(std::fs::read(full)?))
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, AssetError> {
        let full = self.locate(dir)?;
        if !full.is_dir() {
            return Err(AssetError::NotFound(dir.to_string()));
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(full)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
