//! Key-addressed blob storage used to source external content (images, imported data).

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Context as _;

use crate::foundation::error::{SketchError, SketchResult};

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn load(&self, name: &str) -> SketchResult<Vec<u8>>;

    async fn save(&self, name: &str, content: &[u8]) -> SketchResult<()>;
}

/// Blobs stored as files below a root directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> SketchResult<PathBuf> {
        let norm = normalize_blob_name(name)?;
        Ok(self.root.join(Path::new(&norm)))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn load(&self, name: &str) -> SketchResult<Vec<u8>> {
        let path = self.path_for(name)?;
        tokio::fs::read(&path).await.map_err(|e| {
            SketchError::resource(format!("failed to read blob '{}': {e}", path.display()))
        })
    }

    async fn save(&self, name: &str, content: &[u8]) -> SketchResult<()> {
        let path = self.path_for(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create blob dir '{}'", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("write blob '{}'", path.display()))?;
        Ok(())
    }
}

/// In-process store, handy for tests and for wiring pre-fetched content.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, name: &str, content: impl Into<Vec<u8>>) -> SketchResult<Self> {
        let norm = normalize_blob_name(name)?;
        self.lock()?.insert(norm, content.into());
        Ok(self)
    }

    fn lock(&self) -> SketchResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| SketchError::resource("memory blob store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, name: &str) -> SketchResult<Vec<u8>> {
        let norm = normalize_blob_name(name)?;
        self.lock()?
            .get(&norm)
            .cloned()
            .ok_or_else(|| SketchError::resource(format!("blob '{norm}' not found")))
    }

    async fn save(&self, name: &str, content: &[u8]) -> SketchResult<()> {
        let norm = normalize_blob_name(name)?;
        self.lock()?.insert(norm, content.to_vec());
        Ok(())
    }
}

/// Normalize a blob name to a relative, `/`-separated path without `.`/`..` segments.
pub fn normalize_blob_name(name: &str) -> SketchResult<String> {
    let s = name.replace('\\', "/");
    if s.starts_with('/') {
        return Err(SketchError::validation("blob names must be relative"));
    }
    if s.is_empty() {
        return Err(SketchError::validation("blob name must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(SketchError::validation("blob names must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(SketchError::validation("blob name must contain a file name"));
    }

    Ok(out.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_escapes() {
        assert_eq!(normalize_blob_name("./a//b.png").unwrap(), "a/b.png");
        assert_eq!(normalize_blob_name("a\\b.csv").unwrap(), "a/b.csv");
        assert!(normalize_blob_name("/etc/passwd").is_err());
        assert!(normalize_blob_name("../x").is_err());
        assert!(normalize_blob_name("./").is_err());
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        store.save("data/table.csv", b"a,b\n1,2").await.unwrap();
        assert_eq!(store.load("./data/table.csv").await.unwrap(), b"a,b\n1,2");
        assert!(matches!(
            store.load("missing").await,
            Err(SketchError::Resource(_))
        ));
    }

    #[tokio::test]
    async fn fs_store_roundtrip() {
        let root = std::env::temp_dir().join(format!("sketchpad_store_{}", std::process::id()));
        let store = FsBlobStore::new(&root);
        store.save("nested/blob.bin", &[1, 2, 3]).await.unwrap();
        assert_eq!(store.load("nested/blob.bin").await.unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            store.load("nested/absent.bin").await,
            Err(SketchError::Resource(_))
        ));
        let _ = std::fs::remove_dir_all(&root);
    }
}
