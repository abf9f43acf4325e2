use super::{BlobStorage, NamedBlob, StoredFile};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Blobs under `<root>/<uuid>/<name>`.
///
/// A relative root is resolved against the working directory at
/// construction, so returned paths stay valid if the directory changes
/// later. Reads outside the root are refused.
pub struct LocalBlobStorage {
    root: PathBuf,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && !path.components().any(|c| c == Component::ParentDir)
    }
}

/// Strip directories from a client-supplied name.
fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.is_empty() {
        "upload.bin".to_string()
    } else {
        base
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn upload(&self, files: &[NamedBlob]) -> Option<StoredFile> {
        let file = files.first()?;
        let name = sanitize_name(&file.name);
        let dir = self.root.join(Uuid::new_v4().to_string());
        let path = dir.join(&name);

        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            warn!("Blob upload failed, cannot create {}: {}", dir.display(), e);
            return None;
        }

        if let Err(e) = write_atomically(&dir, &name, &file.bytes).await {
            warn!("Blob upload failed writing {}: {}", path.display(), e);
            // The directory is ours alone; drop it with any partial temp file.
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                debug!("Could not remove {}: {}", dir.display(), e);
            }
            return None;
        }

        debug!("Stored {} ({} bytes) at {}", name, file.bytes.len(), path.display());
        Some(StoredFile {
            path: path.to_string_lossy().to_string(),
            name,
            size: file.bytes.len() as u64,
        })
    }

    async fn read(&self, path: &str) -> Option<Vec<u8>> {
        let path = PathBuf::from(path);
        if !self.contains(&path) {
            warn!("Refusing to read blob outside storage root: {}", path.display());
            return None;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("Blob read failed for {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Temp file in the same directory, then rename.
async fn write_atomically(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = dir.join(format!(".{name}.tmp"));
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, dir.join(name)).await
}

/// Blobs kept in memory, addressed as `/<uuid>/<name>`.
#[derive(Default)]
pub struct MemoryBlobStorage {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn upload(&self, files: &[NamedBlob]) -> Option<StoredFile> {
        let file = files.first()?;
        let name = sanitize_name(&file.name);
        let path = format!("/{}/{}", Uuid::new_v4(), name);
        self.blobs
            .write()
            .await
            .insert(path.clone(), file.bytes.to_vec());
        Some(StoredFile {
            path,
            name,
            size: file.bytes.len() as u64,
        })
    }

    async fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn blob(name: &str, bytes: &[u8]) -> NamedBlob {
        NamedBlob {
            name: name.into(),
            media_type: "application/pdf".into(),
            bytes: Arc::from(bytes),
        }
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("cv.pdf"), "cv.pdf");
        assert_eq!(sanitize_name(""), "upload.bin");
    }

    #[tokio::test]
    async fn local_upload_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStorage::new(dir.path());
        let stored = store.upload(&[blob("cv.pdf", b"%PDF-1.7")]).await.unwrap();
        assert_eq!(stored.name, "cv.pdf");
        assert_eq!(stored.size, 8);
        assert!(stored.path.ends_with("cv.pdf"));
        assert_eq!(store.read(&stored.path).await.unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn relative_root_is_resolved() {
        let store = LocalBlobStorage::new("data/blobs");
        assert!(store.root().is_absolute());
        assert!(store.root().ends_with("data/blobs"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_write_leaves_no_directory_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStorage::new(dir.path());
        // Fits NAME_MAX, but the `.{name}.tmp` temp file does not.
        let name = format!("{}.pdf", "x".repeat(248));
        assert!(store.upload(&[blob(&name, b"%PDF")]).await.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn local_upload_of_nothing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStorage::new(dir.path());
        assert!(store.upload(&[]).await.is_none());
    }

    #[tokio::test]
    async fn local_read_refuses_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStorage::new(dir.path().join("blobs"));
        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, b"x").unwrap();
        assert!(store.read(&outside.to_string_lossy()).await.is_none());
        assert!(store.read("/nonexistent/cv.pdf").await.is_none());
    }

    #[tokio::test]
    async fn memory_upload_then_read() {
        let store = MemoryBlobStorage::new();
        let a = store.upload(&[blob("a.png", b"A")]).await.unwrap();
        let b = store.upload(&[blob("a.png", b"B")]).await.unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(store.read(&a.path).await.unwrap(), b"A");
        assert_eq!(store.read(&b.path).await.unwrap(), b"B");
    }
}
