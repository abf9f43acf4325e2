use super::{KvItem, KvStore, StoreError};
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// A compiled `list` pattern: `*` is any run of characters, everything else
/// is literal.
#[derive(Debug, Clone)]
pub enum KeyPattern {
    Exact(String),
    Glob(Regex),
}

impl KeyPattern {
    pub fn new(pattern: &str) -> Result<Self, StoreError> {
        if !pattern.contains('*') {
            return Ok(KeyPattern::Exact(pattern.to_string()));
        }
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^(?s){body}$"))
            .map(KeyPattern::Glob)
            .map_err(|e| StoreError::Corrupt(format!("bad key pattern {pattern:?}: {e}")))
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::Exact(p) => p == key,
            KeyPattern::Glob(re) => re.is_match(key),
        }
    }
}

fn list_map(map: &BTreeMap<String, String>, pattern: &KeyPattern, include_values: bool) -> Vec<KvItem> {
    map.iter()
        .filter(|(k, _)| pattern.matches(k))
        .map(|(k, v)| KvItem {
            key: k.clone(),
            value: include_values.then(|| v.clone()),
        })
        .collect()
}

/// In-process key-value store.
#[derive(Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.map
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn list(&self, pattern: &str, include_values: bool) -> Result<Vec<KvItem>, StoreError> {
        let pattern = KeyPattern::new(pattern)?;
        Ok(list_map(&*self.map.read().await, &pattern, include_values))
    }
}

/// Key-value store persisted as a single JSON object.
///
/// Every `set` rewrites the file atomically (temp file + rename) while
/// holding the write lock, so concurrent writers never interleave.
pub struct FileKv {
    path: PathBuf,
    map: RwLock<BTreeMap<String, String>>,
}

impl FileKv {
    /// Open `path`, starting empty when the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let map = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_err(&path, e)),
        };
        debug!("Opened key-value file {} ({} keys)", path.display(), map.len());
        Ok(Self {
            path,
            map: RwLock::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(map).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_err(&self.path, e))
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl KvStore for FileKv {
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut map = self.map.write().await;
        let previous = map.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&map).await {
            // Keep memory in step with disk
            match previous {
                Some(old) => map.insert(key.to_string(), old),
                None => map.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn list(&self, pattern: &str, include_values: bool) -> Result<Vec<KvItem>, StoreError> {
        let pattern = KeyPattern::new(pattern)?;
        Ok(list_map(&*self.map.read().await, &pattern, include_values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(pattern: &str, key: &str) -> bool {
        KeyPattern::new(pattern).unwrap().matches(key)
    }

    #[test]
    fn glob_matching() {
        assert!(hits("resume:*", "resume:abc"));
        assert!(hits("resume:*", "resume:"));
        assert!(!hits("resume:*", "other:abc"));
        assert!(hits("a*c", "abbbc"));
        assert!(hits("exact", "exact"));
        assert!(!hits("exact", "exactly"));
        // Regex metacharacters are literal
        assert!(hits("a.b*", "a.bc"));
        assert!(!hits("a.b*", "axbc"));
    }

    #[test]
    fn pattern_without_wildcard_skips_regex() {
        assert!(matches!(KeyPattern::new("resume:1").unwrap(), KeyPattern::Exact(_)));
        assert!(matches!(KeyPattern::new("resume:*").unwrap(), KeyPattern::Glob(_)));
    }

    #[tokio::test]
    async fn memory_kv_set_get_list() {
        let kv = MemoryKv::new();
        kv.set("resume:2", "two").await.unwrap();
        kv.set("resume:1", "one").await.unwrap();
        kv.set("theme", "dark").await.unwrap();

        assert_eq!(kv.get("resume:1").await.unwrap().as_deref(), Some("one"));
        assert_eq!(kv.get("missing").await.unwrap(), None);

        let items = kv.list("resume:*", true).await.unwrap();
        let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["resume:1", "resume:2"]);
        assert_eq!(items[0].value.as_deref(), Some("one"));

        let bare = kv.list("resume:*", false).await.unwrap();
        assert!(bare.iter().all(|i| i.value.is_none()));
    }

    #[tokio::test]
    async fn file_kv_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("kv.json");

        let kv = FileKv::open(&path).await.unwrap();
        kv.set("resume:x", "{\"id\":\"x\"}").await.unwrap();
        kv.set("resume:x", "{\"id\":\"x\",\"v\":2}").await.unwrap();
        drop(kv);

        let kv = FileKv::open(&path).await.unwrap();
        assert_eq!(
            kv.get("resume:x").await.unwrap().as_deref(),
            Some("{\"id\":\"x\",\"v\":2}")
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn file_kv_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            FileKv::open(&path).await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
