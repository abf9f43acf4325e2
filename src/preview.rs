//! Revocable in-memory preview URLs.
//!
//! A [`PreviewUrl`] names a payload held by a [`PreviewRegistry`] so a
//! viewer can display it without re-reading storage. Whoever creates a URL
//! owns it and must [`PreviewRegistry::revoke`] it once it is no longer
//! shown; a URL that is never revoked keeps its payload alive for the life
//! of the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

const SCHEME: &str = "blob:resume-review/";

/// Opaque reference to a registered payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PreviewUrl(String);

impl PreviewUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payload resolved from a preview URL.
#[derive(Debug, Clone)]
pub struct PreviewPayload {
    pub bytes: Arc<[u8]>,
    pub media_type: String,
}

/// Shared table of live preview URLs. Cloning shares the table.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<Mutex<HashMap<String, PreviewPayload>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PreviewPayload>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `bytes` and return a fresh URL for them.
    pub fn create(&self, bytes: Arc<[u8]>, media_type: impl Into<String>) -> PreviewUrl {
        let url = format!("{SCHEME}{}", Uuid::new_v4());
        let media_type = media_type.into();
        debug!("Preview {} → {} bytes ({})", url, bytes.len(), media_type);
        self.lock()
            .insert(url.clone(), PreviewPayload { bytes, media_type });
        PreviewUrl(url)
    }

    /// Look up a live URL.
    pub fn resolve(&self, url: &PreviewUrl) -> Option<PreviewPayload> {
        self.lock().get(url.as_str()).cloned()
    }

    /// Release a URL. Returns false if it was already revoked or never existed.
    pub fn revoke(&self, url: &PreviewUrl) -> bool {
        let removed = self.lock().remove(url.as_str()).is_some();
        if removed {
            debug!("Revoked preview {}", url);
        }
        removed
    }

    /// Number of URLs not yet revoked.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }
}

impl fmt::Debug for PreviewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewRegistry")
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_resolve_revoke() {
        let reg = PreviewRegistry::new();
        let url = reg.create(Arc::from(&b"png"[..]), "image/png");
        assert!(url.as_str().starts_with("blob:"));
        assert_eq!(reg.live_count(), 1);

        let payload = reg.resolve(&url).expect("live url");
        assert_eq!(&*payload.bytes, b"png");
        assert_eq!(payload.media_type, "image/png");

        assert!(reg.revoke(&url));
        assert!(!reg.revoke(&url), "second revoke is a no-op");
        assert!(reg.resolve(&url).is_none());
        assert_eq!(reg.live_count(), 0);
    }

    #[test]
    fn urls_are_unique() {
        let reg = PreviewRegistry::new();
        let a = reg.create(Arc::from(&b"x"[..]), "image/png");
        let b = reg.create(Arc::from(&b"x"[..]), "image/png");
        assert_ne!(a, b);
    }

    #[test]
    fn clones_share_entries() {
        let reg = PreviewRegistry::new();
        let other = reg.clone();
        let url = reg.create(Arc::from(&b"x"[..]), "application/pdf");
        assert!(other.resolve(&url).is_some());
    }
}
