use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::utils;

use super::ContentItem;

/// Registry identity of a content file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMeta {
    pub project_id: String,
    pub version_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct CacheData {
    /// `filename:size` -> sha512
    fingerprints: BTreeMap<String, String>,
    /// sha512 -> registry identity
    entries: BTreeMap<String, ContentMeta>,
}

impl CacheData {
    fn merge(&mut self, other: CacheData) {
        self.fingerprints.extend(other.fingerprints);
        for (hash, meta) in other.entries {
            match self.entries.get_mut(&hash) {
                Some(existing) => {
                    // never trade a titled entry for a bare one
                    if meta.title.is_some() || existing.title.is_none() {
                        *existing = meta;
                    }
                }
                None => {
                    self.entries.insert(hash, meta);
                }
            }
        }
    }
}

/// Content lookup table shared by every instance.
///
/// Two levels: the weak `filename:size` fingerprint promotes to a SHA-512 on
/// first miss, and the hash keys the registry metadata. Entries are append
/// only, so concurrent writers merge with last-writer-wins on conflicts.
#[derive(Debug)]
pub struct ContentCache {
    path: PathBuf,
    data: Mutex<CacheData>,
}

impl ContentCache {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            data: Mutex::new(CacheData::default()),
        }
    }

    pub async fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let data = read_data(&path).await.unwrap_or_default();
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    fn guard(&self) -> MutexGuard<'_, CacheData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cached_hash(&self, item: &ContentItem) -> Option<String> {
        self.guard().fingerprints.get(&item.fingerprint()).cloned()
    }

    /// SHA-512 of the item, hashing the file only on a fingerprint miss.
    pub async fn strong_key(&self, item: &ContentItem) -> io::Result<String> {
        if let Some(hash) = self.cached_hash(item) {
            return Ok(hash);
        }

        let hash = utils::sha512_file(&item.path).await?;
        self.guard()
            .fingerprints
            .insert(item.fingerprint(), hash.clone());
        Ok(hash)
    }

    pub fn meta(&self, hash: &str) -> Option<ContentMeta> {
        self.guard().entries.get(hash).cloned()
    }

    /// Metadata for an item reachable through its weak fingerprint alone.
    pub fn meta_for(&self, item: &ContentItem) -> Option<ContentMeta> {
        let data = self.guard();
        let hash = data.fingerprints.get(&item.fingerprint())?;
        data.entries.get(hash).cloned()
    }

    pub fn record(&self, hash: &str, meta: ContentMeta) {
        let mut other = CacheData::default();
        other.entries.insert(hash.to_string(), meta);
        self.guard().merge(other);
    }

    /// Records the fingerprint and metadata of a file the installer just
    /// wrote, so later migrations skip hashing it.
    pub fn record_download(&self, file_name: &str, size: u64, hash: Option<&str>, meta: ContentMeta) {
        let Some(hash) = hash else {
            return;
        };
        let mut other = CacheData::default();
        other
            .fingerprints
            .insert(format!("{file_name}:{size}"), hash.to_string());
        other.entries.insert(hash.to_string(), meta);
        self.guard().merge(other);
    }

    /// Merges the on-disk table with this one and writes the union back.
    pub async fn persist(&self) -> io::Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        let on_disk = read_data(&self.path).await.unwrap_or_default();
        let snapshot = {
            let mut data = self.guard();
            let mut merged = on_disk;
            merged.merge(data.clone());
            *data = merged.clone();
            merged
        };

        let json = serde_json::to_vec_pretty(&snapshot).map_err(io::Error::other)?;
        utils::write_atomic(&self.path, &json).await?;
        debug!(
            path = %self.path.display(),
            fingerprints = snapshot.fingerprints.len(),
            entries = snapshot.entries.len(),
            "content cache persisted"
        );
        Ok(())
    }
}

async fn read_data(path: &Path) -> Option<CacheData> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), %err, "content cache unreadable");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(data) => Some(data),
        Err(err) => {
            warn!(path = %path.display(), %err, "content cache malformed, starting fresh");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::ContentKind;

    fn item(dir: &Path, name: &str, body: &[u8]) -> ContentItem {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        ContentItem {
            kind: ContentKind::Mod,
            file_name: name.to_string(),
            size: body.len() as u64,
            path,
        }
    }

    fn meta(project: &str) -> ContentMeta {
        ContentMeta {
            project_id: project.into(),
            version_id: format!("{project}-v1"),
            title: None,
            icon_url: None,
        }
    }

    #[tokio::test]
    async fn weak_key_promotes_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::in_memory();
        let item = item(dir.path(), "a.jar", b"abc");

        assert!(cache.cached_hash(&item).is_none());
        let first = cache.strong_key(&item).await.unwrap();

        // the fingerprint hit must not touch the file again
        std::fs::remove_file(&item.path).unwrap();
        let second = cache.strong_key(&item).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn persist_merges_concurrent_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content-cache.json");

        let a = ContentCache::load(&path).await;
        let b = ContentCache::load(&path).await;
        a.record("hash-a", meta("alpha"));
        b.record("hash-b", meta("beta"));

        a.persist().await.unwrap();
        b.persist().await.unwrap();

        let reloaded = ContentCache::load(&path).await;
        assert_eq!(reloaded.meta("hash-a").unwrap().project_id, "alpha");
        assert_eq!(reloaded.meta("hash-b").unwrap().project_id, "beta");
    }

    #[tokio::test]
    async fn titled_entries_win_over_bare_ones() {
        let cache = ContentCache::in_memory();
        let mut titled = meta("alpha");
        titled.title = Some("Alpha".into());

        cache.record("h", titled);
        cache.record("h", meta("alpha"));
        assert_eq!(cache.meta("h").unwrap().title.as_deref(), Some("Alpha"));
    }

    #[test]
    fn downloads_seed_the_fingerprint_table() {
        let cache = ContentCache::in_memory();
        cache.record_download("sodium.jar", 42, Some("h1"), meta("sodium"));

        let item = ContentItem {
            kind: ContentKind::Mod,
            file_name: "sodium.jar".into(),
            size: 42,
            path: PathBuf::from("/nonexistent"),
        };
        assert_eq!(cache.meta_for(&item).unwrap().project_id, "sodium");
    }
}
