use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    types::SkillDescriptor,
};

// ── In-memory catalog ────────────────────────────────────────────────────────

/// Immutable view of every synchronized descriptor.
#[derive(Debug, Default)]
pub struct Catalog {
    version: u64,
    entries: BTreeMap<String, SkillDescriptor>,
    by_reference: BTreeMap<String, Vec<String>>,
}

impl Catalog {
    /// Increases on every swap of the process-wide cache.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &str) -> Option<&SkillDescriptor> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All descriptors, ordered by id.
    pub fn descriptors(&self) -> Vec<SkillDescriptor> {
        self.entries.values().cloned().collect()
    }

    /// Descriptors contributed by one reference, ordered by id.
    pub fn for_reference(&self, reference_id: &str) -> Vec<SkillDescriptor> {
        let mut out: Vec<SkillDescriptor> = self
            .by_reference
            .get(reference_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

/// Mutable staging area for the next [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entries: BTreeMap<String, SkillDescriptor>,
    by_reference: BTreeMap<String, Vec<String>>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a copy of `catalog`.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        Self {
            entries: catalog.entries.clone(),
            by_reference: catalog.by_reference.clone(),
        }
    }

    /// Drop everything `reference_id` contributed.
    pub fn remove_reference(&mut self, reference_id: &str) {
        for id in self.by_reference.remove(reference_id).unwrap_or_default() {
            self.entries.remove(&id);
        }
    }

    /// Add a reference's descriptors, replacing its previous contribution.
    ///
    /// An id already owned by another reference is re-keyed as
    /// `<reference_id>:<id>`. Returns the number of descriptors added.
    pub fn insert_reference(
        &mut self,
        reference_id: &str,
        descriptors: Vec<SkillDescriptor>,
    ) -> usize {
        self.remove_reference(reference_id);
        let mut ids = Vec::with_capacity(descriptors.len());
        for mut descriptor in descriptors {
            let taken = self
                .entries
                .get(&descriptor.id)
                .is_some_and(|existing| existing.reference_id != reference_id);
            if taken {
                let rekeyed = format!("{reference_id}:{}", descriptor.id);
                warn!(
                    id = %descriptor.id,
                    %rekeyed,
                    reference = reference_id,
                    "descriptor id already provided by another repository"
                );
                descriptor.id = rekeyed;
            }
            ids.push(descriptor.id.clone());
            self.entries.insert(descriptor.id.clone(), descriptor);
        }
        let count = ids.len();
        self.by_reference.insert(reference_id.to_string(), ids);
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-wide catalog cache. Readers clone the current `Arc<Catalog>`;
/// writers build a new catalog and swap it in.
#[derive(Debug, Default)]
pub struct SkillCache {
    current: RwLock<Arc<Catalog>>,
}

impl SkillCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current catalog. Never blocks on network work.
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Swap in a freshly built catalog.
    pub fn replace(&self, builder: CatalogBuilder) -> Arc<Catalog> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(Catalog {
            version: guard.version + 1,
            entries: builder.entries,
            by_reference: builder.by_reference,
        });
        *guard = Arc::clone(&next);
        debug!(version = next.version, count = next.len(), "catalog replaced");
        next
    }

    /// Copy-on-write update of the current catalog.
    pub fn update(&self, f: impl FnOnce(&mut CatalogBuilder)) -> Arc<Catalog> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut builder = CatalogBuilder::from_catalog(&guard);
        f(&mut builder);
        let next = Arc::new(Catalog {
            version: guard.version + 1,
            entries: builder.entries,
            by_reference: builder.by_reference,
        });
        *guard = Arc::clone(&next);
        next
    }

    pub fn get(&self, id: &str) -> Option<SkillDescriptor> {
        self.snapshot().get(id).cloned()
    }
}

// ── On-disk snapshots ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    reference_id: String,
    saved_at: String,
    skills: Vec<SkillDescriptor>,
}

/// One JSON file per reference: `<dir>/<sanitized-reference-id>.json`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, reference_id: &str) -> PathBuf {
        let file: String = reference_id
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    /// Load a reference's snapshot. Missing or unreadable snapshots are a
    /// cache miss.
    pub async fn load(&self, reference_id: &str) -> Option<Vec<SkillDescriptor>> {
        let path = self.path_for(reference_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read snapshot");
                return None;
            },
        };
        match serde_json::from_slice::<SnapshotFile>(&data) {
            Ok(file) => Some(file.skills),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt snapshot");
                None
            },
        }
    }

    /// Persist a reference's snapshot atomically.
    pub async fn save(&self, reference_id: &str, skills: &[SkillDescriptor]) -> Result<()> {
        let path = self.path_for(reference_id);
        let data = serde_json::to_vec_pretty(&SnapshotFile {
            reference_id: reference_id.to_string(),
            saved_at: chrono::Utc::now().to_rfc3339(),
            skills: skills.to_vec(),
        })?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || myskills_common::fs::write_atomic(&target, data))
            .await
            .map_err(|e| Error::message(format!("snapshot writer failed: {e}")))??;
        debug!(path = %path.display(), count = skills.len(), "saved snapshot");
        Ok(())
    }

    /// Remove one snapshot. Returns whether a file was deleted.
    pub async fn remove(&self, reference_id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(reference_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every `*.json` snapshot in the directory. Returns the count.
    pub async fn clear(&self) -> Result<usize> {
        self.retain(&[]).await
    }

    /// Delete every `*.json` snapshot except those of `keep`. Returns the
    /// count removed.
    pub async fn retain(&self, keep: &[String]) -> Result<usize> {
        let keep: HashSet<PathBuf> = keep.iter().map(|id| self.path_for(id)).collect();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if keep.contains(&path) {
                continue;
            }
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        debug!(dir = %self.dir.display(), removed, kept = keep.len(), "pruned snapshots");
        Ok(removed)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::SkillCategory};

    fn descriptor(id: &str, reference_id: &str) -> SkillDescriptor {
        let install_path = id.rsplit('/').next().unwrap().to_string();
        SkillDescriptor {
            id: id.into(),
            name: install_path.clone(),
            description: format!("{id} description"),
            source_reference: "o/r".into(),
            reference_id: reference_id.into(),
            source_path: install_path.clone(),
            revision: None,
            install_path,
            category: SkillCategory::Other,
            long_description: None,
            metadata: None,
            installed_at: None,
        }
    }

    #[test]
    fn replace_bumps_version_and_reads_are_stable() {
        let cache = SkillCache::new();
        assert_eq!(cache.snapshot().version(), 0);

        let mut builder = CatalogBuilder::new();
        builder.insert_reference("a", vec![descriptor("o/r/b", "a"), descriptor("o/r/a", "a")]);
        let catalog = cache.replace(builder);

        assert_eq!(catalog.version(), 1);
        let first = cache.snapshot().descriptors();
        let second = cache.snapshot().descriptors();
        assert_eq!(first, second);
        assert_eq!(first[0].id, "o/r/a");
    }

    #[test]
    fn colliding_ids_are_rekeyed() {
        let mut builder = CatalogBuilder::new();
        builder.insert_reference("first", vec![descriptor("o/r/pdf", "first")]);
        builder.insert_reference("second", vec![descriptor("o/r/pdf", "second")]);

        let cache = SkillCache::new();
        let catalog = cache.replace(builder);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("o/r/pdf").unwrap().reference_id, "first");
        assert_eq!(
            catalog.get("second:o/r/pdf").unwrap().reference_id,
            "second"
        );
    }

    #[test]
    fn update_replaces_one_reference_only() {
        let cache = SkillCache::new();
        let mut builder = CatalogBuilder::new();
        builder.insert_reference("a", vec![descriptor("o/a/x", "a")]);
        builder.insert_reference("b", vec![descriptor("o/b/y", "b")]);
        cache.replace(builder);

        let before = cache.snapshot();
        let after = cache.update(|b| {
            b.insert_reference("a", vec![descriptor("o/a/z", "a")]);
        });

        assert_eq!(before.len(), 2);
        assert!(before.get("o/a/x").is_some());
        assert_eq!(after.version(), before.version() + 1);
        assert!(after.get("o/a/x").is_none());
        assert!(after.get("o/a/z").is_some());
        assert_eq!(after.for_reference("b").len(), 1);
    }

    #[tokio::test]
    async fn snapshot_roundtrip_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().join("cache"));
        assert!(store.load("o-r").await.is_none());

        store.save("o-r", &[descriptor("o/r/x", "o-r")]).await.unwrap();
        let loaded = store.load("o-r").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "o/r/x");

        assert!(store.remove("o-r").await.unwrap());
        assert!(!store.remove("o-r").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().to_path_buf());
        std::fs::write(tmp.path().join("o-r.json"), "{not json").unwrap();
        assert!(store.load("o-r").await.is_none());
    }

    #[tokio::test]
    async fn clear_only_removes_json() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().to_path_buf());
        store.save("a", &[]).await.unwrap();
        store.save("b/c", &[]).await.unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "keep").unwrap();

        assert!(tmp.path().join("b_c.json").exists());
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(tmp.path().join("notes.txt").exists());
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retain_keeps_listed_references() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path().to_path_buf());
        store.save("fresh", &[descriptor("o/r/x", "fresh")]).await.unwrap();
        store.save("stale", &[]).await.unwrap();
        store.save("b/c", &[]).await.unwrap();

        let removed = store
            .retain(&["fresh".to_string(), "b/c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.load("fresh").await.is_some());
        assert!(store.load("b/c").await.is_some());
        assert!(store.load("stale").await.is_none());
    }
}
