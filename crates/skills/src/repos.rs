//! Configured repository references (builtin + custom), persisted in the
//! config file.

use std::path::PathBuf;

use {
    tokio::sync::{RwLock, RwLockReadGuard},
    tracing::info,
};

use crate::{
    error::{Error, Result},
    types::RepositoryReference,
};

/// Result of [`RepositoryRegistry::add`].
#[derive(Debug, Clone)]
pub struct AddOutcome {
    pub reference: RepositoryReference,
    /// A new entry was created (as opposed to matching an existing one).
    pub created: bool,
    /// The stored revision changed, so any snapshot of it is stale.
    pub revision_changed: bool,
}

/// Registry of references. Syncs hold the read half of the lock while they
/// fetch; add/remove take the write half.
pub struct RepositoryRegistry {
    config_path: PathBuf,
    repositories: RwLock<Vec<RepositoryReference>>,
}

impl RepositoryRegistry {
    pub fn new(config_path: PathBuf, repositories: Vec<RepositoryReference>) -> Self {
        Self {
            config_path,
            repositories: RwLock::new(repositories),
        }
    }

    /// Load the references stored in `config_path` (builtins included).
    pub async fn load(config_path: PathBuf) -> Result<Self> {
        let path = config_path.clone();
        let config = tokio::task::spawn_blocking(move || myskills_config::load_or_default(&path))
            .await
            .map_err(|e| Error::message(format!("config loader failed: {e}")))??;
        Ok(Self::new(config_path, config.repositories))
    }

    pub async fn list(&self) -> Vec<RepositoryReference> {
        self.repositories.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<RepositoryReference> {
        self.repositories
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Shared access for the duration of a sync.
    pub async fn read(&self) -> RwLockReadGuard<'_, Vec<RepositoryReference>> {
        self.repositories.read().await
    }

    /// Add a reference, or update the matching one's revision.
    ///
    /// Changes are persisted before they become visible; a failed write
    /// leaves the registry as it was.
    pub async fn add(&self, reference: RepositoryReference) -> Result<AddOutcome> {
        let mut repos = self.repositories.write().await;
        let mut next = repos.clone();

        if let Some(existing) = next.iter_mut().find(|r| r.same_location(&reference)) {
            let new_revision = reference.revision.filter(|r| !r.trim().is_empty());
            let revision_changed = new_revision.is_some() && new_revision != existing.revision;
            if revision_changed {
                existing.revision = new_revision;
            }
            let outcome = AddOutcome {
                reference: existing.clone(),
                created: false,
                revision_changed,
            };
            if revision_changed {
                self.persist(&next).await?;
                *repos = next;
                info!(id = %outcome.reference.id, revision = ?outcome.reference.revision, "updated repository revision");
            }
            return Ok(outcome);
        }

        let mut reference = reference;
        reference.is_builtin = false;
        reference.id = unique_id(&next, &reference.id);
        next.push(reference.clone());
        self.persist(&next).await?;
        *repos = next;
        info!(id = %reference.id, slug = %reference.slug(), "added repository");

        Ok(AddOutcome {
            reference,
            created: true,
            revision_changed: false,
        })
    }

    /// Remove a custom reference. Builtin and unknown ids yield `None`.
    pub async fn remove(&self, id: &str) -> Result<Option<RepositoryReference>> {
        let mut repos = self.repositories.write().await;
        let Some(pos) = repos.iter().position(|r| r.id == id && !r.is_builtin) else {
            return Ok(None);
        };
        let mut next = repos.clone();
        let removed = next.remove(pos);
        self.persist(&next).await?;
        *repos = next;
        info!(%id, "removed repository");
        Ok(Some(removed))
    }

    /// Stamp `last_synced_at`/`item_count` for successfully synced references.
    pub async fn record_sync(&self, synced: &[(String, u32)]) -> Result<()> {
        if synced.is_empty() {
            return Ok(());
        }
        let mut repos = self.repositories.write().await;
        let mut next = repos.clone();
        for (id, count) in synced {
            if let Some(r) = next.iter_mut().find(|r| &r.id == id) {
                r.record_sync(*count);
            }
        }
        self.persist(&next).await?;
        *repos = next;
        Ok(())
    }

    async fn persist(&self, repos: &[RepositoryReference]) -> Result<()> {
        let path = self.config_path.clone();
        let repos = repos.to_vec();
        tokio::task::spawn_blocking(move || {
            myskills_config::update_config(&path, |cfg| cfg.repositories = repos)
        })
        .await
        .map_err(|e| Error::message(format!("config writer failed: {e}")))??;
        Ok(())
    }
}

fn unique_id(repos: &[RepositoryReference], base: &str) -> String {
    let taken = |id: &str| repos.iter().any(|r| r.id == id);
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|id| !taken(id))
        .unwrap_or_else(|| base.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, myskills_config::builtin_repositories};

    fn registry(dir: &tempfile::TempDir) -> RepositoryRegistry {
        RepositoryRegistry::new(dir.path().join("myskills.toml"), builtin_repositories())
    }

    #[tokio::test]
    async fn add_persists_custom_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);

        let outcome = registry
            .add(RepositoryReference::custom("anthropics", "skills", None, None))
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.reference.id, "anthropics-skills");

        let reloaded = RepositoryRegistry::load(tmp.path().join("myskills.toml"))
            .await
            .unwrap();
        let ids: Vec<_> = reloaded.list().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["composio-awesome", "anthropics-skills"]);
    }

    #[tokio::test]
    async fn duplicate_location_updates_revision() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        registry
            .add(RepositoryReference::custom("o", "r", None, None))
            .await
            .unwrap();

        let same = registry
            .add(RepositoryReference::custom("O", "R", None, None))
            .await
            .unwrap();
        assert!(!same.created);
        assert!(!same.revision_changed);

        let bumped = registry
            .add(RepositoryReference::custom("o", "r", None, Some("v2".into())))
            .await
            .unwrap();
        assert!(bumped.revision_changed);
        assert_eq!(bumped.reference.revision.as_deref(), Some("v2"));
        assert_eq!(registry.list().await.len(), 2);
    }

    #[tokio::test]
    async fn id_clash_with_different_location_gets_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        registry
            .add(RepositoryReference::custom("o", "r", Some("Skills".into()), None))
            .await
            .unwrap();
        let second = registry
            .add(RepositoryReference::custom("o", "r", Some("skills".into()), None))
            .await
            .unwrap();
        assert_eq!(second.reference.id, "o-r-skills-2");
    }

    #[tokio::test]
    async fn builtin_cannot_be_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        assert!(registry.remove("composio-awesome").await.unwrap().is_none());
        assert!(registry.remove("unknown").await.unwrap().is_none());

        registry
            .add(RepositoryReference::custom("o", "r", None, None))
            .await
            .unwrap();
        assert!(registry.remove("o-r").await.unwrap().is_some());
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn record_sync_stamps_references() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(&tmp);
        registry
            .record_sync(&[("composio-awesome".to_string(), 12)])
            .await
            .unwrap();
        let builtin = registry.get("composio-awesome").await.unwrap();
        assert_eq!(builtin.item_count, Some(12));
        assert!(builtin.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn failed_write_leaves_registry_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let mut repos = builtin_repositories();
        repos.push(RepositoryReference::custom("acme", "tools", None, None));
        let registry = RepositoryRegistry::new(blocker.join("myskills.toml"), repos);
        let before: Vec<_> = registry.list().await.into_iter().map(|r| r.id).collect();

        assert!(
            registry
                .add(RepositoryReference::custom("o", "r", None, None))
                .await
                .is_err()
        );
        assert!(
            registry
                .add(RepositoryReference::custom("acme", "tools", None, Some("v2".into())))
                .await
                .is_err()
        );
        assert!(registry.remove("acme-tools").await.is_err());
        assert!(
            registry
                .record_sync(&[("acme-tools".to_string(), 3)])
                .await
                .is_err()
        );

        let after = registry.list().await;
        let ids: Vec<_> = after.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, before);
        let acme = registry.get("acme-tools").await.unwrap();
        assert!(acme.revision.is_none());
        assert!(acme.item_count.is_none());
    }
}
