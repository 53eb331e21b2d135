//! The operation surface a front end drives, and its live implementation.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {async_trait::async_trait, myskills_config::MySkillsConfig, tracing::info};

use crate::{
    cache::{SkillCache, SnapshotStore},
    error::Result,
    fetch::{CatalogFetcher, GitHubFetcher},
    install::InstallationManager,
    reference,
    repos::{AddOutcome, RepositoryRegistry},
    sync::SyncCoordinator,
    types::{
        CreateSkillFile, InstalledSkillRecord, RepositoryReference, SkillDescriptor, SyncResult,
    },
};

#[async_trait]
pub trait SkillsService: Send + Sync {
    /// Scan one repository directly and refresh its cache entries.
    async fn fetch_catalog(&self, owner: &str, repo: &str) -> Result<Vec<SkillDescriptor>>;
    async fn sync_repositories(&self) -> Result<SyncResult>;
    async fn force_sync_repositories(&self) -> Result<SyncResult>;
    async fn get_cached_skills(&self) -> Result<Vec<SkillDescriptor>>;
    async fn list_installed_skills(&self) -> Result<Vec<InstalledSkillRecord>>;
    async fn is_skill_installed(&self, name: &str) -> Result<bool>;
    async fn install_skill(&self, id: &str) -> Result<PathBuf>;
    async fn uninstall_skill(&self, name: &str) -> Result<()>;
    async fn get_skills_directory(&self) -> Result<PathBuf>;
    async fn get_skill_content(&self, name: &str) -> Result<String>;
    async fn list_repositories(&self) -> Result<Vec<RepositoryReference>>;
    async fn add_repository(
        &self,
        owner: &str,
        repo: &str,
        base_path: Option<&str>,
        revision: Option<&str>,
    ) -> Result<RepositoryReference>;
    /// Parse any supported reference form, then add it.
    async fn resolve_and_add_repository(&self, input: &str) -> Result<RepositoryReference>;
    /// `false` for builtin or unknown ids.
    async fn remove_repository(&self, id: &str) -> Result<bool>;
    async fn create_custom_skill(
        &self,
        name: &str,
        description: &str,
        instructions: &str,
        examples: Option<&str>,
        resources: Vec<CreateSkillFile>,
    ) -> Result<PathBuf>;
}

/// Live [`SkillsService`] backed by the filesystem and a [`CatalogFetcher`].
pub struct SkillsEngine {
    registry: Arc<RepositoryRegistry>,
    cache: Arc<SkillCache>,
    snapshots: SnapshotStore,
    sync: SyncCoordinator,
    installer: InstallationManager,
}

impl SkillsEngine {
    pub fn new(
        registry: Arc<RepositoryRegistry>,
        fetcher: Arc<dyn CatalogFetcher>,
        cache: Arc<SkillCache>,
        snapshots: SnapshotStore,
        skills_dir: PathBuf,
        reference_timeout: Duration,
    ) -> Self {
        let sync = SyncCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&fetcher),
            Arc::clone(&cache),
            snapshots.clone(),
            reference_timeout,
        );
        let installer = InstallationManager::new(skills_dir, Arc::clone(&cache), fetcher);
        Self {
            registry,
            cache,
            snapshots,
            sync,
            installer,
        }
    }

    /// Wire the engine from loaded configuration. References are persisted to
    /// `config_path`; snapshots go to the data cache directory.
    pub fn from_config(config: &MySkillsConfig, config_path: PathBuf) -> Result<Self> {
        let fetcher: Arc<dyn CatalogFetcher> = Arc::new(GitHubFetcher::from_config(config)?);
        let registry = Arc::new(RepositoryRegistry::new(
            config_path,
            config.repositories.clone(),
        ));
        let skills_dir = myskills_config::skills_dir(config);
        let snapshots = SnapshotStore::new(myskills_config::cache_dir());
        info!(
            skills_dir = %skills_dir.display(),
            cache_dir = %snapshots.dir().display(),
            repositories = config.repositories.len(),
            "skills engine ready"
        );
        Ok(Self::new(
            registry,
            fetcher,
            Arc::new(SkillCache::new()),
            snapshots,
            skills_dir,
            Duration::from_secs(config.sync.reference_timeout_secs),
        ))
    }

    pub fn skills_dir(&self) -> &Path {
        self.installer.skills_dir()
    }

    async fn register(&self, reference: RepositoryReference) -> Result<RepositoryReference> {
        let AddOutcome {
            reference,
            created,
            revision_changed,
        } = self.registry.add(reference).await?;
        if (created || revision_changed) && self.snapshots.remove(&reference.id).await? {
            info!(id = %reference.id, "discarded stale snapshot");
        }
        Ok(reference)
    }
}

#[async_trait]
impl SkillsService for SkillsEngine {
    async fn fetch_catalog(&self, owner: &str, repo: &str) -> Result<Vec<SkillDescriptor>> {
        self.sync.fetch_catalog(owner, repo).await
    }

    async fn sync_repositories(&self) -> Result<SyncResult> {
        Ok(self.sync.sync().await)
    }

    async fn force_sync_repositories(&self) -> Result<SyncResult> {
        Ok(self.sync.force_sync().await)
    }

    async fn get_cached_skills(&self) -> Result<Vec<SkillDescriptor>> {
        Ok(self.sync.cached())
    }

    async fn list_installed_skills(&self) -> Result<Vec<InstalledSkillRecord>> {
        Ok(self.installer.list_installed().await?)
    }

    async fn is_skill_installed(&self, name: &str) -> Result<bool> {
        Ok(self.installer.is_installed(name).await)
    }

    async fn install_skill(&self, id: &str) -> Result<PathBuf> {
        Ok(self.installer.install(id).await?)
    }

    async fn uninstall_skill(&self, name: &str) -> Result<()> {
        Ok(self.installer.uninstall(name).await?)
    }

    async fn get_skills_directory(&self) -> Result<PathBuf> {
        let dir = self.installer.skills_dir();
        tokio::fs::create_dir_all(dir).await?;
        Ok(dir.to_path_buf())
    }

    async fn get_skill_content(&self, name: &str) -> Result<String> {
        Ok(self.installer.skill_content(name).await?)
    }

    async fn list_repositories(&self) -> Result<Vec<RepositoryReference>> {
        Ok(self.registry.list().await)
    }

    async fn add_repository(
        &self,
        owner: &str,
        repo: &str,
        base_path: Option<&str>,
        revision: Option<&str>,
    ) -> Result<RepositoryReference> {
        let located = reference::resolve(&format!("{}/{}", owner.trim(), repo.trim()))?;
        let base_path = base_path
            .map(|p| p.trim().trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let revision = revision
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        self.register(RepositoryReference::custom(
            located.owner,
            located.name,
            base_path,
            revision,
        ))
        .await
    }

    async fn resolve_and_add_repository(&self, input: &str) -> Result<RepositoryReference> {
        self.register(reference::resolve(input)?).await
    }

    async fn remove_repository(&self, id: &str) -> Result<bool> {
        let Some(removed) = self.registry.remove(id).await? else {
            return Ok(false);
        };
        self.snapshots.remove(&removed.id).await?;
        self.cache.update(|b| b.remove_reference(&removed.id));
        Ok(true)
    }

    async fn create_custom_skill(
        &self,
        name: &str,
        description: &str,
        instructions: &str,
        examples: Option<&str>,
        resources: Vec<CreateSkillFile>,
    ) -> Result<PathBuf> {
        Ok(self
            .installer
            .create_custom(name, description, instructions, examples, resources)
            .await?)
    }
}
