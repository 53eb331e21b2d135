//! Client-side view state over a [`SkillsService`].
//!
//! Views are cached in versioned cells. Every write bumps the cell's version,
//! which lets an optimistic change tell whether it is still the latest write
//! before rolling back.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use tracing::{debug, warn};

use crate::{
    error::ClientError,
    service::SkillsService,
    types::{InstalledSkillRecord, SkillDescriptor, SyncResult},
};

type ClientResult<T> = Result<T, ClientError>;

// ── Versioned cell ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct CellState<T> {
    value: Option<Arc<T>>,
    version: u64,
}

/// A cached value plus a counter bumped on every write.
#[derive(Debug)]
pub struct VersionedCell<T> {
    state: Mutex<CellState<T>>,
}

impl<T> Default for VersionedCell<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CellState {
                value: None,
                version: 0,
            }),
        }
    }
}

impl<T> VersionedCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.lock().value.clone()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Store `value` and return the new version.
    pub fn replace(&self, value: T) -> u64 {
        self.store(Some(Arc::new(value)))
    }

    /// Drop the cached value so the next read reloads it.
    pub fn invalidate(&self) -> u64 {
        self.store(None)
    }

    /// Store `value` only if nothing was written since `version` was read.
    fn replace_if(&self, version: u64, value: Arc<T>) -> bool {
        let mut state = self.lock();
        if state.version != version {
            return false;
        }
        state.value = Some(value);
        state.version += 1;
        true
    }

    fn store(&self, value: Option<Arc<T>>) -> u64 {
        let mut state = self.lock();
        state.value = value;
        state.version += 1;
        state.version
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CellState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Optimistic transactions ──────────────────────────────────────────────────

/// Speculative change to a [`VersionedCell`].
///
/// `begin` snapshots the cell, `apply` writes the speculative value, and
/// `rollback` puts the snapshot back unless another write happened in
/// between, in which case the cell is invalidated instead.
#[must_use = "an optimistic change must be committed or rolled back"]
pub struct Optimistic<'a, T> {
    cell: &'a VersionedCell<T>,
    snapshot: Option<Arc<T>>,
    applied: Option<u64>,
}

impl<'a, T> Optimistic<'a, T> {
    pub fn begin(cell: &'a VersionedCell<T>) -> Self {
        Self {
            cell,
            snapshot: cell.get(),
            applied: None,
        }
    }

    /// Write `f(current)`. Does nothing when the cell holds no value.
    pub fn apply(&mut self, f: impl FnOnce(&T) -> T) {
        if let Some(current) = &self.snapshot {
            self.applied = Some(self.cell.replace(f(current)));
        }
    }

    pub fn commit(self) {}

    /// Undo the speculative write. Returns `true` if the snapshot was put back.
    pub fn rollback(self) -> bool {
        let Some(applied) = self.applied else {
            return false;
        };
        let mut state = self.cell.lock();
        if state.version == applied {
            state.value = self.snapshot;
            state.version += 1;
            true
        } else {
            state.value = None;
            state.version += 1;
            false
        }
    }
}

// ── Query store ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKey {
    StoreCatalog,
    Installed,
}

#[derive(Debug, Default)]
pub struct QueryStore {
    catalog: VersionedCell<Vec<SkillDescriptor>>,
    installed: VersionedCell<Vec<InstalledSkillRecord>>,
}

impl QueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &VersionedCell<Vec<SkillDescriptor>> {
        &self.catalog
    }

    pub fn installed(&self) -> &VersionedCell<Vec<InstalledSkillRecord>> {
        &self.installed
    }

    pub fn invalidate(&self, key: QueryKey) {
        match key {
            QueryKey::StoreCatalog => {
                self.catalog.invalidate();
            },
            QueryKey::Installed => {
                self.installed.invalidate();
            },
        }
    }
}

// ── In-flight guard ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl InFlight {
    fn acquire(&self, id: &str) -> ClientResult<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        if !ids.insert(id.to_string()) {
            return Err(ClientError::Busy(id.to_string()));
        }
        Ok(InFlightGuard {
            ids: Arc::clone(&self.ids),
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

// ── Client state ─────────────────────────────────────────────────────────────

pub struct ClientState {
    service: Arc<dyn SkillsService>,
    queries: QueryStore,
    in_flight: InFlight,
}

impl ClientState {
    pub fn new(service: Arc<dyn SkillsService>) -> Self {
        Self {
            service,
            queries: QueryStore::new(),
            in_flight: InFlight::default(),
        }
    }

    pub fn queries(&self) -> &QueryStore {
        &self.queries
    }

    pub fn invalidate(&self, key: QueryKey) {
        self.queries.invalidate(key);
    }

    /// Cached store catalog, loaded through the service on a miss.
    pub async fn catalog(&self) -> ClientResult<Arc<Vec<SkillDescriptor>>> {
        let cell = self.queries.catalog();
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let version = cell.version();
        let loaded = Arc::new(self.service.get_cached_skills().await?);
        cell.replace_if(version, Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Cached installed list, loaded through the service on a miss.
    pub async fn installed(&self) -> ClientResult<Arc<Vec<InstalledSkillRecord>>> {
        let cell = self.queries.installed();
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let version = cell.version();
        let loaded = Arc::new(self.service.list_installed_skills().await?);
        cell.replace_if(version, Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Mutations are keyed by the directory they touch, so an install and an
    /// uninstall of the same skill exclude each other.
    pub async fn install(&self, id: &str) -> ClientResult<PathBuf> {
        let target = self.install_target(id).await?;
        let _guard = self.in_flight.acquire(&target)?;
        let path = self.service.install_skill(id).await?;
        self.invalidate(QueryKey::Installed);
        self.invalidate(QueryKey::StoreCatalog);
        Ok(path)
    }

    /// Remove `name` from the installed view before the backend confirms.
    pub async fn uninstall(&self, name: &str) -> ClientResult<()> {
        let _guard = self.in_flight.acquire(name)?;

        let mut tx = Optimistic::begin(self.queries.installed());
        tx.apply(|records| {
            records
                .iter()
                .filter(|r| r.id != name)
                .cloned()
                .collect()
        });

        match self.service.uninstall_skill(name).await {
            Ok(()) => {
                tx.commit();
                self.invalidate(QueryKey::Installed);
                self.invalidate(QueryKey::StoreCatalog);
                debug!(%name, "uninstall confirmed");
                Ok(())
            },
            Err(e) => {
                let restored = tx.rollback();
                warn!(%name, error = %e, restored, "uninstall failed, rolled back");
                Err(e.into())
            },
        }
    }

    /// Directory `id` installs into. Unknown ids fall back to the id itself
    /// and are rejected by the backend.
    async fn install_target(&self, id: &str) -> ClientResult<String> {
        let mut catalog = self.catalog().await?;
        if !catalog.iter().any(|d| d.id == id) {
            self.invalidate(QueryKey::StoreCatalog);
            catalog = self.catalog().await?;
        }
        Ok(catalog
            .iter()
            .find(|d| d.id == id)
            .map_or_else(|| id.to_string(), |d| d.install_path.clone()))
    }

    pub async fn sync(&self) -> ClientResult<SyncResult> {
        let result = self.service.sync_repositories().await?;
        self.invalidate(QueryKey::StoreCatalog);
        Ok(result)
    }

    pub async fn force_sync(&self) -> ClientResult<SyncResult> {
        let result = self.service.force_sync_repositories().await?;
        self.invalidate(QueryKey::StoreCatalog);
        Ok(result)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::{Error, InstallError, Result},
            types::{CreateSkillFile, RepositoryReference, SkillCategory},
        },
        async_trait::async_trait,
        std::sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        tokio::sync::Notify,
    };

    #[derive(Default)]
    struct FakeService {
        installed: Mutex<Vec<InstalledSkillRecord>>,
        fail_uninstall: AtomicBool,
        uninstall_gate: Option<Arc<Notify>>,
        install_gate: Option<Arc<Notify>>,
        catalog: Vec<SkillDescriptor>,
        list_calls: AtomicUsize,
        catalog_calls: AtomicUsize,
    }

    fn record(id: &str) -> InstalledSkillRecord {
        InstalledSkillRecord {
            id: id.into(),
            name: id.replace('-', " "),
            description: format!("Skill: {id}"),
            path: PathBuf::from("/skills").join(id),
            installed_at: "2026-01-01T00:00:00+00:00".into(),
        }
    }

    fn remote(id: &str) -> SkillDescriptor {
        let dir = id.rsplit('/').next().unwrap();
        SkillDescriptor {
            id: id.into(),
            name: dir.into(),
            description: format!("{dir} skill"),
            source_reference: "o/r".into(),
            reference_id: "o-r".into(),
            source_path: dir.into(),
            revision: None,
            install_path: dir.into(),
            category: SkillCategory::Other,
            long_description: None,
            metadata: None,
            installed_at: None,
        }
    }

    fn service(ids: &[&str]) -> FakeService {
        FakeService {
            installed: Mutex::new(ids.iter().map(|id| record(id)).collect()),
            ..Default::default()
        }
    }

    #[async_trait]
    impl SkillsService for FakeService {
        async fn fetch_catalog(&self, _owner: &str, _repo: &str) -> Result<Vec<SkillDescriptor>> {
            Ok(Vec::new())
        }

        async fn sync_repositories(&self) -> Result<SyncResult> {
            Ok(SyncResult {
                success: true,
                items_found: 0,
                message: "ok".into(),
                rate_limited: false,
            })
        }

        async fn force_sync_repositories(&self) -> Result<SyncResult> {
            self.sync_repositories().await
        }

        async fn get_cached_skills(&self) -> Result<Vec<SkillDescriptor>> {
            self.catalog_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.catalog.clone())
        }

        async fn list_installed_skills(&self) -> Result<Vec<InstalledSkillRecord>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.installed.lock().unwrap().clone())
        }

        async fn is_skill_installed(&self, name: &str) -> Result<bool> {
            Ok(self.installed.lock().unwrap().iter().any(|r| r.id == name))
        }

        async fn install_skill(&self, id: &str) -> Result<PathBuf> {
            if let Some(gate) = &self.install_gate {
                gate.notified().await;
            }
            let dir = self
                .catalog
                .iter()
                .find(|d| d.id == id)
                .map_or(id, |d| d.install_path.as_str());
            self.installed.lock().unwrap().push(record(dir));
            Ok(PathBuf::from("/skills").join(dir))
        }

        async fn uninstall_skill(&self, name: &str) -> Result<()> {
            if let Some(gate) = &self.uninstall_gate {
                gate.notified().await;
            }
            if self.fail_uninstall.load(Ordering::SeqCst) {
                return Err(Error::message("disk on fire"));
            }
            let mut installed = self.installed.lock().unwrap();
            let before = installed.len();
            installed.retain(|r| r.id != name);
            if installed.len() == before {
                return Err(InstallError::NotFound(name.into()).into());
            }
            Ok(())
        }

        async fn get_skills_directory(&self) -> Result<PathBuf> {
            Ok(PathBuf::from("/skills"))
        }

        async fn get_skill_content(&self, _name: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn list_repositories(&self) -> Result<Vec<RepositoryReference>> {
            Ok(Vec::new())
        }

        async fn add_repository(
            &self,
            owner: &str,
            repo: &str,
            base_path: Option<&str>,
            revision: Option<&str>,
        ) -> Result<RepositoryReference> {
            Ok(RepositoryReference::custom(
                owner,
                repo,
                base_path.map(str::to_string),
                revision.map(str::to_string),
            ))
        }

        async fn resolve_and_add_repository(&self, input: &str) -> Result<RepositoryReference> {
            Err(Error::message(format!("unsupported: {input}")))
        }

        async fn remove_repository(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn create_custom_skill(
            &self,
            _name: &str,
            _description: &str,
            _instructions: &str,
            _examples: Option<&str>,
            _resources: Vec<CreateSkillFile>,
        ) -> Result<PathBuf> {
            Err(Error::message("unsupported"))
        }
    }

    fn ids(records: &[InstalledSkillRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn rollback_restores_snapshot_when_untouched() {
        let cell = VersionedCell::new();
        cell.replace(vec![1, 2, 3]);

        let mut tx = Optimistic::begin(&cell);
        tx.apply(|v| v.iter().copied().filter(|n| *n != 2).collect());
        assert_eq!(*cell.get().unwrap(), vec![1, 3]);

        assert!(tx.rollback());
        assert_eq!(*cell.get().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn rollback_after_concurrent_write_invalidates() {
        let cell = VersionedCell::new();
        cell.replace(vec![1, 2, 3]);

        let mut tx = Optimistic::begin(&cell);
        tx.apply(|v| v[..1].to_vec());
        cell.replace(vec![9]);

        assert!(!tx.rollback());
        assert!(cell.get().is_none());
    }

    #[test]
    fn apply_on_empty_cell_is_noop() {
        let cell: VersionedCell<Vec<u8>> = VersionedCell::new();
        let mut tx = Optimistic::begin(&cell);
        tx.apply(|_| vec![1]);
        assert!(cell.get().is_none());
        assert!(!tx.rollback());
        assert_eq!(cell.version(), 0);
    }

    #[test]
    fn invalidate_clears_only_named_view() {
        let store = QueryStore::new();
        store.catalog().replace(Vec::new());
        store.installed().replace(vec![record("a")]);

        store.invalidate(QueryKey::StoreCatalog);
        assert!(store.catalog().get().is_none());
        assert!(store.installed().get().is_some());
    }

    #[tokio::test]
    async fn reads_are_cached_until_invalidated() {
        let fake = Arc::new(service(&["a"]));
        let state = ClientState::new(Arc::clone(&fake) as Arc<dyn SkillsService>);

        state.installed().await.unwrap();
        state.installed().await.unwrap();
        assert_eq!(fake.list_calls.load(Ordering::SeqCst), 1);

        state.catalog().await.unwrap();
        state.sync().await.unwrap();
        state.catalog().await.unwrap();
        assert_eq!(fake.catalog_calls.load(Ordering::SeqCst), 2);

        state.invalidate(QueryKey::Installed);
        state.installed().await.unwrap();
        assert_eq!(fake.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_uninstall_restores_installed_view() {
        let fake = Arc::new(service(&["a", "b"]));
        fake.fail_uninstall.store(true, Ordering::SeqCst);
        let state = ClientState::new(Arc::clone(&fake) as Arc<dyn SkillsService>);
        state.installed().await.unwrap();

        let err = state.uninstall("a").await.unwrap_err();
        assert!(matches!(err, ClientError::Service(_)));
        assert_eq!(ids(&state.queries().installed().get().unwrap()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn successful_uninstall_refreshes_views() {
        let fake = Arc::new(service(&["a", "b"]));
        let state = ClientState::new(Arc::clone(&fake) as Arc<dyn SkillsService>);
        state.installed().await.unwrap();

        state.uninstall("a").await.unwrap();
        assert!(state.queries().installed().get().is_none());
        assert_eq!(ids(&state.installed().await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn uninstall_missing_leaves_view_unchanged() {
        let fake = Arc::new(service(&["a"]));
        let state = ClientState::new(Arc::clone(&fake) as Arc<dyn SkillsService>);
        state.installed().await.unwrap();

        let err = state.uninstall("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Service(Error::Install(InstallError::NotFound(_)))
        ));
        assert_eq!(ids(&state.queries().installed().get().unwrap()), vec!["a"]);
    }

    #[tokio::test]
    async fn second_mutation_for_same_id_is_busy() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(FakeService {
            installed: Mutex::new(vec![record("a"), record("b")]),
            uninstall_gate: Some(Arc::clone(&gate)),
            ..Default::default()
        });
        let state = ClientState::new(Arc::clone(&fake) as Arc<dyn SkillsService>);

        let (first, second, ()) = tokio::join!(state.uninstall("a"), state.uninstall("a"), async {
            tokio::task::yield_now().await;
            gate.notify_one();
        });
        first.unwrap();
        assert!(matches!(second.unwrap_err(), ClientError::Busy(id) if id == "a"));

        gate.notify_one();
        state.uninstall("b").await.unwrap();
        assert!(fake.installed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn install_invalidates_views() {
        let fake = Arc::new(service(&[]));
        let state = ClientState::new(Arc::clone(&fake) as Arc<dyn SkillsService>);
        assert!(state.installed().await.unwrap().is_empty());

        state.install("new-skill").await.unwrap();
        assert_eq!(ids(&state.installed().await.unwrap()), vec!["new-skill"]);
    }

    #[tokio::test]
    async fn install_and_uninstall_of_same_skill_are_exclusive() {
        let gate = Arc::new(Notify::new());
        let fake = Arc::new(FakeService {
            install_gate: Some(Arc::clone(&gate)),
            catalog: vec![remote("o/r/pdf"), remote("o/r/docx")],
            ..Default::default()
        });
        let state = ClientState::new(Arc::clone(&fake) as Arc<dyn SkillsService>);

        let (install, uninstall, ()) =
            tokio::join!(state.install("o/r/pdf"), state.uninstall("pdf"), async {
                tokio::task::yield_now().await;
                gate.notify_one();
            });
        install.unwrap();
        assert!(matches!(uninstall.unwrap_err(), ClientError::Busy(dir) if dir == "pdf"));

        gate.notify_one();
        state.install("o/r/docx").await.unwrap();
        let dirs: Vec<_> = fake
            .installed
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(dirs, vec!["pdf", "docx"]);
    }
}
