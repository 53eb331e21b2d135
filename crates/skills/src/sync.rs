//! Cache-first synchronization of every configured repository.

use std::{sync::Arc, time::Duration};

use {
    futures::future::join_all,
    tracing::{info, warn},
};

use crate::{
    builtin,
    cache::{CatalogBuilder, SkillCache, SnapshotStore},
    error::{FetchError, Result},
    fetch::CatalogFetcher,
    reference,
    repos::RepositoryRegistry,
    types::{RepositoryReference, SkillDescriptor, SyncResult},
};

/// Where a reference's descriptors came from during one sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Embedded,
    Snapshot,
    Remote,
}

type Loaded = std::result::Result<(Vec<SkillDescriptor>, Origin), FetchError>;

pub struct SyncCoordinator {
    registry: Arc<RepositoryRegistry>,
    fetcher: Arc<dyn CatalogFetcher>,
    cache: Arc<SkillCache>,
    snapshots: SnapshotStore,
    reference_timeout: Duration,
}

impl SyncCoordinator {
    pub fn new(
        registry: Arc<RepositoryRegistry>,
        fetcher: Arc<dyn CatalogFetcher>,
        cache: Arc<SkillCache>,
        snapshots: SnapshotStore,
        reference_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            fetcher,
            cache,
            snapshots,
            reference_timeout,
        }
    }

    /// Cache-first sync: embedded data, then snapshots, then the network.
    /// A failing reference keeps its previously cached entries.
    pub async fn sync(&self) -> SyncResult {
        self.run(false).await
    }

    /// Re-fetch every non-embedded reference, ignoring snapshots. Nothing
    /// from the previous catalog is carried over, except when rate limiting
    /// blocked every fetch.
    pub async fn force_sync(&self) -> SyncResult {
        self.run(true).await
    }

    /// Current cache contents, ordered by id.
    pub fn cached(&self) -> Vec<SkillDescriptor> {
        self.cache.snapshot().descriptors()
    }

    /// Scan one repository ad hoc and replace its contribution in the cache.
    pub async fn fetch_catalog(&self, owner: &str, repo: &str) -> Result<Vec<SkillDescriptor>> {
        let requested = reference::resolve(&format!("{owner}/{repo}"))?;
        let guard = self.registry.read().await;
        let configured = guard
            .iter()
            .find(|r| r.same_location(&requested))
            .cloned();
        let target = configured.clone().unwrap_or(requested);

        let descriptors = self.fetch_remote(&target).await?;
        if configured.is_some()
            && let Err(e) = self.snapshots.save(&target.id, &descriptors).await
        {
            warn!(id = %target.id, error = %e, "failed to save snapshot");
        }
        let catalog = self.cache.update(|b| {
            b.insert_reference(&target.id, descriptors);
        });
        drop(guard);

        let stored = catalog.for_reference(&target.id);
        info!(reference = %target.slug(), count = stored.len(), "fetched catalog");
        Ok(stored)
    }

    async fn run(&self, force: bool) -> SyncResult {
        let guard = self.registry.read().await;
        let references: Vec<RepositoryReference> = guard.clone();

        let loaded: Vec<Loaded> =
            join_all(references.iter().map(|r| self.load_reference(r, force))).await;

        let previous = self.cache.snapshot();
        let rate_limited = all_remote_rate_limited(&loaded);

        if rate_limited && !previous.is_empty() {
            drop(guard);
            warn!(
                cached = previous.len(),
                "every remote fetch was rate limited, keeping cached catalog"
            );
            return SyncResult {
                success: false,
                items_found: count_u32(previous.len()),
                message: format!(
                    "GitHub API rate limit reached; keeping {} cached skills. Try again later or configure a token.",
                    previous.len()
                ),
                rate_limited: true,
            };
        }

        let mut builder = CatalogBuilder::new();
        let mut errors = Vec::new();
        let mut synced = Vec::new();
        let mut fresh = Vec::new();
        for (reference, result) in references.iter().zip(loaded) {
            match result {
                Ok((descriptors, origin)) => {
                    let count = builder.insert_reference(&reference.id, descriptors);
                    info!(id = %reference.id, count, ?origin, "loaded repository");
                    synced.push((reference.id.clone(), count_u32(count)));
                    if origin == Origin::Remote {
                        fresh.push(reference.id.clone());
                    }
                },
                Err(e) => {
                    warn!(id = %reference.id, error = %e, "repository sync failed");
                    let kept = match (force, rate_limited) {
                        (false, _) => previous.for_reference(&reference.id),
                        (true, true) => self
                            .snapshots
                            .load(&reference.id)
                            .await
                            .unwrap_or_default(),
                        (true, false) => Vec::new(),
                    };
                    if !kept.is_empty() {
                        builder.insert_reference(&reference.id, kept);
                    }
                    errors.push(format!("{}: {e}", reference.slug()));
                },
            }
        }

        let catalog = self.cache.replace(builder);

        // Snapshots that a forced sync could not refresh are stale.
        if force && !rate_limited {
            match self.snapshots.retain(&fresh).await {
                Ok(removed) => info!(removed, "discarded stale snapshots"),
                Err(e) => warn!(error = %e, "failed to discard stale snapshots"),
            }
        }
        drop(guard);

        if let Err(e) = self.registry.record_sync(&synced).await {
            warn!(error = %e, "failed to record sync info");
        }

        let items_found = count_u32(catalog.len());
        let message = if errors.is_empty() {
            format!(
                "Successfully synced {items_found} skills from {} repositories",
                references.len()
            )
        } else {
            format!(
                "Synced {items_found} skills with {} errors: {}",
                errors.len(),
                errors.join("; ")
            )
        };
        info!(items_found, errors = errors.len(), force, "sync finished");

        SyncResult {
            success: errors.is_empty(),
            items_found,
            message,
            rate_limited,
        }
    }

    async fn load_reference(&self, reference: &RepositoryReference, force: bool) -> Loaded {
        if let Some(embedded) = builtin::embedded_catalog(reference) {
            return Ok((embedded, Origin::Embedded));
        }
        if !force && let Some(snapshot) = self.snapshots.load(&reference.id).await {
            return Ok((snapshot, Origin::Snapshot));
        }

        let descriptors = self.fetch_remote(reference).await?;
        if let Err(e) = self.snapshots.save(&reference.id, &descriptors).await {
            warn!(id = %reference.id, error = %e, "failed to save snapshot");
        }
        Ok((descriptors, Origin::Remote))
    }

    async fn fetch_remote(
        &self,
        reference: &RepositoryReference,
    ) -> std::result::Result<Vec<SkillDescriptor>, FetchError> {
        match tokio::time::timeout(self.reference_timeout, self.fetcher.fetch(reference)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Network(format!(
                "scanning {} timed out after {}s",
                reference.slug(),
                self.reference_timeout.as_secs()
            ))),
        }
    }
}

/// True when at least one reference went to the network and every such
/// attempt failed with `RateLimited`.
fn all_remote_rate_limited(loaded: &[Loaded]) -> bool {
    let mut remote = loaded
        .iter()
        .filter(|l| !matches!(l, Ok((_, Origin::Embedded | Origin::Snapshot))))
        .peekable();
    remote.peek().is_some() && remote.all(|l| matches!(l, Err(FetchError::RateLimited)))
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
