use std::{
    collections::{HashMap, HashSet},
    path::{Component, Path, PathBuf},
    sync::{Arc, Mutex},
};

use {
    chrono::{DateTime, Utc},
    tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard},
    tracing::{debug, info, warn},
};

use crate::{
    cache::SkillCache,
    error::{FetchError, InstallError},
    fetch::CatalogFetcher,
    parse,
    sanitize::{self, RESOURCES_DIR},
    types::{CreateSkillFile, InstalledSkillRecord},
};

const DESCRIPTOR_FILE: &str = "SKILL.md";

type InstallResult<T> = Result<T, InstallError>;

type LockMap = Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>;

/// Materializes skills under the skills root and removes them again.
///
/// The directory tree is the only source of truth: a skill is installed iff
/// `<root>/<name>/` exists.
pub struct InstallationManager {
    root: PathBuf,
    cache: Arc<SkillCache>,
    fetcher: Arc<dyn CatalogFetcher>,
    locks: LockMap,
}

impl InstallationManager {
    pub fn new(root: PathBuf, cache: Arc<SkillCache>, fetcher: Arc<dyn CatalogFetcher>) -> Self {
        Self {
            root,
            cache,
            fetcher,
            locks: LockMap::default(),
        }
    }

    pub fn skills_dir(&self) -> &Path {
        &self.root
    }

    /// Install the cached descriptor `id`. Returns the skill directory.
    pub async fn install(&self, id: &str) -> InstallResult<PathBuf> {
        let descriptor = self
            .cache
            .get(id)
            .ok_or_else(|| InstallError::NotFound(id.to_string()))?;
        let dir_name = checked_dir_name(&descriptor.install_path)?;
        let target = self.root.join(&dir_name);

        let guard = self.lock_path(&target).await;
        if path_exists(&target).await {
            return Err(InstallError::AlreadyInstalled(dir_name));
        }

        let files = self.fetcher.fetch_files(&descriptor).await?;
        if files.is_empty() {
            return Err(FetchError::NotFound(format!("no files found for '{id}'")).into());
        }

        let path = self.write_locked(guard, target, dir_name, files).await?;
        info!(%id, path = %path.display(), "installed skill");
        Ok(path)
    }

    /// Remove an installed skill directory.
    pub async fn uninstall(&self, name: &str) -> InstallResult<()> {
        let dir_name = checked_dir_name(name)?;
        let target = self.root.join(&dir_name);
        let _guard = self.lock_path(&target).await;

        if !path_exists(&target).await {
            return Err(InstallError::NotFound(dir_name));
        }

        let removal_target = target.clone();
        tokio::task::spawn_blocking(move || remove_tree(&removal_target))
            .await
            .map_err(|e| InstallError::io(&target, std::io::Error::other(e)))??;
        info!(name = %dir_name, "uninstalled skill");
        Ok(())
    }

    /// Every subdirectory with a readable descriptor file, ordered by id.
    pub async fn list_installed(&self) -> InstallResult<Vec<InstalledSkillRecord>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_installed(&root))
            .await
            .map_err(|e| InstallError::io(&self.root, std::io::Error::other(e)))?
    }

    pub async fn is_installed(&self, name: &str) -> bool {
        match checked_dir_name(name) {
            Ok(dir_name) => path_exists(&self.root.join(dir_name)).await,
            Err(_) => false,
        }
    }

    /// Raw descriptor text of an installed skill.
    pub async fn skill_content(&self, name: &str) -> InstallResult<String> {
        let dir_name = checked_dir_name(name)?;
        let path = self.root.join(&dir_name).join(DESCRIPTOR_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(InstallError::NotFound(dir_name))
            },
            Err(e) => Err(InstallError::io(&path, e)),
        }
    }

    /// Write a new skill from user input. Returns the skill directory.
    pub async fn create_custom(
        &self,
        name: &str,
        description: &str,
        instructions: &str,
        examples: Option<&str>,
        resources: Vec<CreateSkillFile>,
    ) -> InstallResult<PathBuf> {
        let slug = sanitize::slugify(name).ok_or_else(|| InstallError::InvalidName(name.into()))?;
        let descriptor = render_template(name, &slug, description, instructions, examples);

        let mut taken = HashSet::from([DESCRIPTOR_FILE.to_string()]);
        let mut files = vec![(DESCRIPTOR_FILE.to_string(), descriptor.into_bytes())];
        for resource in resources {
            if resource.relative_path.trim().is_empty() {
                continue;
            }
            let cleaned = sanitize::clean_resource_path(&resource.relative_path)
                .ok_or_else(|| InstallError::InvalidPath(resource.relative_path.clone()))?;
            let path = sanitize::dedupe_path(&format!("{RESOURCES_DIR}/{cleaned}"), &taken);
            if path != format!("{RESOURCES_DIR}/{cleaned}") {
                debug!(original = %resource.relative_path, renamed = %path, "renamed colliding resource");
            }
            taken.insert(path.clone());
            files.push((path, resource.content));
        }

        let target = self.root.join(&slug);
        let guard = self.lock_path(&target).await;
        if path_exists(&target).await {
            return Err(InstallError::AlreadyInstalled(slug));
        }
        let path = self.write_locked(guard, target, slug, files).await?;
        info!(path = %path.display(), "created custom skill");
        Ok(path)
    }

    async fn lock_path(&self, target: &Path) -> PathGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(target.to_path_buf()).or_default())
        };
        PathGuard {
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
            path: target.to_path_buf(),
        }
    }

    /// Run the write phase to completion on the blocking pool, holding the
    /// path lock, even if the caller stops waiting.
    async fn write_locked(
        &self,
        guard: PathGuard,
        target: PathBuf,
        dir_name: String,
        files: Vec<(String, Vec<u8>)>,
    ) -> InstallResult<PathBuf> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| InstallError::io(&self.root, e))?;
        let task_target = target.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            write_skill(&task_target, &dir_name, files)
        })
        .await
        .map_err(|e| InstallError::io(&target, std::io::Error::other(e)))??;
        Ok(target)
    }
}

/// Exclusive hold on one target path. The map entry goes away with the last
/// holder or waiter.
struct PathGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
    path: PathBuf,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.path);
        }
    }
}

/// Skill directory names are a single normal path component.
fn checked_dir_name(name: &str) -> InstallResult<String> {
    let trimmed = name.trim();
    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !trimmed.contains(['/', '\\']) => {
            Ok(trimmed.to_string())
        },
        _ => Err(InstallError::InvalidName(name.to_string())),
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

fn write_skill(target: &Path, dir_name: &str, files: Vec<(String, Vec<u8>)>) -> InstallResult<()> {
    let files = files
        .into_iter()
        .map(|(path, bytes)| Ok((sanitize::validate_relative_path(&path)?, path, bytes)))
        .collect::<InstallResult<Vec<_>>>()?;

    match std::fs::create_dir(target) {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(InstallError::AlreadyInstalled(dir_name.to_string()));
        },
        Err(e) => return Err(InstallError::io(target, e)),
    }

    if let Err(e) = write_files(target, &files) {
        warn!(path = %target.display(), error = %e, "install failed, removing partial directory");
        if let Err(cleanup) = remove_tree(target) {
            warn!(path = %target.display(), error = %cleanup, "failed to remove partial directory");
        }
        return Err(e);
    }
    Ok(())
}

fn write_files(target: &Path, files: &[(PathBuf, String, Vec<u8>)]) -> InstallResult<()> {
    let canonical_target = std::fs::canonicalize(target).map_err(|e| InstallError::io(target, e))?;
    for (relative, original, bytes) in files {
        let dest = target.join(relative);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
            let canonical_parent =
                std::fs::canonicalize(parent).map_err(|e| InstallError::io(parent, e))?;
            if !canonical_parent.starts_with(&canonical_target) {
                return Err(InstallError::InvalidPath(original.clone()));
            }
        }
        std::fs::write(&dest, bytes).map_err(|e| InstallError::io(&dest, e))?;
        if sanitize::is_executable_path(original) {
            mark_executable(&dest)?;
        }
    }
    debug!(path = %target.display(), count = files.len(), "wrote skill files");
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> InstallResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| InstallError::io(path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> InstallResult<()> {
    Ok(())
}

/// Remove a directory tree contents-first. Entries that disappear while
/// walking are ignored so a retry after a partial failure succeeds.
fn remove_tree(root: &Path) -> InstallResult<()> {
    let gone = |e: &std::io::Error| e.kind() == std::io::ErrorKind::NotFound;

    for entry in walkdir::WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if e.io_error().is_some_and(gone) {
                    continue;
                }
                let path = e.path().unwrap_or(root).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                return Err(InstallError::io(&path, source));
            },
        };
        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir(entry.path())
        } else {
            std::fs::remove_file(entry.path())
        };
        match result {
            Ok(()) => {},
            Err(e) if gone(&e) => {},
            Err(e) => return Err(InstallError::io(entry.path(), e)),
        }
    }
    Ok(())
}

fn scan_installed(root: &Path) -> InstallResult<Vec<InstalledSkillRecord>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(InstallError::io(root, e)),
    };

    let mut records = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| InstallError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path.join(DESCRIPTOR_FILE)) else {
            continue;
        };
        let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };

        let description = parse::parse_descriptor(&content)
            .description()
            .unwrap_or_else(|| format!("Skill: {id}"));
        let installed_at = std::fs::metadata(&path)
            .ok()
            .and_then(|m| m.created().or_else(|_| m.modified()).ok())
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .to_rfc3339();

        records.push(InstalledSkillRecord {
            name: id.replace('-', " "),
            id,
            description,
            path,
            installed_at,
        });
    }
    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(records)
}

fn render_template(
    display_name: &str,
    slug: &str,
    description: &str,
    instructions: &str,
    examples: Option<&str>,
) -> String {
    let description = description.trim();
    let mut out = format!(
        "---\nname: {slug}\ndescription: {description}\nauthor: custom\n---\n\n# {}\n\n{description}\n\n## Instructions\n\n{}\n",
        display_name.trim(),
        instructions.trim()
    );
    if let Some(examples) = examples.map(str::trim).filter(|e| !e.is_empty()) {
        out.push_str(&format!("\n## Examples\n\n{examples}\n"));
    }
    out
}
