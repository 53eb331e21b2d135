/// Config schema types (repositories, sync tuning, GitHub access, skills root).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MySkillsConfig {
    pub repositories: Vec<RepositoryReference>,
    pub sync: SyncConfig,
    pub github: GithubConfig,
    pub skills: SkillsConfig,
}

impl Default for MySkillsConfig {
    fn default() -> Self {
        Self {
            repositories: builtin_repositories(),
            sync: SyncConfig::default(),
            github: GithubConfig::default(),
            skills: SkillsConfig::default(),
        }
    }
}

impl MySkillsConfig {
    /// Re-add any builtin repository missing from `repositories`.
    ///
    /// Returns `true` when the list was modified. Builtins are immutable, so a
    /// hand-edited config that dropped one gets it back on the next load.
    pub fn ensure_builtins(&mut self) -> bool {
        let mut changed = false;
        for (idx, builtin) in builtin_repositories().into_iter().enumerate() {
            match self.repositories.iter_mut().find(|r| r.id == builtin.id) {
                Some(existing) => {
                    if !existing.is_builtin {
                        existing.is_builtin = true;
                        changed = true;
                    }
                },
                None => {
                    let at = idx.min(self.repositories.len());
                    self.repositories.insert(at, builtin);
                    changed = true;
                },
            }
        }
        changed
    }
}

/// The repositories every installation starts with.
pub fn builtin_repositories() -> Vec<RepositoryReference> {
    vec![RepositoryReference {
        id: "composio-awesome".into(),
        owner: "ComposioHQ".into(),
        name: "awesome-claude-skills".into(),
        display_name: "Awesome Claude Skills".into(),
        base_path: None,
        revision: None,
        is_builtin: true,
        last_synced_at: None,
        item_count: None,
    }]
}

/// A configured remote location hosting one or more skills.
///
/// Produced by the reference resolver from user input and persisted in the
/// config file's `[[repositories]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryReference {
    pub id: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default)]
    pub is_builtin: bool,
    /// RFC 3339 timestamp of the last successful sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<u32>,
}

impl RepositoryReference {
    /// Build a user-managed reference, deriving its id and display name.
    pub fn custom(
        owner: impl Into<String>,
        name: impl Into<String>,
        base_path: Option<String>,
        revision: Option<String>,
    ) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            id: derive_id(&owner, &name, base_path.as_deref()),
            display_name: format!("{owner}/{name}"),
            owner,
            name,
            base_path,
            revision,
            is_builtin: false,
            last_synced_at: None,
            item_count: None,
        }
    }

    /// `owner/name`, the form used in descriptor ids and log output.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Whether `other` points at the same owner, repository and base path.
    pub fn same_location(&self, other: &Self) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner)
            && self.name.eq_ignore_ascii_case(&other.name)
            && self.base_path == other.base_path
    }

    /// Stamp the outcome of a successful sync.
    pub fn record_sync(&mut self, item_count: u32) {
        self.last_synced_at = Some(chrono::Utc::now().to_rfc3339());
        self.item_count = Some(item_count);
    }
}

/// Deterministic reference id: lowercase `owner-name[-base-path]`.
pub fn derive_id(owner: &str, name: &str, base_path: Option<&str>) -> String {
    let mut id = format!("{owner}-{name}");
    if let Some(base) = base_path.filter(|b| !b.is_empty()) {
        id.push('-');
        id.push_str(&base.replace('/', "-"));
    }
    id.to_lowercase()
}

/// Tuning for remote catalog synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Per-request timeout in seconds. Timeouts surface as network errors.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Upper bound for scanning one repository during a sync.
    pub reference_timeout_secs: u64,
    /// Attempts per request for transport failures and 5xx responses.
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_backoff_ms: u64,
    /// How many directory levels below the base path are scanned for skills.
    pub max_depth: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 15,
            reference_timeout_secs: 300,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_depth: 3,
        }
    }
}

/// Remote host access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    /// Optional access token, sent as a bearer token. Typically `${GITHUB_TOKEN:-}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            token: None,
        }
    }
}

/// Where installed skills live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Overrides the default `~/.claude/skills` root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}
