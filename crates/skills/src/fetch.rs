//! Remote catalog access over the GitHub contents API.

use std::{
    collections::{HashSet, VecDeque},
    time::Duration,
};

use {
    async_trait::async_trait,
    base64::{Engine, engine::general_purpose::STANDARD},
    myskills_config::{GithubConfig, MySkillsConfig, SyncConfig},
    reqwest::{
        Client, StatusCode,
        header::{self, HeaderMap, HeaderValue},
    },
    serde::Deserialize,
    tracing::{debug, info},
    url::Url,
};

use crate::{
    error::FetchError,
    parse,
    types::{RepositoryReference, SkillDescriptor, descriptor_id, install_dir_name},
};

const DESCRIPTOR_FILE: &str = "SKILL.md";

/// Source of remote skill catalogs.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Scan `reference` for skill directories.
    async fn fetch(
        &self,
        reference: &RepositoryReference,
    ) -> Result<Vec<SkillDescriptor>, FetchError>;

    /// Download every file of a skill, with paths relative to its directory.
    async fn fetch_files(
        &self,
        descriptor: &SkillDescriptor,
    ) -> Result<Vec<(String, Vec<u8>)>, FetchError>;
}

/// One item of a contents API directory listing (or a single file response).
#[derive(Debug, Clone, Deserialize)]
struct ContentEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

impl ContentEntry {
    fn is_file(&self) -> bool {
        self.kind == "file"
    }

    fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// [`CatalogFetcher`] backed by the GitHub REST API.
///
/// Proxies are taken from `HTTPS_PROXY`/`HTTP_PROXY`/`ALL_PROXY` by reqwest.
pub struct GitHubFetcher {
    client: Client,
    api_base: String,
    max_retries: u32,
    retry_backoff: Duration,
    max_depth: u32,
}

impl GitHubFetcher {
    pub fn new(sync: &SyncConfig, github: &GithubConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        if let Some(token) = github
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| FetchError::Parse(format!("invalid token: {e}")))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(concat!("myskills/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(sync.connect_timeout_secs))
            .timeout(Duration::from_secs(sync.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_base: github.api_base.trim_end_matches('/').to_string(),
            max_retries: sync.max_retries.max(1),
            retry_backoff: Duration::from_millis(sync.retry_backoff_ms),
            max_depth: sync.max_depth,
        })
    }

    pub fn from_config(config: &MySkillsConfig) -> Result<Self, FetchError> {
        Self::new(&config.sync, &config.github)
    }

    fn contents_url(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Url, FetchError> {
        let mut url = Url::parse(&format!(
            "{}/repos/{owner}/{repo}/contents/{}",
            self.api_base,
            path.trim_matches('/')
        ))
        .map_err(|e| FetchError::Parse(format!("invalid contents url: {e}")))?;
        if let Some(revision) = revision {
            url.query_pairs_mut().append_pair("ref", revision);
        }
        Ok(url)
    }

    /// GET with retries for transport failures and 5xx responses.
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut last_error = FetchError::Network(format!("no attempt made for {url}"));
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = self.retry_backoff.saturating_mul(1u32 << attempt.min(16));
                debug!(attempt, ?delay, %url, "retrying request");
                tokio::time::sleep(delay).await;
            }
            match self.get_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e @ FetchError::Network(_)) => last_error = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    async fn get_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(url, &e))?;
        if let Some(err) = status_error(response.status(), url) {
            return Err(err);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_error(url, &e))?;
        Ok(bytes.to_vec())
    }

    async fn list_dir(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Vec<ContentEntry>, FetchError> {
        let url = self.contents_url(owner, repo, path, revision)?;
        let body = self.get_bytes(url.as_str()).await?;
        serde_json::from_slice(&body)
            .map_err(|e| FetchError::Parse(format!("directory listing for '{path}': {e}")))
    }

    /// Read one file through the contents API: inline base64 content, falling
    /// back to its `download_url`.
    async fn read_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        revision: Option<&str>,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.contents_url(owner, repo, path, revision)?;
        let body = self.get_bytes(url.as_str()).await?;
        let entry: ContentEntry = serde_json::from_slice(&body)
            .map_err(|e| FetchError::Parse(format!("file response for '{path}': {e}")))?;

        match (entry.content, entry.download_url) {
            (Some(encoded), _) if !encoded.is_empty() => {
                let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(cleaned)
                    .map_err(|e| FetchError::Parse(format!("invalid base64 in '{path}': {e}")))
            },
            (_, Some(download_url)) => self.get_bytes(&download_url).await,
            _ => Err(FetchError::Parse(format!("no content for '{path}'"))),
        }
    }

    async fn describe(
        &self,
        reference: &RepositoryReference,
        dir: &str,
        descriptor_path: &str,
    ) -> Result<SkillDescriptor, FetchError> {
        let owner = reference.owner.as_str();
        let repo = reference.name.as_str();
        let bytes = self
            .read_file(owner, repo, descriptor_path, reference.revision.as_deref())
            .await?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let parsed = parse::parse_descriptor(&content);

        let folder = install_dir_name(repo, dir);
        let name = parsed
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| folder.replace('-', " "));
        let description = parsed
            .description()
            .unwrap_or_else(|| format!("A skill from {folder}"));
        let category = parse::categorize(&name, &description, parsed.metadata.tags.as_deref());

        Ok(SkillDescriptor {
            id: descriptor_id(owner, repo, dir),
            name,
            description,
            source_reference: reference.slug(),
            reference_id: reference.id.clone(),
            source_path: dir.to_string(),
            revision: reference.revision.clone(),
            install_path: folder,
            category,
            long_description: Some(content),
            metadata: Some(parsed.metadata),
            installed_at: None,
        })
    }

    /// Breadth-first walk from the base path. A directory holding a
    /// descriptor file is a skill and is not descended into.
    async fn scan(
        &self,
        reference: &RepositoryReference,
    ) -> Result<Vec<SkillDescriptor>, FetchError> {
        let owner = reference.owner.as_str();
        let repo = reference.name.as_str();
        let revision = reference.revision.as_deref();
        let base = reference
            .base_path
            .as_deref()
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();

        let mut found = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(base, 0u32)]);

        while let Some((dir, depth)) = queue.pop_front() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            let entries = self.list_dir(owner, repo, &dir, revision).await?;

            if let Some(file) = entries
                .iter()
                .find(|e| e.is_file() && e.name.eq_ignore_ascii_case(DESCRIPTOR_FILE))
            {
                let descriptor_path = join(&dir, &file.name);
                found.push(self.describe(reference, &dir, &descriptor_path).await?);
                continue;
            }

            if depth >= self.max_depth {
                continue;
            }
            for entry in entries.iter().filter(|e| e.is_dir()) {
                queue.push_back((join(&dir, &entry.name), depth + 1));
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl CatalogFetcher for GitHubFetcher {
    async fn fetch(
        &self,
        reference: &RepositoryReference,
    ) -> Result<Vec<SkillDescriptor>, FetchError> {
        let descriptors = self.scan(reference).await?;
        info!(
            reference = %reference.slug(),
            count = descriptors.len(),
            "scanned repository"
        );
        Ok(descriptors)
    }

    async fn fetch_files(
        &self,
        descriptor: &SkillDescriptor,
    ) -> Result<Vec<(String, Vec<u8>)>, FetchError> {
        let (owner, repo) = descriptor.owner_and_repo().ok_or_else(|| {
            FetchError::Parse(format!(
                "descriptor '{}' has no owner/name source",
                descriptor.id
            ))
        })?;
        let revision = descriptor.revision.as_deref();

        let mut files = Vec::new();
        let mut queue = VecDeque::from([(
            descriptor.source_path.trim_matches('/').to_string(),
            String::new(),
        )]);

        while let Some((dir, relative_dir)) = queue.pop_front() {
            for entry in self.list_dir(owner, repo, &dir, revision).await? {
                let path = join(&dir, &entry.name);
                let relative = join(&relative_dir, &entry.name);
                if entry.is_file() {
                    let bytes = match &entry.download_url {
                        Some(url) => self.get_bytes(url).await?,
                        None => self.read_file(owner, repo, &path, revision).await?,
                    };
                    files.push((relative, bytes));
                } else if entry.is_dir() {
                    queue.push_back((path, relative));
                }
            }
        }

        debug!(id = %descriptor.id, count = files.len(), "downloaded skill files");
        Ok(files)
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn network_error(url: &str, e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network(format!("request to {url} timed out"))
    } else {
        FetchError::Network(e.to_string())
    }
}

fn status_error(status: StatusCode, url: &str) -> Option<FetchError> {
    match status {
        s if s.is_success() => None,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => Some(FetchError::RateLimited),
        StatusCode::NOT_FOUND => Some(FetchError::NotFound(url.to_string())),
        s if s.is_server_error() => Some(FetchError::Network(format!("HTTP {s} from {url}"))),
        s => Some(FetchError::Parse(format!("unexpected status {s} from {url}"))),
    }
}
