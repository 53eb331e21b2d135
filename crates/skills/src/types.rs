use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

pub use myskills_config::RepositoryReference;

// ── Categories ───────────────────────────────────────────────────────────────

/// Closed set of catalog categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillCategory {
    Development,
    Data,
    Writing,
    Business,
    Creative,
    Productivity,
    #[default]
    Other,
}

impl SkillCategory {
    pub const ALL: [Self; 7] = [
        Self::Development,
        Self::Data,
        Self::Writing,
        Self::Business,
        Self::Creative,
        Self::Productivity,
        Self::Other,
    ];

    /// Serialized (lowercase) form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Data => "data",
            Self::Writing => "writing",
            Self::Business => "business",
            Self::Creative => "creative",
            Self::Productivity => "productivity",
            Self::Other => "other",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Development => "Development",
            Self::Data => "Data & Analysis",
            Self::Writing => "Writing",
            Self::Business => "Business",
            Self::Creative => "Creative",
            Self::Productivity => "Productivity",
            Self::Other => "Other",
        }
    }

    /// Single glyph shown next to the label.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Development => "💻",
            Self::Data => "📊",
            Self::Writing => "✍️",
            Self::Business => "💼",
            Self::Creative => "🎨",
            Self::Productivity => "⚡",
            Self::Other => "📦",
        }
    }

    /// Lenient lookup by serialized name; unknown names map to `Other`.
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
            .unwrap_or_default()
    }
}

impl fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Catalog entries ──────────────────────────────────────────────────────────

/// Opaque frontmatter record from a remote `SKILL.md`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// One installable skill discovered in a remote repository.
///
/// `id` is `owner/name[/source_path]`. Descriptors are immutable and replaced
/// wholesale on the next sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    /// `owner/name` of the hosting repository.
    pub source_reference: String,
    /// Id of the configured [`RepositoryReference`] that produced this entry.
    pub reference_id: String,
    /// Directory of the skill inside the repository; empty for a root skill.
    #[serde(default)]
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Directory name under the skills root.
    pub install_path: String,
    #[serde(default)]
    pub category: SkillCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SkillMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

impl SkillDescriptor {
    /// Split `source_reference` into `(owner, name)`.
    pub fn owner_and_repo(&self) -> Option<(&str, &str)> {
        self.source_reference
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty())
    }
}

/// Build a descriptor id from its parts.
pub fn descriptor_id(owner: &str, repo: &str, source_path: &str) -> String {
    if source_path.is_empty() {
        format!("{owner}/{repo}")
    } else {
        format!("{owner}/{repo}/{source_path}")
    }
}

/// Directory name a skill installs into: the last segment of its source path,
/// or the repository name for a root-level skill.
pub fn install_dir_name(repo: &str, source_path: &str) -> String {
    source_path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(repo)
        .to_string()
}

// ── Local state ──────────────────────────────────────────────────────────────

/// A skill directory present under the skills root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledSkillRecord {
    /// Directory name.
    pub id: String,
    pub name: String,
    pub description: String,
    pub path: PathBuf,
    /// RFC 3339 creation (or modification) time of the directory.
    pub installed_at: String,
}

/// Outcome of one sync invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub items_found: u32,
    pub message: String,
    /// Every attempted remote fetch was rejected by rate limiting.
    #[serde(default)]
    pub rate_limited: bool,
}

/// An auxiliary file supplied with a custom skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSkillFile {
    pub relative_path: String,
    pub content: Vec<u8>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_label_and_icon() {
        for category in SkillCategory::ALL {
            assert!(!category.label().is_empty());
            assert!(!category.icon().is_empty());
            assert_eq!(SkillCategory::from_name(category.as_str()), category);
        }
        assert_eq!(SkillCategory::from_name("unknown"), SkillCategory::Other);
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&SkillCategory::Productivity).unwrap();
        assert_eq!(json, "\"productivity\"");
    }

    #[test]
    fn ids_and_install_dirs() {
        assert_eq!(descriptor_id("o", "r", ""), "o/r");
        assert_eq!(descriptor_id("o", "r", "skills/pdf"), "o/r/skills/pdf");
        assert_eq!(install_dir_name("r", "skills/pdf"), "pdf");
        assert_eq!(install_dir_name("r", ""), "r");
    }

    #[test]
    fn descriptor_uses_camel_case() {
        let d = SkillDescriptor {
            id: "o/r/x".into(),
            name: "x".into(),
            description: "d".into(),
            source_reference: "o/r".into(),
            reference_id: "o-r".into(),
            source_path: "x".into(),
            revision: None,
            install_path: "x".into(),
            category: SkillCategory::Other,
            long_description: None,
            metadata: None,
            installed_at: None,
        };
        let value = serde_json::to_value(&d).unwrap();
        assert_eq!(value["sourceReference"], "o/r");
        assert_eq!(value["installPath"], "x");
        assert_eq!(d.owner_and_repo(), Some(("o", "r")));
    }
}
