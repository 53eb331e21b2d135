//! Lenient `SKILL.md` reader.
//!
//! Remote descriptors are written by hand and frequently contain frontmatter
//! that is not valid YAML (unquoted colons, stray indentation). Parsing never
//! fails: strict YAML is tried first, then a line-based fallback.

use serde::Deserialize;

use crate::types::{SkillCategory, SkillMetadata};

/// Minimum length for a body line to count as a summary.
const MIN_SUMMARY_LEN: usize = 20;

/// Result of reading one `SKILL.md`.
#[derive(Debug, Clone, Default)]
pub struct ParsedDescriptor {
    pub metadata: SkillMetadata,
    /// First meaningful paragraph of the markdown body.
    pub summary: Option<String>,
    pub body: String,
}

impl ParsedDescriptor {
    /// Frontmatter description, falling back to the body summary.
    pub fn description(&self) -> Option<String> {
        self.metadata
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| self.summary.clone())
    }
}

/// Parse `SKILL.md` content into metadata, summary and body.
pub fn parse_descriptor(content: &str) -> ParsedDescriptor {
    match split_frontmatter(content) {
        Some((frontmatter, body)) => ParsedDescriptor {
            metadata: parse_frontmatter(frontmatter),
            summary: extract_summary(body),
            body: body.trim().to_string(),
        },
        None => ParsedDescriptor {
            metadata: SkillMetadata::default(),
            summary: extract_summary(content),
            body: content.trim().to_string(),
        },
    }
}

/// Split content at `---` delimiters into (frontmatter, body).
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();
    let after_open = trimmed.strip_prefix("---")?;
    let close_pos = after_open.find("\n---")?;
    let frontmatter = &after_open[..close_pos];
    let rest = &after_open[close_pos + 4..];
    // Drop the remainder of the closing delimiter line.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or_default();
    Some((frontmatter, body))
}

#[derive(Deserialize)]
struct RawFrontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    tags: Option<RawTags>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Inline(String),
}

fn parse_frontmatter(frontmatter: &str) -> SkillMetadata {
    match serde_yaml::from_str::<RawFrontmatter>(frontmatter) {
        Ok(raw) => {
            let tags = match raw.tags {
                Some(RawTags::List(list)) => list,
                Some(RawTags::Inline(value)) => parse_inline_tags(&value),
                None => Vec::new(),
            };
            SkillMetadata {
                name: non_empty(raw.name),
                description: non_empty(raw.description),
                author: non_empty(raw.author),
                tags: (!tags.is_empty()).then_some(tags),
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "frontmatter is not valid YAML, using line parser");
            parse_frontmatter_lines(frontmatter)
        },
    }
}

fn parse_frontmatter_lines(frontmatter: &str) -> SkillMetadata {
    let mut metadata = SkillMetadata::default();
    let mut tags = Vec::new();
    let mut in_tags_list = false;

    for line in frontmatter.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if in_tags_list {
            if let Some(tag) = line.strip_prefix('-') {
                let tag = unquote(tag.trim());
                if !tag.is_empty() {
                    tags.push(tag.to_string());
                }
                continue;
            }
            if !line.contains(':') {
                continue;
            }
            in_tags_list = false;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = unquote(value.trim());
        match key.trim() {
            "name" => metadata.name = non_empty(Some(value.to_string())),
            "description" => metadata.description = non_empty(Some(value.to_string())),
            "author" => metadata.author = non_empty(Some(value.to_string())),
            "tags" => {
                if value.is_empty() {
                    in_tags_list = true;
                } else {
                    tags.extend(parse_inline_tags(value));
                }
            },
            _ => {},
        }
    }

    if !tags.is_empty() {
        metadata.tags = Some(tags);
    }
    metadata
}

/// `[a, "b", 'c']` or `a, b, c`.
fn parse_inline_tags(value: &str) -> Vec<String> {
    let v = value.trim();
    let v = v
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(v);
    v.split(',')
        .map(|s| unquote(s.trim()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"').trim_matches('\'')
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// First body line that is not a heading, list item, or fence and is long
/// enough to read as prose.
pub fn extract_summary(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#') && !l.starts_with('-') && !l.starts_with("```"))
        .find(|l| l.len() > MIN_SUMMARY_LEN)
        .map(str::to_string)
}

/// Keyword groups checked in order; the first match wins.
const CATEGORY_KEYWORDS: &[(SkillCategory, &[&str])] = &[
    (SkillCategory::Development, &["code", "develop", "test", "git"]),
    (SkillCategory::Data, &["data", "csv", "sql", "analy"]),
    (SkillCategory::Writing, &["writ", "article", "content", "doc"]),
    (SkillCategory::Business, &["business", "market", "lead", "sales"]),
    (SkillCategory::Creative, &["image", "video", "creative", "design"]),
    (
        SkillCategory::Productivity,
        &["productiv", "organiz", "file", "automat"],
    ),
];

/// Assign a category from name, description and tags.
pub fn categorize(name: &str, description: &str, tags: Option<&[String]>) -> SkillCategory {
    let mut text = format!("{name} {description}");
    for tag in tags.unwrap_or_default() {
        text.push(' ');
        text.push_str(tag);
    }
    let text = text.to_lowercase();

    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or(SkillCategory::Other)
}
