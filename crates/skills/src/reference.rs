//! Turn user input into a canonical [`RepositoryReference`].
//!
//! Accepted forms:
//! - `owner/name[/sub/path]`
//! - `[https://][www.]github.com/owner/name[/(tree|blob)/<rev>/<path>]`
//! - `https://raw.githubusercontent.com/owner/name/<rev>/<path>`
//! - `git@github.com:owner/name.git`

use url::Url;

use crate::{error::ParseError, types::RepositoryReference};

const DESCRIPTOR_FILE: &str = "SKILL.md";

/// Resolve `input` into a reference. Pure, no network.
pub fn resolve(input: &str) -> Result<RepositoryReference, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(rest) = trimmed.strip_prefix("git@") {
        return resolve_ssh(trimmed, rest);
    }

    if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|e| ParseError::malformed(trimmed, e.to_string()))?;
        return resolve_url(trimmed, &url);
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("github.com/") || lower.starts_with("www.github.com/") {
        let url = Url::parse(&format!("https://{trimmed}"))
            .map_err(|e| ParseError::malformed(trimmed, e.to_string()))?;
        return resolve_url(trimmed, &url);
    }

    resolve_bare(trimmed)
}

fn resolve_bare(input: &str) -> Result<RepositoryReference, ParseError> {
    if input.chars().any(char::is_whitespace) {
        return Err(ParseError::malformed(input, "whitespace is not allowed"));
    }
    let path = strip_query_and_fragment(input);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(ParseError::malformed(input, "expected 'owner/name'"));
    }
    build(input, segments[0], segments[1], &segments[2..], None)
}

fn resolve_url(input: &str, url: &Url) -> Result<RepositoryReference, ParseError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ParseError::malformed(
            input,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    match host.as_str() {
        "github.com" | "www.github.com" => {
            if segments.len() < 2 {
                return Err(ParseError::malformed(input, "expected '/owner/name' in URL"));
            }
            match segments.get(2) {
                Some(&("tree" | "blob")) => {
                    let revision = segments
                        .get(3)
                        .ok_or_else(|| ParseError::malformed(input, "missing revision"))?;
                    build(
                        input,
                        segments[0],
                        segments[1],
                        &segments[4..],
                        Some(*revision),
                    )
                },
                _ => build(input, segments[0], segments[1], &[], None),
            }
        },
        "raw.githubusercontent.com" => {
            if segments.len() < 3 {
                return Err(ParseError::malformed(
                    input,
                    "expected '/owner/name/<revision>/<path>'",
                ));
            }
            build(
                input,
                segments[0],
                segments[1],
                &segments[3..],
                Some(segments[2]),
            )
        },
        other => Err(ParseError::UnsupportedHost(other.to_string())),
    }
}

fn resolve_ssh(input: &str, rest: &str) -> Result<RepositoryReference, ParseError> {
    let (host, path) = rest
        .split_once(':')
        .ok_or_else(|| ParseError::malformed(input, "expected 'git@github.com:owner/name.git'"))?;
    if !host.eq_ignore_ascii_case("github.com") {
        return Err(ParseError::UnsupportedHost(host.to_string()));
    }
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if segments.len() != 2 {
        return Err(ParseError::malformed(
            input,
            "ssh references cannot carry a path or revision",
        ));
    }
    build(input, segments[0], segments[1], &[], None)
}

fn build(
    input: &str,
    owner: &str,
    name: &str,
    path: &[&str],
    revision: Option<&str>,
) -> Result<RepositoryReference, ParseError> {
    let name = name.strip_suffix(".git").unwrap_or(name);
    validate_segment(input, "owner", owner)?;
    validate_segment(input, "name", name)?;

    let mut path = path.to_vec();
    if path
        .last()
        .is_some_and(|last| last.eq_ignore_ascii_case(DESCRIPTOR_FILE))
    {
        path.pop();
    }
    let base_path = path.join("/").trim_matches('/').to_string();
    let base_path = (!base_path.is_empty()).then_some(base_path);
    let revision = revision
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(RepositoryReference::custom(owner, name, base_path, revision))
}

fn validate_segment(input: &str, what: &str, segment: &str) -> Result<(), ParseError> {
    let valid = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ParseError::malformed(
            input,
            format!("invalid {what} '{segment}'"),
        ))
    }
}

fn strip_query_and_fragment(input: &str) -> &str {
    input
        .split_once(['?', '#'])
        .map(|(head, _)| head)
        .unwrap_or(input)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("octocat/hello-world", "octocat", "hello-world", None, None)]
    #[case("  octocat/hello-world/  ", "octocat", "hello-world", None, None)]
    #[case("octocat/hello-world.git", "octocat", "hello-world", None, None)]
    #[case("anthropics/skills/document-skills/pdf", "anthropics", "skills", Some("document-skills/pdf"), None)]
    #[case("anthropics/skills/pdf/SKILL.md", "anthropics", "skills", Some("pdf"), None)]
    #[case("octocat/hello-world?tab=readme#top", "octocat", "hello-world", None, None)]
    #[case("https://github.com/octocat/hello-world", "octocat", "hello-world", None, None)]
    #[case("http://www.github.com/octocat/hello-world.git/", "octocat", "hello-world", None, None)]
    #[case("github.com/octocat/hello-world", "octocat", "hello-world", None, None)]
    #[case("https://github.com/octocat/hello-world/tree/main/skills/foo", "octocat", "hello-world", Some("skills/foo"), Some("main"))]
    #[case("https://github.com/octocat/hello-world/blob/v1.2/skills/foo/SKILL.md", "octocat", "hello-world", Some("skills/foo"), Some("v1.2"))]
    #[case("https://github.com/octocat/hello-world/tree/main", "octocat", "hello-world", None, Some("main"))]
    #[case("https://github.com/octocat/hello-world/issues/12", "octocat", "hello-world", None, None)]
    #[case("https://raw.githubusercontent.com/o/r/main/skills/foo/SKILL.md", "o", "r", Some("skills/foo"), Some("main"))]
    #[case("git@github.com:octocat/hello-world.git", "octocat", "hello-world", None, None)]
    fn resolves(
        #[case] input: &str,
        #[case] owner: &str,
        #[case] name: &str,
        #[case] base_path: Option<&str>,
        #[case] revision: Option<&str>,
    ) {
        let r = resolve(input).unwrap();
        assert_eq!(r.owner, owner);
        assert_eq!(r.name, name);
        assert_eq!(r.base_path.as_deref(), base_path);
        assert_eq!(r.revision.as_deref(), revision);
        assert!(!r.is_builtin);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("not a url")]
    #[case("onlyoneseg")]
    #[case("owner/")]
    #[case("own er/repo")]
    #[case("owner/re$po")]
    #[case("https://gitlab.com/owner/repo")]
    #[case("https://github.com/owner")]
    #[case("https://github.com/owner/repo/tree")]
    #[case("https://raw.githubusercontent.com/o/r")]
    #[case("ftp://github.com/owner/repo")]
    #[case("git@github.com:owner/repo/extra.git")]
    #[case("git@gitlab.com:owner/repo.git")]
    #[case("https://")]
    fn rejects(#[case] input: &str) {
        assert!(resolve(input).is_err(), "{input:?} should not resolve");
    }

    #[test]
    fn unsupported_host_is_reported() {
        assert_eq!(
            resolve("https://bitbucket.org/a/b").unwrap_err(),
            ParseError::UnsupportedHost("bitbucket.org".into())
        );
    }

    #[test]
    fn derived_id_includes_base_path() {
        let r = resolve("https://github.com/Anthropics/Skills/tree/main/document-skills").unwrap();
        assert_eq!(r.id, "anthropics-skills-document-skills");
        assert_eq!(r.slug(), "Anthropics/Skills");
    }
}
