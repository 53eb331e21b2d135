//! Pure name and path cleaning. No filesystem access.

use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
};

use crate::error::InstallError;

/// Directory custom-skill resources are placed under.
pub const RESOURCES_DIR: &str = "resources";

/// Turn a display name into a directory name: lowercase, spaces to hyphens,
/// only `[a-z0-9_-]` kept, hyphen runs collapsed and trimmed.
pub fn slugify(name: &str) -> Option<String> {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().to_lowercase().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
            continue;
        }
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    let slug = slug.trim_matches('-');
    (!slug.is_empty()).then(|| slug.to_string())
}

/// Check a path received from a remote listing before joining it onto an
/// install directory. Absolute paths and `..` are rejected.
pub fn validate_relative_path(path: &str) -> Result<PathBuf, InstallError> {
    let candidate = Path::new(path);
    if path.trim().is_empty() {
        return Err(InstallError::InvalidPath(path.to_string()));
    }
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(InstallError::InvalidPath(path.to_string()));
            },
        }
    }
    Ok(candidate.components().collect())
}

/// Longest resource file name kept, in bytes. Leaves room for a collision
/// suffix under the usual 255-byte limit.
pub const MAX_SEGMENT_BYTES: usize = 240;

/// Characters no platform accepts in a file name.
const DISALLOWED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Normalize a user-supplied resource path.
///
/// Backslashes become `/`, leading slashes and `.` segments are dropped,
/// control characters and `<>:"|?*` are removed, and each segment is capped
/// at [`MAX_SEGMENT_BYTES`] keeping its extension. Returns `None` for paths
/// that are empty after cleaning or contain `..` or a drive prefix.
pub fn clean_resource_path(input: &str) -> Option<String> {
    let normalized = input.replace('\\', "/");
    let mut segments = Vec::new();
    for raw in normalized.split('/') {
        if segments.is_empty() && is_drive_prefix(raw.trim()) {
            return None;
        }
        let segment: String = raw
            .chars()
            .filter(|c| !c.is_control() && !DISALLOWED.contains(c))
            .collect();
        match segment.trim() {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(cap_segment(s)),
        }
    }
    (!segments.is_empty()).then(|| segments.join("/"))
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn cap_segment(segment: &str) -> String {
    if segment.len() <= MAX_SEGMENT_BYTES {
        return segment.to_string();
    }
    let ext = match segment.rfind('.') {
        Some(idx) if idx > 0 && segment.len() - idx <= 16 => &segment[idx..],
        _ => "",
    };
    let mut end = MAX_SEGMENT_BYTES - ext.len();
    while !segment.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{ext}", &segment[..end])
}

/// Return `path`, or `stem-N.ext` for the smallest `N` not in `taken`.
pub fn dedupe_path(path: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(path) {
        return path.to_string();
    }
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(idx) if idx > 0 => (&file[..idx], Some(&file[idx + 1..])),
        _ => (file, None),
    };
    (1..)
        .map(|n| {
            let name = match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            };
            match dir {
                Some(dir) => format!("{dir}/{name}"),
                None => name,
            }
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| path.to_string())
}

/// Files installed with mode 0o755: anything under `scripts/`, or ending in
/// `.sh` / `.command`.
pub fn is_executable_path(relative: &str) -> bool {
    let relative = relative.replace('\\', "/");
    relative.split('/').any(|seg| seg == "scripts")
        || relative.ends_with(".sh")
        || relative.ends_with(".command")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("My Cool Skill", Some("my-cool-skill"))]
    #[case("  spaced   out  ", Some("spaced-out"))]
    #[case("PDF_tools v2!", Some("pdf_tools-v2"))]
    #[case("--edge--", Some("edge"))]
    #[case("émoji 🎉 only", Some("moji-only"))]
    #[case("!!!", None)]
    #[case("", None)]
    fn slugs(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(slugify(input).as_deref(), expected);
    }

    #[rstest]
    #[case("SKILL.md", true)]
    #[case("scripts/run.sh", true)]
    #[case("./docs/guide.md", true)]
    #[case("", false)]
    #[case("/etc/passwd", false)]
    #[case("../escape.txt", false)]
    #[case("docs/../../escape.txt", false)]
    fn relative_paths(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(validate_relative_path(input).is_ok(), ok, "{input}");
    }

    #[rstest]
    #[case("notes.txt", Some("notes.txt"))]
    #[case("/abs/notes.txt", Some("abs/notes.txt"))]
    #[case("dir\\sub\\file.py", Some("dir/sub/file.py"))]
    #[case("./a//b/./c", Some("a/b/c"))]
    #[case("a/../b", None)]
    #[case("C:/windows/file", None)]
    #[case("\\\\d:\\x.txt", None)]
    #[case("  /  ", None)]
    #[case("re<po>rt?.md", Some("report.md"))]
    #[case("notes:v2.txt", Some("notesv2.txt"))]
    #[case("docs/\"quoted\"|*.md", Some("docs/quoted.md"))]
    #[case("a/.?./b", None)]
    #[case("???", None)]
    fn resource_paths(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_resource_path(input).as_deref(), expected);
    }

    #[test]
    fn long_segments_are_capped_keeping_extension() {
        let long = format!("{}.md", "a".repeat(400));
        let cleaned = clean_resource_path(&long).unwrap();
        assert_eq!(cleaned.len(), MAX_SEGMENT_BYTES);
        assert!(cleaned.ends_with("a.md"));

        let nested = format!("dir/{}", "é".repeat(200));
        let cleaned = clean_resource_path(&nested).unwrap();
        let file = cleaned.strip_prefix("dir/").unwrap();
        assert!(file.len() <= MAX_SEGMENT_BYTES);
        assert!(file.chars().all(|c| c == 'é'));

        let short = "x".repeat(MAX_SEGMENT_BYTES);
        assert_eq!(clean_resource_path(&short).unwrap(), short);
    }

    #[test]
    fn dedupe_appends_counter_before_extension() {
        let mut taken = HashSet::new();
        assert_eq!(dedupe_path("notes.txt", &taken), "notes.txt");
        taken.insert("notes.txt".to_string());
        assert_eq!(dedupe_path("notes.txt", &taken), "notes-1.txt");
        taken.insert("notes-1.txt".to_string());
        assert_eq!(dedupe_path("notes.txt", &taken), "notes-2.txt");

        taken.insert("dir/.env".to_string());
        assert_eq!(dedupe_path("dir/.env", &taken), "dir/.env-1");
        taken.insert("Makefile".to_string());
        assert_eq!(dedupe_path("Makefile", &taken), "Makefile-1");
    }

    #[test]
    fn executable_detection() {
        assert!(is_executable_path("scripts/helper.py"));
        assert!(is_executable_path("bin/setup.sh"));
        assert!(is_executable_path("Launch.command"));
        assert!(!is_executable_path("SKILL.md"));
        assert!(!is_executable_path("myscripts/x.py"));
    }
}
