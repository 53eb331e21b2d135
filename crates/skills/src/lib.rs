//! Skills engine: reference resolution, remote catalog sync, caching, and
//! installation.
//!
//! Skills are directories containing a `SKILL.md` file with YAML frontmatter
//! and markdown instructions. They are discovered in remote GitHub
//! repositories, cached locally, and installed under the skills root
//! (`~/.claude/skills` by default).

pub mod builtin;
pub mod cache;
pub mod client;
pub mod error;
pub mod fetch;
pub mod install;
pub mod parse;
pub mod reference;
pub mod repos;
pub mod sanitize;
pub mod service;
pub mod sync;
pub mod types;

pub use {
    error::{ClientError, Error, FetchError, InstallError, ParseError, Result},
    service::{SkillsEngine, SkillsService},
    types::{
        CreateSkillFile, InstalledSkillRecord, RepositoryReference, SkillCategory,
        SkillDescriptor, SkillMetadata, SyncResult,
    },
};
