//! Configuration loading, env substitution, and per-user directory resolution.
//!
//! Config files: `myskills.toml`, `myskills.yaml`, or `myskills.json`
//! Searched in `./` then `~/.config/myskills/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{
        cache_dir, clear_config_dir, clear_data_dir, clear_skills_dir, config_dir, data_dir,
        discover_and_load, find_or_default_config_path, load_config, load_or_default,
        save_config, save_config_to, set_config_dir, set_data_dir, set_skills_dir, skills_dir,
        update_config,
    },
    schema::{
        GithubConfig, MySkillsConfig, RepositoryReference, SkillsConfig, SyncConfig,
        builtin_repositories,
    },
};
