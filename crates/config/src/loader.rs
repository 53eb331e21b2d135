use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::MySkillsConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "myskills.toml",
    "myskills.yaml",
    "myskills.yml",
    "myskills.json",
];

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);
static DATA_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);
static SKILLS_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

fn read_override(slot: &Mutex<Option<PathBuf>>) -> Option<PathBuf> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write_override(slot: &Mutex<Option<PathBuf>>, value: Option<PathBuf>) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

/// Override the config directory (e.g. from `--config-dir`).
pub fn set_config_dir(dir: PathBuf) {
    write_override(&CONFIG_DIR_OVERRIDE, Some(dir));
}

pub fn clear_config_dir() {
    write_override(&CONFIG_DIR_OVERRIDE, None);
}

/// Override the data directory (e.g. from `--data-dir`).
pub fn set_data_dir(dir: PathBuf) {
    write_override(&DATA_DIR_OVERRIDE, Some(dir));
}

pub fn clear_data_dir() {
    write_override(&DATA_DIR_OVERRIDE, None);
}

/// Override the skills root (e.g. from `--skills-dir`).
pub fn set_skills_dir(dir: PathBuf) {
    write_override(&SKILLS_DIR_OVERRIDE, Some(dir));
}

pub fn clear_skills_dir() {
    write_override(&SKILLS_DIR_OVERRIDE, None);
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "myskills")
}

/// Returns the user-global config directory (`~/.config/myskills/`).
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = read_override(&CONFIG_DIR_OVERRIDE) {
        return Some(dir);
    }
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory (`~/.local/share/myskills/` on Linux).
pub fn data_dir() -> PathBuf {
    if let Some(dir) = read_override(&DATA_DIR_OVERRIDE) {
        return dir;
    }
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".myskills"))
}

/// Directory holding per-repository catalog snapshots.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Root directory installed skills live under.
///
/// Precedence: runtime override, then `skills.dir` from config, then
/// `~/.claude/skills`.
pub fn skills_dir(config: &MySkillsConfig) -> PathBuf {
    if let Some(dir) = read_override(&SKILLS_DIR_OVERRIDE) {
        return dir;
    }
    if let Some(dir) = &config.skills.dir {
        return dir.clone();
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("skills")
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<MySkillsConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    config.ensure_builtins();
    Ok(config)
}

/// Load config from `path`, or return defaults when the file doesn't exist yet.
pub fn load_or_default(path: &Path) -> Result<MySkillsConfig> {
    if !path.exists() {
        return Ok(MySkillsConfig::default());
    }
    load_config(path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./myskills.{toml,yaml,yml,json}` (project-local, skipped when the
///    config dir is overridden)
/// 2. `~/.config/myskills/myskills.{toml,yaml,yml,json}` (user-global)
///
/// Returns `MySkillsConfig::default()` if no config file is found.
pub fn discover_and_load() -> MySkillsConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    MySkillsConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    if read_override(&CONFIG_DIR_OVERRIDE).is_none() {
        for name in CONFIG_FILENAMES {
            let p = PathBuf::from(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("myskills.toml")
}

/// Serialize `config` and write it to the discovered (or default) config path.
///
/// Returns the path written to.
pub fn save_config(config: &MySkillsConfig) -> Result<PathBuf> {
    let path = find_or_default_config_path();
    save_config_to(&path, config)?;
    Ok(path)
}

/// Serialize `config` in the format implied by `path`'s extension and write it
/// atomically.
pub fn save_config_to(path: &Path, config: &MySkillsConfig) -> Result<()> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let serialized = match ext {
        "toml" => toml::to_string_pretty(config)?,
        "yaml" | "yml" => serde_yaml::to_string(config)?,
        "json" => serde_json::to_string_pretty(config)?,
        other => return Err(Error::UnsupportedFormat(other.to_string())),
    };
    myskills_common::fs::write_atomic(path, serialized).map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Load the config at `path`, apply `f`, and write it back.
///
/// Returns whatever `f` returns.
pub fn update_config<T>(path: &Path, f: impl FnOnce(&mut MySkillsConfig) -> T) -> Result<T> {
    let mut config = load_or_default(path)?;
    let out = f(&mut config);
    save_config_to(path, &config)?;
    Ok(out)
}

fn parse_config(raw: &str, path: &Path) -> Result<MySkillsConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat(ext.to_string())),
    }
}
