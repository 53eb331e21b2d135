mod repo_commands;
mod skill_commands;

use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    myskills_skills::SkillsEngine,
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "myskills",
    version,
    about = "Discover, install and create Claude skills"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/myskills/).
    #[arg(long, global = true, env = "MYSKILLS_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
    /// Custom data directory holding catalog snapshots.
    #[arg(long, global = true, env = "MYSKILLS_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Custom skills root (overrides default ~/.claude/skills/).
    #[arg(long, global = true, env = "MYSKILLS_SKILLS_DIR")]
    skills_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every configured repository into the local catalog.
    Sync {
        /// Discard snapshots and re-fetch everything.
        #[arg(long)]
        force: bool,
    },
    /// List the cached catalog.
    Cached {
        /// Only show one category (development, data, writing, ...).
        #[arg(long)]
        category: Option<String>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Scan a single repository and list its skills.
    Catalog { owner: String, repo: String },
    /// List installed skills.
    Installed {
        #[arg(long)]
        json: bool,
    },
    /// Check whether a skill directory exists.
    IsInstalled { name: String },
    /// Install a skill by catalog id (owner/repo/path).
    Install { id: String },
    /// Remove an installed skill.
    Uninstall { name: String },
    /// Print the skills root.
    Dir,
    /// Print an installed skill's SKILL.md.
    Show { name: String },
    /// Repository management.
    Repos {
        #[command(subcommand)]
        action: repo_commands::RepoAction,
    },
    /// Create a new local skill.
    Create(skill_commands::CreateArgs),
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Apply directory overrides, load config and wire the engine.
fn build_engine(cli: &Cli) -> anyhow::Result<Arc<SkillsEngine>> {
    if let Some(ref dir) = cli.config_dir {
        myskills_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        myskills_config::set_data_dir(dir.clone());
    }
    if let Some(ref dir) = cli.skills_dir {
        myskills_config::set_skills_dir(dir.clone());
    }

    let config_path = myskills_config::find_or_default_config_path();
    debug!(path = %config_path.display(), "using config");
    let config = myskills_config::load_or_default(&config_path)?;
    Ok(Arc::new(SkillsEngine::from_config(&config, config_path)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "myskills starting");

    let engine = build_engine(&cli)?;

    match cli.command {
        Commands::Sync { force } => skill_commands::sync(&engine, force).await,
        Commands::Cached { category, json } => {
            skill_commands::cached(&engine, category.as_deref(), json).await
        },
        Commands::Catalog { owner, repo } => skill_commands::catalog(&engine, &owner, &repo).await,
        Commands::Installed { json } => skill_commands::installed(&engine, json).await,
        Commands::IsInstalled { name } => skill_commands::is_installed(&engine, &name).await,
        Commands::Install { id } => skill_commands::install(&engine, &id).await,
        Commands::Uninstall { name } => skill_commands::uninstall(&engine, &name).await,
        Commands::Dir => skill_commands::dir(&engine).await,
        Commands::Show { name } => skill_commands::show(&engine, &name).await,
        Commands::Repos { action } => repo_commands::handle_repos(&engine, action).await,
        Commands::Create(args) => skill_commands::create(&engine, args).await,
    }
}

#[allow(clippy::expect_used, clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "myskills",
            "sync",
            "--force",
            "--log-level",
            "debug",
            "--skills-dir",
            "/tmp/skills",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Sync { force: true }));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.skills_dir, Some(PathBuf::from("/tmp/skills")));
    }

    #[test]
    fn parses_repo_add_with_revision() {
        let cli = Cli::try_parse_from([
            "myskills",
            "repos",
            "add",
            "https://github.com/acme/tools",
            "--revision",
            "v2",
        ])
        .unwrap();
        match cli.command {
            Commands::Repos {
                action: repo_commands::RepoAction::Add {
                    reference,
                    revision,
                },
            } => {
                assert_eq!(reference, "https://github.com/acme/tools");
                assert_eq!(revision.as_deref(), Some("v2"));
            },
            _ => panic!("expected repos add"),
        }
    }

    #[test]
    fn create_collects_repeated_resources() {
        let cli = Cli::try_parse_from([
            "myskills",
            "create",
            "--name",
            "Notes",
            "--description",
            "Take notes",
            "--instructions",
            "Write them down",
            "--resource",
            "a.md",
            "--resource",
            "b.md",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.resource, vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
        assert!(args.examples.is_none());
    }
}
