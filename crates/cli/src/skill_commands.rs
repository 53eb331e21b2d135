use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    clap::Args,
    myskills_skills::{
        CreateSkillFile, SkillCategory, SkillDescriptor, SkillsEngine, SkillsService, SyncResult,
    },
};

#[derive(Args)]
pub struct CreateArgs {
    /// Display name; the directory name is derived from it.
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub instructions: String,
    #[arg(long)]
    pub examples: Option<String>,
    /// File to copy into the skill's resources/ directory. Repeatable.
    #[arg(long)]
    pub resource: Vec<PathBuf>,
}

pub async fn sync(engine: &SkillsEngine, force: bool) -> Result<()> {
    let result = if force {
        engine.force_sync_repositories().await?
    } else {
        engine.sync_repositories().await?
    };
    report_sync(&result);
    Ok(())
}

fn report_sync(result: &SyncResult) {
    if result.rate_limited {
        eprintln!("warning: {}", result.message);
    } else if result.success {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
    }
}

/// The catalog lives in memory, so listing it runs a cache-first sync that
/// is served from snapshots whenever they exist.
pub async fn cached(engine: &SkillsEngine, category: Option<&str>, json: bool) -> Result<()> {
    let result = engine.sync_repositories().await?;
    if !result.success {
        eprintln!("{}", result.message);
    }

    let filter = category.map(SkillCategory::from_name);
    let skills: Vec<SkillDescriptor> = engine
        .get_cached_skills()
        .await?
        .into_iter()
        .filter(|s| filter.is_none_or(|c| s.category == c))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&skills)?);
    } else {
        print_descriptors(&skills);
    }
    Ok(())
}

pub async fn catalog(engine: &SkillsEngine, owner: &str, repo: &str) -> Result<()> {
    let skills = engine.fetch_catalog(owner, repo).await?;
    print_descriptors(&skills);
    Ok(())
}

fn print_descriptors(skills: &[SkillDescriptor]) {
    if skills.is_empty() {
        println!("No skills found.");
        return;
    }
    for skill in skills {
        println!(
            "  {} {}  [{}]\n      {}",
            skill.category.icon(),
            skill.id,
            skill.category.label(),
            skill.description
        );
    }
    println!("\n{} skills", skills.len());
}

pub async fn installed(engine: &SkillsEngine, json: bool) -> Result<()> {
    let records = engine.list_installed_skills().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No skills installed.");
        return Ok(());
    }
    for record in &records {
        println!("  {:<32} {}", record.id, record.description);
    }
    Ok(())
}

pub async fn is_installed(engine: &SkillsEngine, name: &str) -> Result<()> {
    println!("{}", engine.is_skill_installed(name).await?);
    Ok(())
}

pub async fn install(engine: &SkillsEngine, id: &str) -> Result<()> {
    let result = engine.sync_repositories().await?;
    if !result.success {
        eprintln!("{}", result.message);
    }
    let path = engine
        .install_skill(id)
        .await
        .with_context(|| format!("failed to install '{id}'"))?;
    println!("Installed {id} to {}", path.display());
    Ok(())
}

pub async fn uninstall(engine: &SkillsEngine, name: &str) -> Result<()> {
    engine.uninstall_skill(name).await?;
    println!("Removed {name}.");
    Ok(())
}

pub async fn dir(engine: &SkillsEngine) -> Result<()> {
    println!("{}", engine.get_skills_directory().await?.display());
    Ok(())
}

pub async fn show(engine: &SkillsEngine, name: &str) -> Result<()> {
    print!("{}", engine.get_skill_content(name).await?);
    Ok(())
}

pub async fn create(engine: &SkillsEngine, args: CreateArgs) -> Result<()> {
    let mut resources = Vec::with_capacity(args.resource.len());
    for path in &args.resource {
        resources.push(read_resource(path).await?);
    }
    let path = engine
        .create_custom_skill(
            &args.name,
            &args.description,
            &args.instructions,
            args.examples.as_deref(),
            resources,
        )
        .await?;
    println!("Created {}", path.display());
    Ok(())
}

async fn read_resource(path: &Path) -> Result<CreateSkillFile> {
    let relative_path = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(CreateSkillFile {
        relative_path,
        content,
    })
}
