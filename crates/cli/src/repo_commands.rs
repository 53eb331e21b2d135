use {
    anyhow::{Result, bail},
    clap::Subcommand,
    myskills_skills::{RepositoryReference, SkillsEngine, SkillsService, reference},
};

#[derive(Subcommand)]
pub enum RepoAction {
    /// List configured repositories.
    List,
    /// Add a repository: `owner/repo`, a GitHub URL, or a git@ remote.
    Add {
        reference: String,
        /// Branch, tag or commit to scan instead of the default branch.
        #[arg(long)]
        revision: Option<String>,
    },
    /// Remove a custom repository by id.
    Remove { id: String },
}

pub async fn handle_repos(engine: &SkillsEngine, action: RepoAction) -> Result<()> {
    match action {
        RepoAction::List => list(engine).await,
        RepoAction::Add {
            reference,
            revision,
        } => add(engine, &reference, revision.as_deref()).await,
        RepoAction::Remove { id } => remove(engine, &id).await,
    }
}

async fn list(engine: &SkillsEngine) -> Result<()> {
    for repo in engine.list_repositories().await? {
        println!("{}", describe(&repo));
    }
    Ok(())
}

async fn add(engine: &SkillsEngine, input: &str, revision: Option<&str>) -> Result<()> {
    let added = match revision {
        Some(revision) => {
            let parsed = reference::resolve(input)?;
            engine
                .add_repository(
                    &parsed.owner,
                    &parsed.name,
                    parsed.base_path.as_deref(),
                    Some(revision),
                )
                .await?
        },
        None => engine.resolve_and_add_repository(input).await?,
    };
    println!("Added {}", describe(&added));
    Ok(())
}

async fn remove(engine: &SkillsEngine, id: &str) -> Result<()> {
    if !engine.remove_repository(id).await? {
        bail!("no custom repository with id '{id}' (builtin repositories cannot be removed)");
    }
    println!("Removed {id}.");
    Ok(())
}

fn describe(repo: &RepositoryReference) -> String {
    let mut line = format!("{:<28} {}", repo.id, repo.slug());
    if let Some(base) = &repo.base_path {
        line.push_str(&format!("/{base}"));
    }
    if let Some(revision) = &repo.revision {
        line.push_str(&format!(" @{revision}"));
    }
    if repo.is_builtin {
        line.push_str(" (builtin)");
    }
    if let Some(count) = repo.item_count {
        line.push_str(&format!(", {count} skills"));
    }
    if let Some(at) = &repo.last_synced_at {
        line.push_str(&format!(", synced {at}"));
    }
    line
}
