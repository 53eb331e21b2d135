//! Catalog of the builtin repository, embedded at compile time.

use serde::Deserialize;

use crate::types::{
    RepositoryReference, SkillCategory, SkillDescriptor, SkillMetadata, descriptor_id,
    install_dir_name,
};

const BUILTIN_JSON: &str = include_str!("../data/builtin_skills.json");

#[derive(Debug, Deserialize)]
struct EmbeddedCatalog {
    repository: String,
    revision: String,
    skills: Vec<EmbeddedSkill>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedSkill {
    path: String,
    name: String,
    description: String,
    category: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Embedded descriptors for `reference`, or `None` when it isn't served from
/// embedded data (custom references, or a builtin pointed at a sub-path).
pub fn embedded_catalog(reference: &RepositoryReference) -> Option<Vec<SkillDescriptor>> {
    if !reference.is_builtin || reference.base_path.is_some() {
        return None;
    }
    let catalog: EmbeddedCatalog = match serde_json::from_str(BUILTIN_JSON) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "embedded builtin catalog is invalid");
            return None;
        },
    };
    if !catalog.repository.eq_ignore_ascii_case(&reference.slug()) {
        return None;
    }

    let revision = reference
        .revision
        .clone()
        .unwrap_or_else(|| catalog.revision.clone());
    let descriptors = catalog
        .skills
        .into_iter()
        .map(|s| {
            let source_path = s.path.trim_matches('/').to_string();
            SkillDescriptor {
                id: descriptor_id(&reference.owner, &reference.name, &source_path),
                name: s.name,
                description: s.description,
                source_reference: reference.slug(),
                reference_id: reference.id.clone(),
                install_path: install_dir_name(&reference.name, &source_path),
                source_path,
                revision: Some(revision.clone()),
                category: SkillCategory::from_name(&s.category),
                long_description: None,
                metadata: Some(SkillMetadata {
                    name: None,
                    description: None,
                    author: s.author,
                    tags: (!s.tags.is_empty()).then_some(s.tags),
                }),
                installed_at: None,
            }
        })
        .collect();
    Some(descriptors)
}
