//! Layered skill loading.
//!
//! Skills live in per-layer storage roots (project, personal, enterprise);
//! each skill is a directory containing a `SKILL.md` manifest. The loader
//! indexes all roots, resolving name collisions by layer precedence
//! (project shadows personal shadows enterprise), and validates manifests
//! on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::Value as YamlValue;
use tracing::{debug, warn};

use super::validator::SkillValidator;
use super::{Skill, SkillError, SkillMetadata, SkillSummary, StorageLayer};
use crate::config::PlatformConfig;

/// One storage root with its layer.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    /// Layer of the root.
    pub layer: StorageLayer,
    /// Directory holding skill directories.
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    layer: StorageLayer,
    base_path: PathBuf,
    description: String,
}

/// Indexes and loads skills from layered storage roots.
#[derive(Debug)]
pub struct SkillLoader {
    roots: Vec<StorageRoot>,
    validator: SkillValidator,
    index: BTreeMap<String, IndexEntry>,
}

impl SkillLoader {
    /// Loader over explicit storage roots.
    #[must_use]
    pub fn new(roots: Vec<StorageRoot>) -> Self {
        Self {
            roots,
            validator: SkillValidator::new(),
            index: BTreeMap::new(),
        }
    }

    /// Loader over the roots named by the platform configuration.
    #[must_use]
    pub fn from_config(config: &PlatformConfig) -> Self {
        let mut roots = Vec::new();
        if let Some(path) = &config.skills_project_dir {
            roots.push(StorageRoot {
                layer: StorageLayer::Project,
                path: path.clone(),
            });
        }
        if let Some(path) = &config.skills_personal_dir {
            roots.push(StorageRoot {
                layer: StorageLayer::Personal,
                path: path.clone(),
            });
        }
        if let Some(path) = &config.skills_enterprise_dir {
            roots.push(StorageRoot {
                layer: StorageLayer::Enterprise,
                path: path.clone(),
            });
        }
        Self::new(roots)
    }

    /// Scan all roots and rebuild the index. Returns the number of skills
    /// indexed after precedence resolution.
    pub fn build_index(&mut self) -> Result<usize, SkillError> {
        self.index.clear();
        for root in &self.roots {
            if !root.path.is_dir() {
                debug!(path = %root.path.display(), layer = %root.layer, "Skill root missing, skipping");
                continue;
            }
            for entry in std::fs::read_dir(&root.path)? {
                let entry = entry?;
                let base_path = entry.path();
                let manifest = base_path.join("SKILL.md");
                if !manifest.is_file() {
                    continue;
                }
                let Some(name) = base_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let description = peek_description(&manifest).unwrap_or_default();
                let candidate = IndexEntry {
                    layer: root.layer,
                    base_path: base_path.clone(),
                    description,
                };
                match self.index.get(name) {
                    // Lower enum order means higher precedence.
                    Some(existing) if existing.layer <= candidate.layer => {}
                    _ => {
                        self.index.insert(name.to_string(), candidate);
                    }
                }
            }
        }
        Ok(self.index.len())
    }

    /// Summaries of all indexed skills, sorted by name.
    #[must_use]
    pub fn list_skills(&self) -> Vec<SkillSummary> {
        self.index
            .iter()
            .map(|(name, entry)| SkillSummary {
                name: name.clone(),
                description: entry.description.clone(),
                storage_layer: entry.layer,
            })
            .collect()
    }

    /// Names of all indexed skills.
    #[must_use]
    pub fn skill_names(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    /// Load and validate a skill by name.
    pub fn load_skill(&self, name: &str) -> Result<Skill, SkillError> {
        let entry = self
            .index
            .get(name)
            .ok_or_else(|| SkillError::NotFound(name.to_string()))?;
        let manifest_path = entry.base_path.join("SKILL.md");
        let content = std::fs::read_to_string(&manifest_path)?;

        let mut result = super::ValidationResult::default();
        let parsed = self
            .validator
            .parse_manifest(&content, &mut result)
            .ok_or_else(|| SkillError::Invalid {
                skill_name: name.to_string(),
                errors: result.errors.clone(),
            })?;

        let validation = self.validator.validate(&content, name);
        for warning in &validation.warnings {
            warn!(skill_name = name, warning, "Skill validation warning");
        }
        if !validation.is_valid() {
            return Err(SkillError::Invalid {
                skill_name: name.to_string(),
                errors: validation.errors,
            });
        }

        let metadata = metadata_from_frontmatter(name, &parsed.frontmatter);
        let mut skill = Skill {
            metadata,
            content: parsed.body,
            path: manifest_path,
            base_path: entry.base_path.clone(),
            storage_layer: entry.layer,
            script_paths: BTreeMap::new(),
        };
        skill.script_paths = resolve_hooks(&parsed.frontmatter, &entry.base_path);
        Ok(skill)
    }
}

/// Read just the description line out of a manifest for index listings.
fn peek_description(manifest: &Path) -> Option<String> {
    let content = std::fs::read_to_string(manifest).ok()?;
    let mut result = super::ValidationResult::default();
    let parsed = SkillValidator::new().parse_manifest(&content, &mut result)?;
    parsed
        .frontmatter
        .get("description")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn metadata_from_frontmatter(
    name: &str,
    frontmatter: &BTreeMap<String, YamlValue>,
) -> SkillMetadata {
    let scalar = |key: &str| {
        frontmatter
            .get(key)
            .and_then(YamlValue::as_str)
            .map(str::to_string)
    };
    let allowed_tools = scalar("allowed-tools").map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    });
    SkillMetadata {
        name: name.to_string(),
        description: scalar("description").unwrap_or_default(),
        allowed_tools,
        license: scalar("license"),
        version: scalar("version"),
        model: scalar("model"),
        mode: scalar("mode"),
    }
}

/// Resolve `hooks:` frontmatter (role -> relative script path) against the
/// skill's base directory.
fn resolve_hooks(
    frontmatter: &BTreeMap<String, YamlValue>,
    base_path: &Path,
) -> BTreeMap<String, PathBuf> {
    let mut scripts = BTreeMap::new();
    if let Some(YamlValue::Mapping(hooks)) = frontmatter.get("hooks") {
        for (role, path) in hooks {
            if let (Some(role), Some(path)) = (role.as_str(), path.as_str()) {
                let resolved = if Path::new(path).is_absolute() {
                    PathBuf::from(path)
                } else {
                    base_path.join(path)
                };
                scripts.insert(role.to_string(), resolved);
            }
        }
    }
    scripts
}
