//! Skill subsystem: activatable instruction bundles.
//!
//! A skill is a directory holding a `SKILL.md` manifest (YAML frontmatter +
//! instruction body) and optional supporting files and hook scripts. Skills
//! are indexed from three layered storage roots, validated on load,
//! activated onto an executor's stack, and expanded into the first ReAct
//! prompt via substitution, command injection, and progressive disclosure.

pub mod context;
pub mod context_loader;
pub mod injector;
pub mod loader;
pub mod substitutor;
pub mod validator;

pub use context::SkillContext;
pub use context_loader::{ContextLoader, FileReference, LoadedContext};
pub use injector::DynamicInjector;
pub use loader::SkillLoader;
pub use substitutor::{StringSubstitutor, SubstitutionContext};
pub use validator::{SkillValidator, ValidationResult};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the skill subsystem.
#[derive(Debug, Error)]
pub enum SkillError {
    /// No skill with the requested name exists in any layer.
    #[error("skill '{0}' not found")]
    NotFound(String),

    /// The skill is already on the activation stack.
    #[error("cannot activate skill '{0}': already active in the stack")]
    AlreadyActive(String),

    /// Deactivation did not target the top of the stack.
    #[error(
        "cannot deactivate skill '{skill_name}': not at top of stack (current top: {stack_top:?})"
    )]
    StackViolation {
        /// The skill the caller tried to deactivate.
        skill_name: String,
        /// The skill actually on top, if any.
        stack_top: Option<String>,
    },

    /// The skill is not active at all.
    #[error("cannot deactivate skill '{0}': not active")]
    NotActive(String),

    /// The active skill does not allow the tool.
    #[error(
        "skill '{skill_name}' cannot use tool '{tool_name}'. Allowed tools: {}",
        allowed_tools.join(", ")
    )]
    ToolNotAllowed {
        /// The restricting skill.
        skill_name: String,
        /// The blocked tool.
        tool_name: String,
        /// The skill's allow-list.
        allowed_tools: Vec<String>,
    },

    /// The active skill's own hook script was targeted by a read.
    #[error(
        "skill '{skill_name}' blocked reading its {script_type} script '{script_path}': \
         hook scripts are executed, not read, for context efficiency"
    )]
    ScriptReadAttempt {
        /// The restricting skill.
        skill_name: String,
        /// Role of the protected script (e.g. "hook").
        script_type: String,
        /// Path of the protected script.
        script_path: String,
    },

    /// The SKILL.md manifest failed validation.
    #[error("skill '{skill_name}' failed validation: {}", errors.join("; "))]
    Invalid {
        /// The offending skill.
        skill_name: String,
        /// Validation errors.
        errors: Vec<String>,
    },

    /// Filesystem failure while loading skills.
    #[error("skill storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// The storage layer a skill was loaded from. Higher-precedence layers
/// shadow lower ones by skill name: project > personal > enterprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLayer {
    /// Repository-local skills, highest precedence.
    Project,
    /// Per-user skills.
    Personal,
    /// Organization-wide skills, lowest precedence.
    Enterprise,
}

impl std::fmt::Display for StorageLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Project => "project",
            Self::Personal => "personal",
            Self::Enterprise => "enterprise",
        };
        write!(f, "{name}")
    }
}

/// Frontmatter metadata of a skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMetadata {
    /// Kebab-case skill name.
    pub name: String,
    /// Third-person description of what the skill does.
    pub description: String,
    /// Tools the skill may invoke while active. `None` means unrestricted.
    pub allowed_tools: Option<Vec<String>>,
    /// License identifier, if declared.
    pub license: Option<String>,
    /// Skill version, if declared.
    pub version: Option<String>,
    /// Preferred model, if declared.
    pub model: Option<String>,
    /// Execution mode hint, if declared.
    pub mode: Option<String>,
}

impl SkillMetadata {
    /// Minimal metadata with a name and description.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            allowed_tools: None,
            license: None,
            version: None,
            model: None,
            mode: None,
        }
    }

    /// Restrict the skill to an allow-list of tools.
    #[must_use]
    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }
}

/// A loaded, validated skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Frontmatter metadata.
    pub metadata: SkillMetadata,
    /// The instruction body (manifest content after the frontmatter).
    pub content: String,
    /// Path of the SKILL.md manifest.
    pub path: PathBuf,
    /// The skill's base directory (supporting files live beneath it).
    pub base_path: PathBuf,
    /// The layer the skill was loaded from.
    pub storage_layer: StorageLayer,
    /// Hook scripts by role (e.g. "pre", "post"), absolute paths.
    pub script_paths: BTreeMap<String, PathBuf>,
}

impl Skill {
    /// Build a skill from metadata and content, rooted at `base_path`.
    #[must_use]
    pub fn new(
        metadata: SkillMetadata,
        content: impl Into<String>,
        base_path: impl Into<PathBuf>,
        storage_layer: StorageLayer,
    ) -> Self {
        let base_path = base_path.into();
        Self {
            metadata,
            content: content.into(),
            path: base_path.join("SKILL.md"),
            base_path,
            storage_layer,
            script_paths: BTreeMap::new(),
        }
    }

    /// Attach a hook script.
    #[must_use]
    pub fn with_script(mut self, role: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.script_paths.insert(role.into(), path.into());
        self
    }

    /// The skill's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// Summary entry of an indexed skill, as listed by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSummary {
    /// Skill name.
    pub name: String,
    /// Skill description.
    pub description: String,
    /// Layer the skill resolves from.
    pub storage_layer: StorageLayer,
}
