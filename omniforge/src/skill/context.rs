//! Scoped restriction context for an active skill.
//!
//! A [`SkillContext`] is created when a skill is pushed onto the executor's
//! activation stack and dropped when the skill is deactivated; its lifetime
//! bounds the window in which the skill's restrictions apply.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use super::{Skill, SkillError};
use crate::tool::JsonObject;

/// Restriction view over one active skill.
///
/// Holds the lowercase allow-set derived from the skill's `allowed_tools`
/// and the skill's hook-script paths. The set lives only as long as the
/// context; deactivation drops it, clearing the restrictions.
#[derive(Debug)]
pub struct SkillContext {
    skill_name: String,
    allowed_tools: Option<Vec<String>>,
    allowed_lower: Option<HashSet<String>>,
    script_paths: BTreeMap<String, PathBuf>,
}

impl SkillContext {
    /// Build the restriction context for a skill at activation time.
    #[must_use]
    pub fn new(skill: &Skill) -> Self {
        let allowed_lower = skill
            .metadata
            .allowed_tools
            .as_ref()
            .map(|tools| tools.iter().map(|t| t.to_lowercase()).collect());
        Self {
            skill_name: skill.metadata.name.clone(),
            allowed_tools: skill.metadata.allowed_tools.clone(),
            allowed_lower,
            script_paths: skill.script_paths.clone(),
        }
    }

    /// Name of the skill this context restricts for.
    #[must_use]
    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }

    /// Whether the skill carries a tool allow-list at all.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.allowed_lower.is_some()
    }

    /// The lowercase allow-set, or `None` when the skill is unrestricted.
    #[must_use]
    pub fn allowed_tool_names(&self) -> Option<&HashSet<String>> {
        self.allowed_lower.as_ref()
    }

    /// Check that the skill allows invoking `tool_name`.
    ///
    /// Matching is case-insensitive. Scoped entries like `Bash(git:*)`
    /// authorize their base tool name for direct invocation; the argument
    /// scope is enforced by the dynamic injector for pre-executed commands.
    pub fn check_tool_allowed(&self, tool_name: &str) -> Result<(), SkillError> {
        let Some(allowed) = &self.allowed_lower else {
            return Ok(());
        };
        let wanted = tool_name.to_lowercase();
        let permitted = allowed.iter().any(|entry| {
            entry == &wanted
                || entry
                    .split_once('(')
                    .is_some_and(|(base, _)| base == wanted)
        });
        if permitted {
            Ok(())
        } else {
            Err(SkillError::ToolNotAllowed {
                skill_name: self.skill_name.clone(),
                tool_name: tool_name.to_string(),
                allowed_tools: self.allowed_tools.clone().unwrap_or_default(),
            })
        }
    }

    /// Check argument-level restrictions for a tool call.
    ///
    /// The only rule: a read-class tool must not target one of the skill's
    /// own hook scripts. Scripts are executed by the platform, never read
    /// into model context.
    pub fn check_tool_arguments(
        &self,
        tool_name: &str,
        arguments: &JsonObject,
    ) -> Result<(), SkillError> {
        if !tool_name.eq_ignore_ascii_case("read") {
            return Ok(());
        }
        let Some(file_path) = arguments.get("file_path").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        for script_path in self.script_paths.values() {
            if script_path == &PathBuf::from(file_path) {
                return Err(SkillError::ScriptReadAttempt {
                    skill_name: self.skill_name.clone(),
                    script_type: "hook".to_string(),
                    script_path: script_path.display().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::{SkillMetadata, StorageLayer};
    use crate::tool::arguments;

    fn restricted_skill() -> Skill {
        Skill::new(
            SkillMetadata::new("test-skill", "A test skill.").with_allowed_tools(vec![
                "Bash".to_string(),
                "Read".to_string(),
            ]),
            "# Test",
            "/skills/test-skill",
            StorageLayer::Project,
        )
    }

    #[test]
    fn allowed_tools_pass_case_insensitively() {
        let context = SkillContext::new(&restricted_skill());
        for name in ["bash", "BASH", "BaSh", "read", "READ"] {
            context.check_tool_allowed(name).expect("should be allowed");
        }
    }

    #[test]
    fn disallowed_tool_raises_with_allow_list() {
        let context = SkillContext::new(&restricted_skill());
        let err = context
            .check_tool_allowed("Write")
            .expect_err("must be blocked");
        match err {
            SkillError::ToolNotAllowed {
                skill_name,
                tool_name,
                allowed_tools,
            } => {
                assert_eq!(skill_name, "test-skill");
                assert_eq!(tool_name, "Write");
                assert_eq!(allowed_tools, vec!["Bash", "Read"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The rendered message names the blocked tool and the allow-list.
        let context = SkillContext::new(&restricted_skill());
        let message = context
            .check_tool_allowed("Write")
            .expect_err("blocked")
            .to_string();
        assert!(message.contains("Write"));
        assert!(message.contains("Bash, Read"));
    }

    #[test]
    fn unrestricted_skill_allows_everything() {
        let skill = Skill::new(
            SkillMetadata::new("open-skill", "No restrictions."),
            "# Test",
            "/skills/open-skill",
            StorageLayer::Project,
        );
        let context = SkillContext::new(&skill);
        assert!(!context.is_restricted());
        assert!(context.allowed_tool_names().is_none());
        context.check_tool_allowed("AnyTool").expect("allowed");
    }

    #[test]
    fn scoped_bash_entry_authorizes_bash() {
        let skill = Skill::new(
            SkillMetadata::new("scoped", "Scoped bash.")
                .with_allowed_tools(vec!["Bash(git:*)".to_string()]),
            "# Test",
            "/skills/scoped",
            StorageLayer::Project,
        );
        let context = SkillContext::new(&skill);
        context.check_tool_allowed("bash").expect("allowed");
        assert!(context.check_tool_allowed("write").is_err());
    }

    #[test]
    fn read_of_hook_script_is_blocked() {
        let skill = restricted_skill().with_script("pre", "/skills/test-skill/scripts/pre.sh");
        let context = SkillContext::new(&skill);

        let err = context
            .check_tool_arguments(
                "Read",
                &arguments(serde_json::json!({"file_path": "/skills/test-skill/scripts/pre.sh"})),
            )
            .expect_err("must block");
        let message = err.to_string();
        assert!(message.to_lowercase().contains("hook scripts"));
        assert!(message.to_lowercase().contains("context efficiency"));

        // Case variations of the tool name still trigger the check.
        for name in ["read", "READ", "ReAd"] {
            assert!(context
                .check_tool_arguments(
                    name,
                    &arguments(
                        serde_json::json!({"file_path": "/skills/test-skill/scripts/pre.sh"})
                    ),
                )
                .is_err());
        }
    }

    #[test]
    fn read_of_other_files_is_allowed() {
        let skill = restricted_skill().with_script("pre", "/skills/test-skill/scripts/pre.sh");
        let context = SkillContext::new(&skill);
        context
            .check_tool_arguments(
                "Read",
                &arguments(serde_json::json!({"file_path": "/skills/test-skill/SKILL.md"})),
            )
            .expect("allowed");
        // Missing file_path is not the context's problem.
        context
            .check_tool_arguments("Read", &arguments(serde_json::json!({})))
            .expect("allowed");
        // Non-read tools are never argument-checked.
        context
            .check_tool_arguments(
                "Write",
                &arguments(serde_json::json!({"file_path": "/skills/test-skill/scripts/pre.sh"})),
            )
            .expect("allowed");
    }
}
