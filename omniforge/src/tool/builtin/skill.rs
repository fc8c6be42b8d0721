//! The `skill` pseudo-tool.
//!
//! Returns a named skill's body and restrictions so the caller can decide
//! to activate it. The tool never touches the executor's activation stack
//! itself. A lookup miss names the nearest known skill so the model can
//! self-correct.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::reasoning::chain::ToolType;
use crate::skill::SkillLoader;
use crate::tool::{
    JsonObject, Tool, ToolCallContext, ToolDefinition, ToolExecutionError, ToolParameter,
    ToolResult,
};

/// Minimum normalized similarity for a "did you mean" suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Pseudo-tool exposing skill bundles to the reasoning loop.
pub struct SkillTool {
    definition: ToolDefinition,
    loader: Arc<SkillLoader>,
}

impl SkillTool {
    /// Skill tool over an indexed loader.
    #[must_use]
    pub fn new(loader: Arc<SkillLoader>) -> Self {
        let definition = ToolDefinition::new(
            "skill",
            ToolType::Function,
            "Load a skill's instructions and tool restrictions by name",
        )
        .with_parameter(ToolParameter::required(
            "skill_name",
            "string",
            "Name of the skill to load",
        ));
        Self { definition, loader }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _context: &ToolCallContext,
        arguments: JsonObject,
    ) -> Result<ToolResult, ToolExecutionError> {
        let name = arguments
            .get("skill_name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        match self.loader.load_skill(name) {
            Ok(skill) => {
                let mut payload = serde_json::json!({
                    "skill_name": skill.metadata.name,
                    "base_path": skill.base_path.display().to_string(),
                    "content": skill.content,
                });
                if let Some(allowed) = &skill.metadata.allowed_tools {
                    payload["allowed_tools"] = serde_json::json!(allowed);
                }
                Ok(ToolResult::ok(payload))
            }
            Err(error) => {
                let suggestion = nearest_name(name, &self.loader.skill_names());
                let message = match suggestion {
                    Some(nearest) => format!("{error}. Did you mean '{nearest}'?"),
                    None => error.to_string(),
                };
                Ok(ToolResult::failed(message))
            }
        }
    }
}

/// The known name most similar to `wanted`, when similar enough.
fn nearest_name(wanted: &str, known: &[String]) -> Option<String> {
    known
        .iter()
        .map(|candidate| (candidate, similarity(wanted, candidate)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.clone())
}

/// Normalized similarity in `[0, 1]` from Levenshtein distance.
fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
