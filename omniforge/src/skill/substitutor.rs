//! String substitution for skill bodies.
//!
//! Replaces `$VAR` and `${VAR}` occurrences (uppercase, digits, and
//! underscores) with values from a [`SubstitutionContext`] before the body
//! enters the first prompt. Undefined variables are left untouched and
//! logged once each. A non-empty `ARGUMENTS` value that the body never
//! references is appended automatically so user input is never dropped.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::warn;
use uuid::Uuid;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z][A-Z0-9_]*)\}|\$([A-Z][A-Z0-9_]*)").expect("valid regex")
});

/// Values available for substitution.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// The user's raw arguments for the skill.
    pub arguments: String,
    /// Platform session id.
    pub session_id: String,
    /// Compatibility alias for the session id.
    pub claude_session_id: String,
    /// The skill's base directory.
    pub skill_dir: String,
    /// The working directory of the run.
    pub workspace: String,
    /// The invoking user.
    pub user: String,
    /// Today's date, `YYYY-MM-DD`.
    pub date: String,
    /// Caller-supplied extra variables; these shadow the standard set.
    pub custom: BTreeMap<String, String>,
}

impl SubstitutionContext {
    /// Build a context, generating a session id and resolving the user,
    /// workspace, and date from the process environment where not given.
    #[must_use]
    pub fn build(
        arguments: impl Into<String>,
        session_id: Option<String>,
        skill_dir: impl Into<String>,
    ) -> Self {
        let session_id = session_id.unwrap_or_else(generate_session_id);
        Self {
            arguments: arguments.into(),
            claude_session_id: session_id.clone(),
            session_id,
            skill_dir: skill_dir.into(),
            workspace: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            date: Utc::now().format("%Y-%m-%d").to_string(),
            custom: BTreeMap::new(),
        }
    }

    /// Add a custom variable. Custom values shadow the standard set.
    #[must_use]
    pub fn with_custom(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    fn resolve(&self, name: &str) -> Option<String> {
        if let Some(value) = self.custom.get(name) {
            return Some(value.clone());
        }
        match name {
            "ARGUMENTS" => Some(self.arguments.clone()),
            "SESSION_ID" => Some(self.session_id.clone()),
            "CLAUDE_SESSION_ID" => Some(self.claude_session_id.clone()),
            "SKILL_DIR" => Some(self.skill_dir.clone()),
            "WORKSPACE" => Some(self.workspace.clone()),
            "USER" => Some(self.user.clone()),
            "DATE" => Some(self.date.clone()),
            _ => None,
        }
    }
}

/// Result of a substitution pass.
#[derive(Debug, Clone)]
pub struct SubstitutedContent {
    /// The content after substitution.
    pub content: String,
    /// Variables that were replaced, with their values.
    pub substitutions: BTreeMap<String, String>,
    /// Variables that were referenced but undefined, in first-seen order.
    pub undefined_variables: Vec<String>,
}

/// Substitutes `$VAR` / `${VAR}` references in skill content.
#[derive(Debug, Clone, Copy)]
pub struct StringSubstitutor {
    /// Whether to append `ARGUMENTS` when the body never references it.
    auto_append_arguments: bool,
}

impl StringSubstitutor {
    /// Substitutor with argument auto-append enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            auto_append_arguments: true,
        }
    }

    /// Disable the automatic `ARGUMENTS` append.
    #[must_use]
    pub fn without_auto_append(mut self) -> Self {
        self.auto_append_arguments = false;
        self
    }

    /// Substitute all variable references in `content`.
    ///
    /// Running the substitutor twice with the same context yields the same
    /// result: replaced values are plain text and untouched references stay
    /// untouched.
    #[must_use]
    pub fn substitute(&self, content: &str, context: &SubstitutionContext) -> SubstitutedContent {
        let mut substitutions = BTreeMap::new();
        let mut undefined: Vec<String> = Vec::new();
        let mut logged: HashSet<String> = HashSet::new();
        // A body that already references the arguments, or already carries
        // an appended ARGUMENTS block from an earlier pass, gets nothing
        // appended; substitution stays idempotent.
        let references_arguments = content.contains("$ARGUMENTS")
            || content.contains("${ARGUMENTS}")
            || content.contains("ARGUMENTS:");

        let mut output = VARIABLE
            .replace_all(content, |captures: &regex::Captures<'_>| {
                let name = captures
                    .get(1)
                    .or_else(|| captures.get(2))
                    .map_or("", |m| m.as_str());
                match context.resolve(name) {
                    Some(value) => {
                        substitutions.insert(name.to_string(), value.clone());
                        value
                    }
                    None => {
                        if logged.insert(name.to_string()) {
                            warn!(variable = name, "Undefined substitution variable");
                            undefined.push(name.to_string());
                        }
                        captures[0].to_string()
                    }
                }
            })
            .into_owned();

        if self.auto_append_arguments && !context.arguments.is_empty() && !references_arguments {
            output.push_str(&format!("\n\nARGUMENTS: {}", context.arguments));
        }

        SubstitutedContent {
            content: output,
            substitutions,
            undefined_variables: undefined,
        }
    }
}

impl Default for StringSubstitutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Session id of the form `sess-YYYYMMDD-xxxxxxxx`.
#[must_use]
pub fn generate_session_id() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("sess-{date}-{}", &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SubstitutionContext {
        SubstitutionContext {
            arguments: "report.csv".to_string(),
            session_id: "sess-20250101-abcd1234".to_string(),
            claude_session_id: "sess-20250101-abcd1234".to_string(),
            skill_dir: "/skills/data-processor".to_string(),
            workspace: "/work".to_string(),
            user: "alice".to_string(),
            date: "2025-01-01".to_string(),
            custom: BTreeMap::new(),
        }
    }

    #[test]
    fn substitutes_dollar_syntax() {
        let result =
            StringSubstitutor::new().substitute("Process $ARGUMENTS carefully.", &context());
        assert_eq!(result.content, "Process report.csv carefully.");
        assert_eq!(
            result.substitutions.get("ARGUMENTS"),
            Some(&"report.csv".to_string())
        );
    }

    #[test]
    fn substitutes_braces_syntax() {
        let result =
            StringSubstitutor::new().substitute("Dir: ${SKILL_DIR}/scripts", &context());
        assert_eq!(result.content, "Dir: /skills/data-processor/scripts");
    }

    #[test]
    fn substitutes_multiple_variables() {
        let result = StringSubstitutor::new()
            .substitute("$USER works in $WORKSPACE on $DATE", &context());
        assert_eq!(result.content, "alice works in /work on 2025-01-01");
    }

    #[test]
    fn auto_appends_arguments_when_unreferenced() {
        let result = StringSubstitutor::new().substitute("Do the thing.", &context());
        assert_eq!(result.content, "Do the thing.\n\nARGUMENTS: report.csv");
    }

    #[test]
    fn no_auto_append_when_referenced_or_empty_or_disabled() {
        let substitutor = StringSubstitutor::new();

        let result = substitutor.substitute("Handle $ARGUMENTS now.", &context());
        assert!(!result.content.contains("\n\nARGUMENTS:"));

        let result = substitutor.substitute("Use ${ARGUMENTS} now.", &context());
        assert!(!result.content.contains("\n\nARGUMENTS:"));

        let mut empty = context();
        empty.arguments = String::new();
        let result = substitutor.substitute("Do the thing.", &empty);
        assert_eq!(result.content, "Do the thing.");

        let result = StringSubstitutor::new()
            .without_auto_append()
            .substitute("Do the thing.", &context());
        assert_eq!(result.content, "Do the thing.");
    }

    #[test]
    fn undefined_variables_stay_and_are_reported_once() {
        let result = StringSubstitutor::new()
            .substitute("$MYSTERY and $MYSTERY and $OTHER", &context());
        assert_eq!(result.content, "$MYSTERY and $MYSTERY and $OTHER");
        assert_eq!(result.undefined_variables, vec!["MYSTERY", "OTHER"]);
    }

    #[test]
    fn custom_variables_shadow_standard() {
        let ctx = context().with_custom("USER", "bob").with_custom("EXTRA", "42");
        let result = StringSubstitutor::new().substitute("$USER has $EXTRA", &ctx);
        assert_eq!(result.content, "bob has 42");
    }

    #[test]
    fn lowercase_references_are_not_variables() {
        let result = StringSubstitutor::new().substitute("price is $foo today", &context());
        assert!(result.content.starts_with("price is $foo today"));
    }

    #[test]
    fn substitution_is_idempotent() {
        let substitutor = StringSubstitutor::new();
        let ctx = context();

        // Same content, same context: identical output.
        let once = substitutor.substitute("Run for $USER: $ARGUMENTS", &ctx);
        let again = substitutor.substitute("Run for $USER: $ARGUMENTS", &ctx);
        assert_eq!(once.content, again.content);

        // A pass over already-substituted auto-append output changes nothing.
        let first = substitutor.substitute("Do the thing.", &ctx);
        let second = substitutor.substitute(&first.content, &ctx);
        assert_eq!(first.content, second.content);
    }

    #[test]
    fn session_id_format() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts[0], "sess");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn build_context_fills_defaults() {
        let ctx = SubstitutionContext::build("input", None, "/skills/s");
        assert!(ctx.session_id.starts_with("sess-"));
        assert_eq!(ctx.session_id, ctx.claude_session_id);
        assert_eq!(ctx.skill_dir, "/skills/s");
        assert!(!ctx.date.is_empty());
    }
}
