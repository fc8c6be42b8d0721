//! SKILL.md validation.
//!
//! Validates manifest content against the skill authoring rules: strict
//! frontmatter fields, kebab-case names, third-person descriptions, body
//! size limits, portable paths, and parser-hostile quoting. Size and
//! portability problems are errors; time-sensitive wording is a warning.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Outcome of validating one manifest.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Problems that make the skill unloadable.
    pub errors: Vec<String>,
    /// Advisory findings that do not block loading.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Whether the manifest passed with no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Parsed frontmatter plus the remaining body.
#[derive(Debug, Clone)]
pub struct ParsedManifest {
    /// Frontmatter fields as parsed YAML scalars.
    pub frontmatter: BTreeMap<String, serde_yaml::Value>,
    /// Everything after the closing delimiter.
    pub body: String,
}

static FRONTMATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---\s*\n(.*?)\n---\s*\n").expect("valid regex"));

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid regex"));

static BASH_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Bash\([^)]+:\*\)$").expect("valid regex"));

static BROKEN_SINGLE_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'[^']*\b\w+'[tdslmre]\b[^']*'").expect("valid regex"));

const RESERVED_NAMES: [&str; 6] = ["skill", "agent", "tool", "system", "admin", "root"];

const IMPERATIVE_STARTS: [&str; 16] = [
    "format", "create", "build", "process", "handle", "generate", "convert", "extract",
    "analyze", "transform", "validate", "parse", "execute", "run", "compile", "deploy",
];

const VALID_TOOL_NAMES: [&str; 9] = [
    "Read", "Write", "Edit", "Grep", "Glob", "Bash", "Task", "WebSearch", "WebFetch",
];

static TIME_SENSITIVE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b20\d{2}\b",
        r"(?i)\bcurrently\b",
        r"(?i)\bas of\b",
        r"(?i)\btoday\b",
        r"(?i)\bnow\b",
        r"(?i)\brecent\b",
        r"(?i)\blatest\b",
        r"(?i)\bthis (year|month|week)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static HARDCODED_PATHS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"/home/[^\s]+").expect("valid regex"),
            "Unix home directory",
        ),
        (
            Regex::new(r"/Users/[^\s]+").expect("valid regex"),
            "Mac home directory",
        ),
        (
            Regex::new(r"/(?:usr|var|opt|etc)/[^\s]+").expect("valid regex"),
            "Unix system path",
        ),
        (
            // A /scripts, /references, or /assets path not preceded by `}`
            // (which would make it part of {baseDir}/...).
            Regex::new(r"[^}]/(?:scripts|references|assets)/[^\s]+").expect("valid regex"),
            "skill resource path without {baseDir}",
        ),
    ]
});

/// Validator for SKILL.md manifests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkillValidator;

impl SkillValidator {
    /// A validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate full manifest content against the expected skill name.
    #[must_use]
    pub fn validate(&self, content: &str, skill_name: &str) -> ValidationResult {
        let mut result = ValidationResult::default();
        let Some(manifest) = self.parse_manifest(content, &mut result) else {
            return result;
        };

        self.validate_frontmatter_fields(&manifest.frontmatter, &mut result);

        match manifest.frontmatter.get("name").and_then(scalar_string) {
            None => result.error("Frontmatter missing required field: 'name'"),
            Some(name) => {
                self.validate_name(&name, &mut result);
                if name != skill_name {
                    result.error(format!(
                        "Frontmatter name '{name}' does not match expected name '{skill_name}'"
                    ));
                }
            }
        }

        match manifest
            .frontmatter
            .get("description")
            .and_then(scalar_string)
        {
            None => result.error("Frontmatter missing required field: 'description'"),
            Some(description) => self.validate_description(&description, &mut result),
        }

        if let Some(allowed) = manifest
            .frontmatter
            .get("allowed-tools")
            .and_then(scalar_string)
        {
            self.validate_allowed_tools(&allowed, &mut result);
        }

        if manifest.body.trim().is_empty() {
            result.error("Skill body is empty. Body must contain skill instructions.");
            return result;
        }

        self.validate_body_size(&manifest.body, &mut result);
        self.check_hardcoded_paths(content, &mut result);
        self.check_time_sensitive(content, &mut result);
        self.check_broken_single_quotes(&manifest.body, &mut result);

        result
    }

    /// Split content into frontmatter and body.
    #[must_use]
    pub fn parse_manifest(
        &self,
        content: &str,
        result: &mut ValidationResult,
    ) -> Option<ParsedManifest> {
        let Some(captures) = FRONTMATTER.captures(content) else {
            result.error(
                "Missing YAML frontmatter. File must start with '---' delimiter and \
                 end with '---' delimiter.",
            );
            return None;
        };
        let yaml = &captures[1];
        let body = content[captures.get(0).map_or(0, |m| m.end())..].to_string();

        match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
            Ok(serde_yaml::Value::Mapping(mapping)) => {
                let frontmatter = mapping
                    .into_iter()
                    .filter_map(|(key, value)| {
                        key.as_str().map(|k| (k.to_string(), value))
                    })
                    .collect();
                Some(ParsedManifest { frontmatter, body })
            }
            Ok(_) => {
                result.error("Frontmatter must be a YAML mapping");
                None
            }
            Err(error) => {
                result.error(format!("Invalid YAML frontmatter: {error}"));
                None
            }
        }
    }

    fn validate_frontmatter_fields(
        &self,
        frontmatter: &BTreeMap<String, serde_yaml::Value>,
        result: &mut ValidationResult,
    ) {
        let allowed = [
            "name",
            "description",
            "allowed-tools",
            "hooks",
            "license",
            "version",
            "model",
            "mode",
            "disable-model-invocation",
        ];
        let mut unauthorized: Vec<&str> = frontmatter
            .keys()
            .map(String::as_str)
            .filter(|key| !allowed.contains(key))
            .collect();
        unauthorized.sort_unstable();
        if !unauthorized.is_empty() {
            result.error(format!(
                "Frontmatter contains unauthorized fields: {unauthorized:?}"
            ));
        }
    }

    fn validate_name(&self, name: &str, result: &mut ValidationResult) {
        if name.len() > 64 {
            result.error(format!(
                "Skill name exceeds 64 character limit (got {} characters)",
                name.len()
            ));
        }
        if !NAME_PATTERN.is_match(name) {
            result.error(
                "Skill name must be kebab-case: start with lowercase letter, \
                 contain only lowercase letters, numbers, and hyphens",
            );
        }
        if RESERVED_NAMES.contains(&name.to_lowercase().as_str()) {
            result.error(format!("Skill name '{name}' is reserved"));
        }
    }

    fn validate_description(&self, description: &str, result: &mut ValidationResult) {
        if description.len() > 1024 {
            result.error(format!(
                "Description exceeds 1024 character limit (got {} characters)",
                description.len()
            ));
        }
        let first_word = description
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if IMPERATIVE_STARTS.contains(&first_word.as_str()) {
            result.error(format!(
                "Description appears to be in imperative form (starts with '{first_word}'). \
                 Use third person instead"
            ));
        }
    }

    fn validate_body_size(&self, body: &str, result: &mut ValidationResult) {
        let line_count = body.lines().count();
        if line_count > 500 {
            result.error(format!(
                "Skill body exceeds 500 line limit (got {line_count} lines)"
            ));
        }

        let word_count = body.split_whitespace().count();
        if word_count > 5000 {
            result.error(format!(
                "Skill body exceeds 5,000 word limit (got {word_count} words). \
                 Consider moving detailed content to references/ for progressive disclosure."
            ));
        } else if word_count > 4500 {
            result.warning(format!(
                "Skill body approaching 5,000 word limit (currently {word_count} words)"
            ));
        }
    }

    fn validate_allowed_tools(&self, allowed_tools: &str, result: &mut ValidationResult) {
        for tool in allowed_tools.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if VALID_TOOL_NAMES.contains(&tool) {
                continue;
            }
            if BASH_SCOPE.is_match(tool) {
                if tool.contains('/') && !tool.contains("{baseDir}") {
                    result.error(format!(
                        "Scoped tool '{tool}' should use {{baseDir}} placeholder for paths"
                    ));
                }
                continue;
            }
            result.error(format!(
                "Invalid tool specification: '{tool}'. Must be a valid tool name \
                 or a scoped Bash command like 'Bash(git:*)'"
            ));
        }
    }

    fn check_hardcoded_paths(&self, content: &str, result: &mut ValidationResult) {
        for (pattern, description) in HARDCODED_PATHS.iter() {
            let examples: Vec<&str> = pattern
                .find_iter(content)
                .map(|m| m.as_str())
                .take(3)
                .collect();
            if !examples.is_empty() {
                result.error(format!(
                    "Hardcoded {description} detected: {}. Use {{baseDir}} for portability",
                    examples.join(", ")
                ));
            }
        }
    }

    fn check_time_sensitive(&self, content: &str, result: &mut ValidationResult) {
        // One warning is enough; more is noise.
        for pattern in TIME_SENSITIVE.iter() {
            if pattern.is_match(content) {
                result.warning(format!(
                    "Content may contain time-sensitive information (pattern: '{pattern}'). \
                     Consider timeless language."
                ));
                break;
            }
        }
    }

    fn check_broken_single_quotes(&self, body: &str, result: &mut ValidationResult) {
        for (index, line) in body.lines().enumerate() {
            if BROKEN_SINGLE_QUOTE.is_match(line) {
                result.error(format!(
                    "Line {}: single-quoted string contains an apostrophe/contraction \
                     which breaks string parsing. Use double quotes instead.",
                    index + 1
                ));
            }
        }
    }
}

fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(frontmatter: &str, body: &str) -> String {
        format!("---\n{frontmatter}\n---\n{body}")
    }

    fn validate(content: &str, name: &str) -> ValidationResult {
        SkillValidator::new().validate(content, name)
    }

    #[test]
    fn accepts_a_minimal_valid_skill() {
        let content = manifest(
            "name: data-processor\ndescription: A skill that processes data files.",
            "# Data Processor\n\nRead the input and summarize it.",
        );
        let result = validate(&content, "data-processor");
        assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn missing_frontmatter_is_an_error() {
        let result = validate("# Just a body", "skill-x");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("frontmatter"));
    }

    #[test]
    fn unauthorized_fields_are_rejected() {
        let content = manifest(
            "name: my-skill\ndescription: A helper.\nauthor: someone",
            "Body text.",
        );
        let result = validate(&content, "my-skill");
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("unauthorized fields")));
    }

    #[test]
    fn name_rules_are_enforced() {
        for (name, expected) in [
            ("My-Skill", "kebab-case"),
            ("1skill", "kebab-case"),
            ("skill", "reserved"),
            ("admin", "reserved"),
        ] {
            let content = manifest(
                &format!("name: {name}\ndescription: A helper skill."),
                "Body.",
            );
            let result = validate(&content, name);
            assert!(
                result.errors.iter().any(|e| e.contains(expected)),
                "expected '{expected}' error for name '{name}', got {:?}",
                result.errors
            );
        }

        let long = format!("x{}", "a".repeat(70));
        let content = manifest(&format!("name: {long}\ndescription: Fine."), "Body.");
        let result = validate(&content, &long);
        assert!(result.errors.iter().any(|e| e.contains("64 character")));
    }

    #[test]
    fn mismatched_name_is_an_error() {
        let content = manifest("name: actual-name\ndescription: A helper.", "Body.");
        let result = validate(&content, "expected-name");
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("does not match expected name")));
    }

    #[test]
    fn imperative_description_is_rejected() {
        let content = manifest(
            "name: formatter\ndescription: Format the input as a table.",
            "Body.",
        );
        let result = validate(&content, "formatter");
        assert!(result.errors.iter().any(|e| e.contains("imperative")));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let body = "line\n".repeat(501);
        let content = manifest("name: big-skill\ndescription: A helper.", &body);
        let result = validate(&content, "big-skill");
        assert!(result.errors.iter().any(|e| e.contains("500 line limit")));
    }

    #[test]
    fn word_count_warns_then_errors() {
        let nearly = "word ".repeat(4600);
        let content = manifest("name: wordy\ndescription: A helper.", &nearly);
        let result = validate(&content, "wordy");
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("approaching")));

        let over = "word ".repeat(5100);
        let content = manifest("name: wordy\ndescription: A helper.", &over);
        let result = validate(&content, "wordy");
        assert!(result.errors.iter().any(|e| e.contains("5,000 word limit")));
    }

    #[test]
    fn allowed_tools_validation() {
        let content = manifest(
            "name: tooling\ndescription: A helper.\nallowed-tools: \"Read, Write, Bash(git:*)\"",
            "Body.",
        );
        let result = validate(&content, "tooling");
        assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);

        let content = manifest(
            "name: tooling\ndescription: A helper.\nallowed-tools: \"Teleport\"",
            "Body.",
        );
        let result = validate(&content, "tooling");
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("Invalid tool specification")));

        let content = manifest(
            "name: tooling\ndescription: A helper.\nallowed-tools: \"Bash(python /abs/run.py:*)\"",
            "Body.",
        );
        let result = validate(&content, "tooling");
        assert!(result.errors.iter().any(|e| e.contains("{baseDir}")));
    }

    #[test]
    fn hardcoded_paths_are_rejected() {
        let content = manifest(
            "name: pathy\ndescription: A helper.",
            "Run /home/alice/run.sh then check /scripts/post.sh output.",
        );
        let result = validate(&content, "pathy");
        assert!(result.errors.iter().any(|e| e.contains("home directory")));
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("without {baseDir}")));
    }

    #[test]
    fn base_dir_resource_paths_are_fine() {
        let content = manifest(
            "name: pathy\ndescription: A helper.",
            "Run {baseDir}/scripts/post.sh when done.",
        );
        let result = validate(&content, "pathy");
        assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn time_sensitive_content_only_warns_once() {
        let content = manifest(
            "name: timely\ndescription: A helper.",
            "As of 2024, this is currently the latest approach.",
        );
        let result = validate(&content, "timely");
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn broken_single_quotes_are_rejected() {
        let content = manifest(
            "name: quoting\ndescription: A helper.",
            "Reply with 'I'd be happy to help' when greeted.",
        );
        let result = validate(&content, "quoting");
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("apostrophe/contraction")));
    }

    #[test]
    fn empty_body_is_an_error() {
        let content = manifest("name: hollow\ndescription: A helper.", "   \n");
        let result = validate(&content, "hollow");
        assert!(result.errors.iter().any(|e| e.contains("body is empty")));
    }
}
