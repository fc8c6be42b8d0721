//! Progressive context loading for skills.
//!
//! A skill body may name supporting files instead of inlining them. The
//! loader extracts those references, keeps the ones that exist under the
//! skill's base directory, and builds an index section for the first ReAct
//! prompt so the model opens files on demand with the read tool.
//!
//! Recognized reference shapes:
//! - bullet list: `- reference.md: description (120 lines)`
//! - bold markdown: `**reference.md**: description`
//! - inline: `See reference.md for details`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// File extensions eligible for progressive disclosure.
const SUPPORTED_EXTENSIONS: [&str; 5] = ["md", "txt", "json", "yaml", "yml"];

static LIST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?mi)^\s*-\s+["'`]?([\w][\w./-]*\.[A-Za-z]+)["'`]?\s*:?\s*(.*)$"#)
        .expect("valid regex")
});

static BOLD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*([\w][\w./-]*\.[A-Za-z]+)\*\*\s*:?\s*([^\n]*)").expect("valid regex")
});

static INLINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsee\s+[`"']?([\w][\w./-]*\.[A-Za-z]+)[`"']?"#).expect("valid regex")
});

static LINE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\s+lines?\)").expect("valid regex"));

/// A supporting file referenced by a skill body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// Filename relative to the skill base directory.
    pub name: String,
    /// Description parsed from the reference site, if any.
    pub description: String,
    /// Declared line count, if the reference carried one.
    pub line_count: Option<usize>,
    /// Absolute path of the file.
    pub path: PathBuf,
}

/// The initial context for a skill: the full body plus an index of
/// supporting files the model may open on demand.
#[derive(Debug, Clone, Default)]
pub struct LoadedContext {
    /// The skill instruction body.
    pub skill_content: String,
    /// Supporting files available for on-demand reads.
    pub available_files: Vec<FileReference>,
    /// Files the model has already opened this run.
    pub loaded_files: HashSet<String>,
}

impl LoadedContext {
    /// Mark a file as opened.
    pub fn mark_file_loaded(&mut self, name: &str) {
        self.loaded_files.insert(name.to_string());
    }

    /// Names of files opened so far.
    #[must_use]
    pub fn loaded_files(&self) -> HashSet<String> {
        self.loaded_files.clone()
    }
}

/// Extracts supporting-file references from skill bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextLoader;

impl ContextLoader {
    /// A context loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the initial context for a skill body rooted at `base_path`.
    #[must_use]
    pub fn load_initial_context(&self, skill_content: &str, base_path: &Path) -> LoadedContext {
        LoadedContext {
            skill_content: skill_content.to_string(),
            available_files: self.extract_references(skill_content, base_path),
            loaded_files: HashSet::new(),
        }
    }

    /// Extract references that resolve to existing files under `base_path`.
    #[must_use]
    pub fn extract_references(&self, content: &str, base_path: &Path) -> Vec<FileReference> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut references = Vec::new();

        for captures in LIST_PATTERN.captures_iter(content) {
            let raw_description = captures.get(2).map_or("", |m| m.as_str());
            self.push_reference(
                &captures[1],
                raw_description,
                base_path,
                &mut seen,
                &mut references,
            );
        }
        for captures in BOLD_PATTERN.captures_iter(content) {
            let raw_description = captures.get(2).map_or("", |m| m.as_str());
            self.push_reference(
                &captures[1],
                raw_description,
                base_path,
                &mut seen,
                &mut references,
            );
        }
        for captures in INLINE_PATTERN.captures_iter(content) {
            self.push_reference(&captures[1], "", base_path, &mut seen, &mut references);
        }

        references
    }

    /// Render the available-files prompt section, instructing the model to
    /// open files with the read tool on demand.
    #[must_use]
    pub fn build_available_files_prompt(&self, context: &LoadedContext) -> String {
        if context.available_files.is_empty() {
            return String::new();
        }
        let mut section = String::from(
            "AVAILABLE SUPPORTING FILES (use the read tool to open any of these on demand):\n",
        );
        for reference in &context.available_files {
            section.push_str(&format!(
                "- {} ({}){}{}\n",
                reference.name,
                reference.path.display(),
                if reference.description.is_empty() {
                    String::new()
                } else {
                    format!(": {}", reference.description)
                },
                reference
                    .line_count
                    .map(|count| format!(" [{count} lines]"))
                    .unwrap_or_default(),
            ));
        }
        section
    }

    fn push_reference(
        &self,
        name: &str,
        raw_description: &str,
        base_path: &Path,
        seen: &mut HashSet<String>,
        references: &mut Vec<FileReference>,
    ) {
        let extension = name.rsplit('.').next().unwrap_or_default().to_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return;
        }
        if !seen.insert(name.to_lowercase()) {
            return;
        }
        let path = base_path.join(name);
        if !path.is_file() {
            return;
        }
        let line_count = LINE_COUNT
            .captures(raw_description)
            .and_then(|captures| captures[1].parse().ok());
        references.push(FileReference {
            name: name.to_string(),
            description: clean_description(raw_description),
            line_count,
            path,
        });
    }
}

/// Strip the line-count suffix and markdown leftovers from a description.
fn clean_description(raw: &str) -> String {
    LINE_COUNT
        .replace(raw, "")
        .trim()
        .trim_matches(|c| c == '*' || c == '`' || c == '-' || c == ':')
        .trim()
        .to_string()
}
