//! Dynamic command injection for skill bodies.
//!
//! A skill body may contain `` !`command` `` tokens whose stdout is inlined
//! before the body enters the prompt. Pre-executing arbitrary commands is a
//! security surface, so the injector enforces an allow-list derived from
//! the skill's `allowed-tools`, rejects shell metacharacters and path
//! traversal outright, and bounds execution with a wall-clock timeout and
//! an output cap.
//!
//! Every blocked attempt is logged at WARN with the verbatim command;
//! every successful execution at INFO.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{info, warn};

static COMMAND_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!`([^`]+)`").expect("valid regex"));

/// Default wall-clock limit for an injected command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on captured output, in bytes.
pub const DEFAULT_MAX_OUTPUT: usize = 10_000;

const TRUNCATION_MARKER: &str = "... [output truncated]";

/// Substrings that disqualify a command outright: chaining, redirection,
/// substitution, and multi-line payloads.
const FORBIDDEN_SEQUENCES: [&str; 10] =
    [";", "&&", "||", "|", ">", "<", "`", "$(", "\n", "\r"];

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityViolation {
    /// The command contains a forbidden shell construct.
    ForbiddenSequence(String),
    /// A token attempts path traversal.
    PathTraversal(String),
    /// The base command is an absolute path.
    AbsoluteCommand(String),
    /// The command does not tokenize as a shell word list.
    InvalidSyntax,
    /// The command is not covered by the skill's allow-list.
    NotAllowed(String),
}

impl std::fmt::Display for SecurityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForbiddenSequence(seq) => write!(f, "forbidden shell construct '{seq}'"),
            Self::PathTraversal(token) => write!(f, "path traversal in '{token}'"),
            Self::AbsoluteCommand(command) => {
                write!(f, "absolute command path '{command}' is not permitted")
            }
            Self::InvalidSyntax => write!(f, "command does not tokenize cleanly"),
            Self::NotAllowed(command) => {
                write!(f, "command '{command}' is not covered by allowed-tools")
            }
        }
    }
}

/// Outcome of one injected command.
#[derive(Debug, Clone)]
pub struct InjectionResult {
    /// The verbatim command from the body.
    pub command: String,
    /// Whether the command ran and exited successfully.
    pub success: bool,
    /// Whether the command was refused by policy.
    pub blocked: bool,
    /// Captured stdout (possibly truncated) or the failure description.
    pub output: String,
}

/// A skill body after injection, with per-command outcomes.
#[derive(Debug, Clone)]
pub struct InjectedContent {
    /// The body with command tokens replaced.
    pub content: String,
    /// One result per command token, in order of appearance.
    pub results: Vec<InjectionResult>,
}

/// Pre-executes `` !`command` `` tokens in skill bodies.
#[derive(Debug, Clone)]
pub struct DynamicInjector {
    allowed_tools: Option<Vec<String>>,
    timeout: Duration,
    max_output: usize,
}

impl DynamicInjector {
    /// Injector restricted by a skill's `allowed-tools`, or unrestricted
    /// when the skill carries none (a prominent warning is logged per
    /// command in that case).
    #[must_use]
    pub fn new(allowed_tools: Option<Vec<String>>) -> Self {
        Self {
            allowed_tools,
            timeout: DEFAULT_TIMEOUT,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }

    /// Override the wall-clock limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the output cap.
    #[must_use]
    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    /// Replace every command token in `content` with its execution result.
    ///
    /// Commands run with `working_dir` as their current directory (the
    /// skill's base directory in practice).
    pub async fn process(&self, content: &str, working_dir: &Path) -> InjectedContent {
        let mut results = Vec::new();
        let mut output = String::with_capacity(content.len());
        let mut last_end = 0;

        for captures in COMMAND_TOKEN.captures_iter(content) {
            let token = captures.get(0).expect("full match");
            let command = captures[1].trim().to_string();

            output.push_str(&content[last_end..token.start()]);
            last_end = token.end();

            let result = self.run_command(&command, working_dir).await;
            output.push_str(&result.output);
            results.push(result);
        }
        output.push_str(&content[last_end..]);

        InjectedContent {
            content: output,
            results,
        }
    }

    /// Validate a command against the security policy, returning its
    /// tokenization on success.
    pub fn validate_command(&self, command: &str) -> Result<Vec<String>, SecurityViolation> {
        for sequence in FORBIDDEN_SEQUENCES {
            if command.contains(sequence) {
                return Err(SecurityViolation::ForbiddenSequence(sequence.to_string()));
            }
        }

        let tokens = shlex::split(command).ok_or(SecurityViolation::InvalidSyntax)?;
        if tokens.is_empty() {
            return Err(SecurityViolation::InvalidSyntax);
        }

        for token in &tokens {
            if token.contains("..") {
                return Err(SecurityViolation::PathTraversal(token.clone()));
            }
        }
        if tokens[0].starts_with('/') {
            return Err(SecurityViolation::AbsoluteCommand(tokens[0].clone()));
        }

        match &self.allowed_tools {
            None => {
                warn!(
                    command,
                    "No allowed-tools configured; permitting injected command. \
                     Configure an allow-list for production deployments."
                );
                Ok(tokens)
            }
            Some(allowed) => {
                if allowed
                    .iter()
                    .any(|entry| entry_authorizes(entry, command))
                {
                    Ok(tokens)
                } else {
                    Err(SecurityViolation::NotAllowed(command.to_string()))
                }
            }
        }
    }

    async fn run_command(&self, command: &str, working_dir: &Path) -> InjectionResult {
        let tokens = match self.validate_command(command) {
            Ok(tokens) => tokens,
            Err(violation) => {
                warn!(command, %violation, "Blocked injected command");
                return InjectionResult {
                    command: command.to_string(),
                    success: false,
                    blocked: true,
                    output: format!("[Command blocked by security policy: {command}]"),
                };
            }
        };

        let mut process = tokio::process::Command::new(&tokens[0]);
        process
            .args(&tokens[1..])
            .current_dir(working_dir)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let execution = tokio::time::timeout(self.timeout, process.output()).await;
        match execution {
            Err(_elapsed) => {
                warn!(command, timeout_secs = self.timeout.as_secs(), "Injected command timed out");
                InjectionResult {
                    command: command.to_string(),
                    success: false,
                    blocked: false,
                    output: format!(
                        "[Command failed: timed out after {}s]",
                        self.timeout.as_secs()
                    ),
                }
            }
            Ok(Err(error)) => InjectionResult {
                command: command.to_string(),
                success: false,
                blocked: false,
                output: format!("[Command failed: {error}]"),
            },
            Ok(Ok(output)) if output.status.success() => {
                info!(command, "Injected command executed");
                InjectionResult {
                    command: command.to_string(),
                    success: true,
                    blocked: false,
                    output: self.truncate(String::from_utf8_lossy(&output.stdout).trim_end()),
                }
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let reason = if stderr.trim().is_empty() {
                    format!("exit status {}", output.status)
                } else {
                    self.truncate(stderr.trim_end())
                };
                InjectionResult {
                    command: command.to_string(),
                    success: false,
                    blocked: false,
                    output: format!("[Command failed: {reason}]"),
                }
            }
        }
    }

    fn truncate(&self, text: &str) -> String {
        if text.len() <= self.max_output {
            return text.to_string();
        }
        let mut cut = self.max_output;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}{TRUNCATION_MARKER}", &text[..cut])
    }
}

/// Whether one `allowed-tools` entry authorizes a command: a bare `Bash`
/// allows everything; `Bash(prefix:*)` allows commands starting with the
/// prefix.
fn entry_authorizes(entry: &str, command: &str) -> bool {
    let entry = entry.trim();
    if entry.eq_ignore_ascii_case("bash") {
        return true;
    }
    let Some(scope) = entry
        .strip_prefix("Bash(")
        .and_then(|rest| rest.strip_suffix(")"))
    else {
        return false;
    };
    let Some(prefix) = scope.strip_suffix(":*") else {
        // An exact scope authorizes only the identical command.
        return scope == command;
    };
    command == prefix || command.starts_with(&format!("{prefix} "))
}
