//! Platform configuration resolved from the process environment.
//!
//! All settings have sensible defaults so the platform can run without any
//! environment at all; deployments override via `OMNIFORGE_*` variables.

use std::env;
use std::path::PathBuf;

/// Environment variable holding the process-wide default tenant.
pub const ENV_TENANT_ID: &str = "OMNIFORGE_TENANT_ID";
/// Environment variable holding the default model for llm-backed tools.
pub const ENV_DEFAULT_MODEL: &str = "OMNIFORGE_LLM_DEFAULT_MODEL";
/// Environment variable for the project-layer skill root.
pub const ENV_SKILLS_PROJECT_DIR: &str = "OMNIFORGE_SKILLS_PROJECT_DIR";
/// Environment variable for the personal-layer skill root.
pub const ENV_SKILLS_PERSONAL_DIR: &str = "OMNIFORGE_SKILLS_PERSONAL_DIR";
/// Environment variable for the enterprise-layer skill root.
pub const ENV_SKILLS_ENTERPRISE_DIR: &str = "OMNIFORGE_SKILLS_ENTERPRISE_DIR";

/// Model used by `llm`-backed tools when a call does not name one.
pub const DEFAULT_LLM_MODEL: &str = "claude-sonnet-4";

/// Process-level platform settings.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Tenant attributed to work submitted without an explicit tenant.
    pub default_tenant_id: String,
    /// Default model name for llm-backed tools and delegation.
    pub default_llm_model: String,
    /// Project-layer skill root, if configured.
    pub skills_project_dir: Option<PathBuf>,
    /// Personal-layer skill root, if configured.
    pub skills_personal_dir: Option<PathBuf>,
    /// Enterprise-layer skill root, if configured.
    pub skills_enterprise_dir: Option<PathBuf>,
}

impl PlatformConfig {
    /// Resolve configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            default_tenant_id: env::var(ENV_TENANT_ID).unwrap_or_else(|_| "default".to_string()),
            default_llm_model: env::var(ENV_DEFAULT_MODEL)
                .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            skills_project_dir: env::var_os(ENV_SKILLS_PROJECT_DIR).map(PathBuf::from),
            skills_personal_dir: env::var_os(ENV_SKILLS_PERSONAL_DIR).map(PathBuf::from),
            skills_enterprise_dir: env::var_os(ENV_SKILLS_ENTERPRISE_DIR).map(PathBuf::from),
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            default_tenant_id: "default".to_string(),
            default_llm_model: DEFAULT_LLM_MODEL.to_string(),
            skills_project_dir: None,
            skills_personal_dir: None,
            skills_enterprise_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_default_tenant() {
        let config = PlatformConfig::default();
        assert_eq!(config.default_tenant_id, "default");
        assert_eq!(config.default_llm_model, DEFAULT_LLM_MODEL);
        assert!(config.skills_project_dir.is_none());
    }
}
