// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key is an
//! error at startup instead of a silently ignored setting.

use codeplan_core::types::GenerationMode;
use serde::{Deserialize, Serialize};

/// Top-level Codeplan configuration.
///
/// Every section is optional and defaults to working values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CodeplanConfig {
    /// Client identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Generation backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Request assembly defaults.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Local project store used by the CLI.
    #[serde(default)]
    pub project: ProjectConfig,
}

/// Client identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name used in logs and the terminal prompt.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "codeplan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Generation backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the generation service; `/generate` and
    /// `/generate/stream` are appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Provider API key forwarded in the request body. `None` omits it.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model requested when the caller does not pick one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Mode requested when the caller does not pick one.
    #[serde(default)]
    pub default_mode: GenerationMode,

    /// Whole-request timeout. A timeout is reported as a network error.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            default_model: default_model(),
            default_mode: GenerationMode::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

/// Request assembly configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Maximum prior messages sent as conversation history. 0 disables history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Send the project's current files with each request.
    #[serde(default = "default_true")]
    pub include_current_files: bool,

    /// User id forwarded to the backend.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            include_current_files: true,
            user_id: None,
        }
    }
}

fn default_history_limit() -> usize {
    20
}

fn default_true() -> bool {
    true
}

/// Local project store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Directory that holds one sub-directory per project.
    #[serde(default = "default_project_root")]
    pub root: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_project_root(),
        }
    }
}

fn default_project_root() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("codeplan/projects").display().to_string())
        .unwrap_or_else(|| "./codeplan-projects".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = CodeplanConfig::default();
        assert_eq!(config.agent.name, "codeplan");
        assert_eq!(config.backend.default_mode, GenerationMode::Simple);
        assert_eq!(config.backend.request_timeout_secs, 300);
        assert_eq!(config.generation.history_limit, 20);
        assert!(config.generation.include_current_files);
        assert!(!config.project.root.is_empty());
    }

    #[test]
    fn mode_parses_from_toml() {
        let config: CodeplanConfig = toml::from_str(
            r#"
[backend]
default_mode = "fullstack"
"#,
        )
        .unwrap();
        assert_eq!(config.backend.default_mode, GenerationMode::Fullstack);
    }

    #[test]
    fn unknown_backend_key_is_rejected() {
        let result = toml::from_str::<CodeplanConfig>(
            r#"
[backend]
base_ulr = "http://localhost"
"#,
        );
        assert!(result.is_err());
    }
}
