// SPDX-FileCopyrightText: 2026 Codeplan Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/codeplan/codeplan.toml`
//! 3. `~/.config/codeplan/codeplan.toml`
//! 4. `./codeplan.toml`
//! 5. `CODEPLAN_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CodeplanConfig;

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/codeplan/codeplan.toml";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "codeplan.toml";

/// Sections whose env keys map `CODEPLAN_<SECTION>_<KEY>` to `<section>.<key>`.
const ENV_SECTIONS: &[&str] = &["agent", "backend", "generation", "project"];

/// Path of the per-user config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("codeplan").join(LOCAL_CONFIG_FILE))
}

/// Builds the full layered Figment without extracting it.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(CodeplanConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    figment
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Loads configuration from the standard hierarchy with env overrides.
pub fn load_config() -> Result<CodeplanConfig, figment::Error> {
    build_figment().extract()
}

/// Loads configuration from an inline TOML string over the defaults (no env).
pub fn load_config_from_str(toml_content: &str) -> Result<CodeplanConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CodeplanConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads configuration from one explicit file with env overrides.
pub fn load_config_from_path(path: &Path) -> Result<CodeplanConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CodeplanConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Maps `CODEPLAN_BACKEND_API_KEY` to `backend.api_key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys that contain underscores (`default_model`) survive intact.
fn env_provider() -> Env {
    Env::prefixed("CODEPLAN_").map(|key| {
        // Keys arrive as written in the environment, usually uppercase.
        let key = key.as_str().to_ascii_lowercase();
        ENV_SECTIONS
            .iter()
            .find_map(|section| {
                key.strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|field| format!("{section}.{field}"))
            })
            .unwrap_or(key)
            .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_keep_underscored_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CODEPLAN_BACKEND_DEFAULT_MODEL", "claude-sonnet");
            jail.set_env("CODEPLAN_GENERATION_HISTORY_LIMIT", "5");
            let config: CodeplanConfig = Figment::new()
                .merge(Serialized::defaults(CodeplanConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.backend.default_model, "claude-sonnet");
            assert_eq!(config.generation.history_limit, 5);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_apply_over_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
[backend]
base_url = "https://gen.example.com"
default_model = "from-file"
"#,
            )?;
            jail.set_env("CODEPLAN_BACKEND_DEFAULT_MODEL", "from-env");
            jail.set_env("CODEPLAN_AGENT_LOG_LEVEL", "debug");
            let config = load_config_from_path(Path::new(LOCAL_CONFIG_FILE))?;
            assert_eq!(config.backend.base_url, "https://gen.example.com");
            assert_eq!(config.backend.default_model, "from-env");
            assert_eq!(config.agent.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                LOCAL_CONFIG_FILE,
                r#"
[backend]
base_url = "https://gen.example.com"
"#,
            )?;
            let config = load_config_from_path(Path::new(LOCAL_CONFIG_FILE))?;
            assert_eq!(config.backend.base_url, "https://gen.example.com");
            assert_eq!(config.backend.request_timeout_secs, 300);
            Ok(())
        });
    }
}
