//! Ambient configuration: how one agent's identity, provider, MCP
//! endpoints, approval whitelist and adapter-surface settings are loaded
//! from TOML, with the same inline-or-file-plus-`${VAR}` idiom used for
//! system prompts.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use threadline_core::mcp::McpServerConfig;

/// Top-level configuration for one running agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub agent: AgentConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// The agent id this configuration answers to, e.g. `librarian`.
    pub id: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Inline text, or a path to read it from — resolved by
    /// [`resolve_system_prompt`].
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub mcp: Vec<McpServerConfig>,
    /// Glob patterns (`mcp:<server>:<tool>`) auto-approved without
    /// prompting the user; see [`crate::approval::ApprovalGate`].
    #[serde(default)]
    pub approval_whitelist: Vec<String>,
}

/// A system prompt given either inline or as a path to load at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Inline(String),
    File { path: PathBuf },
}

/// Message-bus adapter settings: which `agentId`s this process answers
/// bus traffic for (see [`crate::bus::parse_inbound`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub valid_agent_ids: HashSet<String>,
}

/// UI render-coordinator timing, consumed by the UI crate's
/// sample-and-hold scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

fn default_sample_interval_ms() -> u64 {
    50
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read system prompt file {path}: {source}")]
    SystemPromptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a `Config` is loaded from.
pub enum ConfigSource {
    File(PathBuf),
    Inline(String),
}

/// Loads and env-interpolates a `Config` from `source`. Every string
/// value (not just the system prompt) is passed through
/// [`interpolate_env_vars`], matching the provider/api_key fields'
/// common use of `${OPENAI_API_KEY}`-style placeholders.
pub async fn load_config(source: ConfigSource) -> Result<Config, ConfigError> {
    let raw = match source {
        ConfigSource::File(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read { path, source })?,
        ConfigSource::Inline(text) => text,
    };
    let interpolated = interpolate_env_vars(&raw);
    let config: Config = toml::from_str(&interpolated)?;
    Ok(config)
}

/// Resolves an `AgentConfig`'s system prompt to its final text,
/// reading a file if one was configured.
pub async fn resolve_system_prompt(prompt: &Option<SystemPrompt>) -> Result<String, ConfigError> {
    match prompt {
        None => Ok(String::new()),
        Some(SystemPrompt::Inline(text)) => Ok(text.clone()),
        Some(SystemPrompt::File { path }) => tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::SystemPromptRead {
                path: path.clone(),
                source,
            }),
    }
}

/// Expands `${VAR}` and `${VAR:-default}` placeholders against the
/// process environment, leaving unknown placeholders with no default
/// untouched rather than erroring — a misconfigured env var should
/// surface at the provider call site, not at config load time.
pub fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end) = input[i + 2..].find('}') {
                let inner = &input[i + 2..i + 2 + end];
                let (name, default) = match inner.split_once(":-") {
                    Some((name, default)) => (name, Some(default)),
                    None => (inner, None),
                };
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => match default {
                        Some(default) => out.push_str(default),
                        None => out.push_str(&input[i..i + 2 + end + 1]),
                    },
                }
                i += 2 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_plain_var() {
        std::env::set_var("THREADLINE_TEST_VAR", "hello");
        assert_eq!(interpolate_env_vars("value = \"${THREADLINE_TEST_VAR}\""), "value = \"hello\"");
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        std::env::remove_var("THREADLINE_TEST_UNSET");
        assert_eq!(
            interpolate_env_vars("${THREADLINE_TEST_UNSET:-fallback}"),
            "fallback"
        );
    }

    #[test]
    fn leaves_unset_no_default_placeholder_untouched() {
        std::env::remove_var("THREADLINE_TEST_UNSET_2");
        assert_eq!(
            interpolate_env_vars("${THREADLINE_TEST_UNSET_2}"),
            "${THREADLINE_TEST_UNSET_2}"
        );
    }

    #[tokio::test]
    async fn load_config_parses_inline_toml() {
        let toml = r#"
            [agent]
            id = "librarian"
            provider = "openai"
            model = "gpt-4o"

            [bus]
            valid_agent_ids = ["librarian"]
        "#;
        let config = load_config(ConfigSource::Inline(toml.to_string())).await.unwrap();
        assert_eq!(config.agent.id, "librarian");
        assert_eq!(config.render.sample_interval_ms, 50);
        assert!(config.bus.valid_agent_ids.contains("librarian"));
    }

    #[tokio::test]
    async fn inline_system_prompt_resolves_directly() {
        let prompt = Some(SystemPrompt::Inline("be helpful".to_string()));
        assert_eq!(resolve_system_prompt(&prompt).await.unwrap(), "be helpful");
    }
}
