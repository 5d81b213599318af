//! Gateway configuration types.
//!
//! `GatewayConfig` represents the top-level `config.toml` that controls
//! the HTTP listener, session lifecycle, and how the agent CLI is launched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Parley gateway.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// How to launch the agent CLI for each session.
    #[serde(default)]
    pub agent: AgentCliConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7700
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Session lifecycle settings.
///
/// The idle timeout is measured on inter-request gaps; no timeout applies
/// to an individual message exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a session may sit idle before the sweeper evicts it.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Seconds between eviction sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// How the agent CLI is launched for each session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCliConfig {
    /// Executable to spawn (looked up on PATH if not absolute).
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_command() -> String {
    "agent".to_string()
}

impl Default for AgentCliConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }
}
