//! Configuration management with YAML support

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::normalize::{Normalizer, DEFAULT_BARE_COMMANDS, DEFAULT_COMMANDS_WITH_ARGS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Sentence generation tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Stop extending once the sentence reaches this many characters
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// 1-in-N chance of jumping to an unrelated word; 0 disables jumps
    #[serde(default = "default_topic_jump_odds")]
    pub topic_jump_odds: u32,

    #[serde(default = "default_stop_base")]
    pub stop_base: i64,

    /// A stop draw at or below this ends the sentence
    #[serde(default = "default_stop_threshold")]
    pub stop_threshold: i64,
}

/// Which bot commands are stripped from messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    #[serde(default = "default_commands_with_args")]
    pub commands_with_args: Vec<String>,

    #[serde(default = "default_bare_commands")]
    pub bare_commands: Vec<String>,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/mimic/mimic.db".to_string()
}

fn default_max_length() -> usize {
    500
}

fn default_topic_jump_odds() -> u32 {
    50
}

fn default_stop_base() -> i64 {
    10
}

fn default_stop_threshold() -> i64 {
    2
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_commands_with_args() -> Vec<String> {
    DEFAULT_COMMANDS_WITH_ARGS.iter().map(|s| s.to_string()).collect()
}

fn default_bare_commands() -> Vec<String> {
    DEFAULT_BARE_COMMANDS.iter().map(|s| s.to_string()).collect()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            topic_jump_odds: default_topic_jump_odds(),
            stop_base: default_stop_base(),
            stop_threshold: default_stop_threshold(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            commands_with_args: default_commands_with_args(),
            bare_commands: default_bare_commands(),
        }
    }
}

impl NormalizerConfig {
    pub fn build(&self) -> Result<Normalizer> {
        Normalizer::new(
            &self.command_prefix,
            &self.commands_with_args,
            &self.bare_commands,
        )
        .context("invalid command list in normalizer config")
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./mimic.yaml (current directory)
    /// 3. <config dir>/mimic/mimic.yaml
    pub fn load(path: &str) -> Result<Self> {
        let mut search_paths = vec![
            PathBuf::from(shellexpand::tilde(path).to_string()),
            PathBuf::from("mimic.yaml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            search_paths.push(dir.join("mimic").join("mimic.yaml"));
        }

        for search_path in &search_paths {
            if search_path.exists() {
                let content = std::fs::read_to_string(search_path)
                    .with_context(|| format!("reading {}", search_path.display()))?;
                let config: Config = serde_yaml::from_str(&content)
                    .with_context(|| format!("parsing {}", search_path.display()))?;
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database.path).to_string();
        PathBuf::from(expanded)
    }
}
