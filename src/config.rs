use crate::{muted_error, weak_error};
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;

/// Adapter tunables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// First reference handed out for frames, scopes and values.
    pub reference_base: i64,
    /// Max size of a single debuggee output event.
    pub output_chunk_size: usize,
    /// REPL prefix that runs the rest of the line as an interpreter command.
    pub command_sigil: String,
    /// REPL prefix that evaluates the rest of the line as an expression.
    pub expression_sigil: String,
    /// Display value of a variable the engine can't render.
    pub unavailable_marker: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            reference_base: 1000,
            output_chunk_size: 1024,
            command_sigil: "`".to_string(),
            expression_sigil: "?".to_string(),
            unavailable_marker: "<unavailable>".to_string(),
        }
    }
}

impl AdapterConfig {
    const DEFAULT_PATH: &'static str = ".config/dapbridge/config.toml";

    /// Load config from file, a default file is used if `path` is [`None`].
    /// Fall back to defaults on any error.
    pub fn from_file(path: Option<&Path>) -> Self {
        let data = match path {
            None => {
                let Some(home) = home::home_dir() else {
                    return Self::default();
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Self::default(),
                }
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    log::error!(target: "session", "Error while load config file: {err}");
                    return Self::default();
                }
            },
        };

        weak_error!(Self::parse(&data), "malformed config, defaults are used:").unwrap_or_default()
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let config: AdapterConfig = toml::from_str(data)?;
        if config.output_chunk_size == 0 {
            anyhow::bail!("output_chunk_size must be positive");
        }
        Ok(config)
    }
}
