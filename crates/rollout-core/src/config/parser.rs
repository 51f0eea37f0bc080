//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};

use super::schema::RolloutConfig;

/// Parse a rollout.toml file.
pub fn parse_rollout_toml(path: &Path) -> Result<RolloutConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_rollout_toml_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse rollout.toml content from a string.
pub fn parse_rollout_toml_str(content: &str) -> Result<RolloutConfig> {
    let config: RolloutConfig =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    config.validate()?;
    Ok(config)
}

fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    match error.span().map(|span| line_of(content, span.start)) {
        Some(line) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line,
            line_context(content, line),
            message
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

/// 1-based line containing byte `offset`.
fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() + 1
}

fn line_context(content: &str, line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line.saturating_sub(2);
    let end = (line + 1).min(lines.len());

    lines[start.min(end)..end]
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let number = start + i + 1;
            let marker = if number == line { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, number, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Serialize a configuration back to TOML.
pub fn to_toml(config: &RolloutConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}
