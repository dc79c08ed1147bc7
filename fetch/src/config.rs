use std::{io, path::Path};

use proxy_agent::AgentOptions;
use thiserror::Error;

pub fn read_agent_options(path: &Path) -> Result<AgentOptions, ReadConfigError> {
    let src = std::fs::read_to_string(path)?;
    parse_agent_options(&path.to_string_lossy(), &src)
}

pub fn parse_agent_options(file_path: &str, src: &str) -> Result<AgentOptions, ReadConfigError> {
    toml::from_str(src).map_err(|e| ReadConfigError::Toml(human_toml_error(file_path, src, e)))
}

#[derive(Debug, Error)]
pub enum ReadConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Toml(String),
}

pub fn human_toml_error(file_path: &str, src: &str, e: toml::de::Error) -> String {
    let Some(span) = e.span() else {
        return format!("{e}");
    };
    // Spans are byte offsets
    let affected = src.get(span.clone()).unwrap_or_default();
    let (line, col) = {
        let before = src.get(..span.start).unwrap_or(src);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let col = before[line_start..].chars().count() + 1;
        (line, col)
    };
    let msg = e.message();
    format!(
        "{msg}
File `{file_path}`
Line {line}, Column {col}
Affected: #'{affected}'#"
    )
}
