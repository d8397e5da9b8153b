//! Agent settings: built-in defaults, then an optional file, then
//! `CLOUDATLAS_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

// config lets you read a separate config file
use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::engine::EngineSettings;
use crate::error::{AtlasError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// How often installed queries are re-evaluated.
    pub query_interval_ms: u64,
    /// Address the HTTP surface listens on.
    pub bind: String,
    /// Queries installed at the root when the agent starts.
    #[serde(default)]
    pub queries_file: Option<PathBuf>,
    /// Fallback tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Start with the reference hierarchy instead of a bare root.
    pub sample_hierarchy: bool,
}

impl Settings {
    /// Loads settings; a missing file is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("query_interval_ms", 4000)?
            .set_default("bind", "127.0.0.1:5995")?
            .set_default("log_filter", "info")?
            .set_default("sample_hierarchy", true)?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings: Settings = builder
            .add_source(Environment::with_prefix("CLOUDATLAS").try_parsing(true))
            .build()?
            .try_deserialize()?;
        if settings.query_interval_ms == 0 {
            return Err(AtlasError::Config("query_interval_ms must be positive".into()));
        }
        Ok(settings)
    }
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings { query_interval: Duration::from_millis(self.query_interval_ms) }
    }
}

/// One query to install: attribute name and the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefinition {
    pub name: String,
    pub queries: String,
}

pub fn read_query_file(path: &Path) -> Result<Vec<QueryDefinition>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AtlasError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_query_lines(&text)
}

/// Parses lines of the form `&name: SELECT ...; SELECT ...`. Blank lines and
/// lines starting with `#` are skipped.
pub fn parse_query_lines(text: &str) -> Result<Vec<QueryDefinition>> {
    let mut definitions = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, queries) = line.split_once(':').ok_or_else(|| AtlasError::Parse {
            message: "expected `&name: query`".into(),
            line: Some(number + 1),
            col: None,
        })?;
        definitions.push(QueryDefinition { name: name.trim().to_string(), queries: queries.trim().to_string() });
    }
    Ok(definitions)
}
