use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.yaml` / `.yml` are YAML; everything else is treated as JSON.
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => DocumentFormat::Yaml,
            _ => DocumentFormat::Json,
        }
    }
}

/// Read a JSON or YAML request file into a typed struct.
pub fn read_file<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_document(
        &contents,
        DocumentFormat::from_path(&canonical),
        &canonical.display().to_string(),
    )
}

pub fn parse_document<T: DeserializeOwned>(
    contents: &str,
    format: DocumentFormat,
    source: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    let parsed = match format {
        DocumentFormat::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        DocumentFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| format!("Failed to parse {source} as {format:?}: {e}").into())
}

fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };
    if !canonical.is_file() {
        return Err(format!("Not a readable file: {}", canonical.display()).into());
    }
    Ok(canonical)
}
