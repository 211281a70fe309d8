pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;
use tracing::debug;

/// Load a request from `--input` or, failing that, from piped stdin.
pub fn read_request<T: DeserializeOwned>(
    path: &Option<String>,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        debug!(path = %path, "reading request file");
        return file::read_file(path);
    }
    debug!("reading request from stdin");
    stdin::read_stdin()?
        .ok_or_else(|| "Provide --input <file.json|file.yaml> or pipe a request via stdin".into())
}
