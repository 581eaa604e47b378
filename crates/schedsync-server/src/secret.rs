//! Secret reference resolver.
//!
//! Credential values in `config.toml` may point elsewhere instead of
//! holding the secret inline:
//!
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - `file::/path/to/secret` reads the first line of the file
//! - anything else is used as-is

use std::path::Path;

/// Resolves a value that may contain a secret reference prefix.
pub fn resolve(value: &str) -> Result<String, String> {
    if let Some(var) = value.strip_prefix("env::") {
        resolve_env(var)
    } else if let Some(path) = value.strip_prefix("file::") {
        resolve_file(Path::new(path))
    } else {
        Ok(value.to_string())
    }
}

fn resolve_env(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("environment variable `{var}` is not set"))
}

fn resolve_file(path: &Path) -> Result<String, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read `{}`: {e}", path.display()))?;
    content
        .lines()
        .next()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .ok_or_else(|| format!("`{}` is empty", path.display()))
}
