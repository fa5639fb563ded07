//! Turning a requested name into a registry identity.

use std::path::Path;

/// Derives the canonical identity of a requested artifact name.
pub trait PathResolver: Send + Sync {
    /// Returns the identity, or the reason the name cannot be resolved.
    fn resolve(&self, name: &str) -> Result<String, String>;
}

/// Resolves names to absolute paths with symlinks removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalPathResolver;

impl PathResolver for CanonicalPathResolver {
    fn resolve(&self, name: &str) -> Result<String, String> {
        let path = std::fs::canonicalize(Path::new(name)).map_err(|e| e.to_string())?;
        path.into_os_string()
            .into_string()
            .map_err(|p| format!("path is not valid UTF-8: {}", p.to_string_lossy()))
    }
}

/// Uses the requested name verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralPathResolver;

impl PathResolver for LiteralPathResolver {
    fn resolve(&self, name: &str) -> Result<String, String> {
        Ok(name.to_string())
    }
}
