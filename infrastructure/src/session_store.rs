use anyhow::Context;
use domain::session::TokenSet;
use shared::types::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Token set persisted between runs, so a new process can pick up an
/// existing identity-provider session instead of logging in again.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable files count as "no stored session".
    pub fn load(&self) -> Option<TokenSet> {
        let data = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&data) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!("Ignoring corrupt session file {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn save(&self, tokens: &TokenSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let serialized = serde_json::to_string_pretty(tokens)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write session file at {:?}", self.path))?;
        restrict_permissions(&self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove session file at {:?}", self.path))?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
