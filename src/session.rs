use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::types::UserProfile;

pub const DEFAULT_SESSION_FILE: &str = "absensi-session.json";

/// Keeps the last login response on disk. There is no expiry: the profile
/// stays until `clear` is called or the file is removed.
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

    pub fn save(&self, profile: &UserProfile) -> Result<()> {
        let json = serde_json::to_string_pretty(profile)?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write session file: {}", self.path.display()))
    }

    /// `None` when nobody is logged in.
    pub fn load(&self) -> Result<Option<UserProfile>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read session file: {}", self.path.display())
                })
            }
        };
        let profile = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt session file: {}", self.path.display()))?;
        Ok(Some(profile))
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove session file: {}", self.path.display())),
        }
    }
}
