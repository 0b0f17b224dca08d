//! Authentication state shared by every request.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Process-wide slot holding the bearer token, if any.
///
/// Cloning shares the slot, so the API client sees a token set or cleared
/// anywhere else without being rebuilt.
#[derive(Debug, Clone, Default)]
pub struct AuthSlot {
  token: Arc<RwLock<Option<String>>>,
}

impl AuthSlot {
  pub fn new(token: Option<String>) -> Self {
    Self {
      token: Arc::new(RwLock::new(token)),
    }
  }

  pub fn token(&self) -> Option<String> {
    self
      .token
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .clone()
  }

  pub fn set(&self, token: impl Into<String>) {
    let token = token.into();
    let mut slot = self
      .token
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = if token.trim().is_empty() {
      None
    } else {
      Some(token)
    };
  }

  pub fn clear(&self) {
    let mut slot = self
      .token
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = None;
  }
}

/// Token persisted between runs in the user's data directory.
#[derive(Debug, Clone)]
pub struct TokenStore {
  path: PathBuf,
}

impl TokenStore {
  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Store under `$XDG_DATA_HOME/kvdash/auth_token`.
  pub fn open_default() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(Self::at(data_dir.join("kvdash").join("auth_token")))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn load(&self) -> Result<Option<String>> {
    if !self.path.exists() {
      return Ok(None);
    }

    let contents = std::fs::read_to_string(&self.path)
      .map_err(|e| eyre!("Failed to read token file {}: {}", self.path.display(), e))?;

    let token = contents.trim();
    Ok(if token.is_empty() {
      None
    } else {
      Some(token.to_string())
    })
  }

  pub fn save(&self, token: &str) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create token directory: {}", e))?;
    }

    std::fs::write(&self.path, token.trim())
      .map_err(|e| eyre!("Failed to write token file {}: {}", self.path.display(), e))
  }

  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!(
        "Failed to remove token file {}: {}",
        self.path.display(),
        e
      )),
    }
  }
}
