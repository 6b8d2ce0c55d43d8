use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, info};

pub const CREDENTIAL_KEY: &str = "gemini-api-key";

/// Holds the single API credential the app works with.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, credential: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores the credential in a file named after [`CREDENTIAL_KEY`] inside a
/// storage directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        FileCredentialStore {
            path: storage_dir.as_ref().join(CREDENTIAL_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let value = raw.trim();
                if value.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(value.to_string()))
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to read credential at {}", self.path.display())),
        }
    }

    fn save(&self, credential: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create storage directory {}", parent.display())
            })?;
        }
        fs::write(&self.path, credential.trim())
            .with_context(|| format!("Failed to write credential to {}", self.path.display()))?;
        restrict_permissions(&self.path);
        info!("Stored API credential at {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared API credential at {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove credential at {}", self.path.display())),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        debug!("Could not restrict permissions on {}: {}", path.display(), err);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(path: &Path) {
    debug!("Leaving default permissions on {}", path.display());
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    #[cfg(test)]
    pub fn with_credential(credential: &str) -> Self {
        MemoryCredentialStore {
            value: Mutex::new(Some(credential.to_string())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.value.lock().clone())
    }

    fn save(&self, credential: &str) -> Result<()> {
        *self.value.lock() = Some(credential.trim().to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.value.lock() = None;
        Ok(())
    }
}
