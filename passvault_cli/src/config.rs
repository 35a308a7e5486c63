//! PassVault CLI - Local configuration
//!
//! One JSON file, by default `~/.passvault/config.json`, holding where the
//! record store lives, who to log in as, and the user's settings (timeouts
//! and defaults for new credentials). Secrets never go in here.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use passvault_core::{KdfParams, DEFAULT_CATEGORY, DEFAULT_GENERATED_LENGTH};
use passvault_core::policy::{MAX_GENERATED_LENGTH, MIN_GENERATED_LENGTH};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "PASSVAULT_CONFIG";

const CONFIG_DIR: &str = ".passvault";
const CONFIG_FILE: &str = "config.json";
const MAX_TIMEOUT_MINUTES: u64 = 24 * 60;
const MAX_CLIPBOARD_SECONDS: u64 = 60 * 60;

/// Persisted CLI settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Base URL of the record store
    pub store_url: String,
    /// Operator login for the record store
    pub operator_identity: String,
    /// Idle minutes before the vault locks itself
    pub session_timeout_minutes: u64,
    /// Set once `init` has created the vault
    pub initialized: bool,
    /// Argon2 parameters for new vaults and master password changes
    pub kdf: KdfParams,
    /// Seconds a copied secret stays on the clipboard
    pub clipboard_timeout_seconds: u64,
    /// Category for new credentials
    pub default_category: String,
    /// Length of generated passwords
    pub password_length: usize,
    /// Whether generated passwords include symbols
    pub include_symbols: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            store_url: "http://127.0.0.1:8090".into(),
            operator_identity: String::new(),
            session_timeout_minutes: 5,
            initialized: false,
            kdf: KdfParams::default(),
            clipboard_timeout_seconds: 30,
            default_category: DEFAULT_CATEGORY.into(),
            password_length: DEFAULT_GENERATED_LENGTH,
            include_symbols: true,
        }
    }
}

impl LocalConfig {
    /// `$PASSVAULT_CONFIG`, else `~/.passvault/config.json`
    pub fn default_path() -> CliResult<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::Config("cannot determine home directory".into()))?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let data = fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write atomically with owner-only permissions.
    pub fn save(&self, path: &Path) -> CliResult<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            create_private_dir(parent)?;
        }

        let data = serde_json::to_vec_pretty(self)?;
        let temp_path = path.with_extension("tmp");

        let mut file = private_file_options().open(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;

        debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn validate(&self) -> CliResult<()> {
        let url = self.store_url.trim();
        if url.is_empty() {
            return Err(CliError::Config("store_url is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CliError::Config(format!(
                "store_url must start with http:// or https://, got {}",
                url
            )));
        }
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&self.session_timeout_minutes) {
            return Err(CliError::Config(format!(
                "session_timeout_minutes must be between 1 and {}",
                MAX_TIMEOUT_MINUTES
            )));
        }
        if !(1..=MAX_CLIPBOARD_SECONDS).contains(&self.clipboard_timeout_seconds) {
            return Err(CliError::Config(format!(
                "clipboard_timeout_seconds must be between 1 and {}",
                MAX_CLIPBOARD_SECONDS
            )));
        }
        if self.default_category.trim().is_empty() {
            return Err(CliError::Config("default_category is empty".into()));
        }
        if !(MIN_GENERATED_LENGTH..=MAX_GENERATED_LENGTH).contains(&self.password_length) {
            return Err(CliError::Config(format!(
                "password_length must be between {} and {}",
                MIN_GENERATED_LENGTH, MAX_GENERATED_LENGTH
            )));
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes * 60)
    }

    pub fn clipboard_timeout(&self) -> Duration {
        Duration::from_secs(self.clipboard_timeout_seconds)
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> CliResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> CliResult<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

fn private_file_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = LocalConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, LocalConfig::default());
        assert_eq!(config.session_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = LocalConfig {
            store_url: "https://vault.example".into(),
            operator_identity: "admin@example.com".into(),
            session_timeout_minutes: 15,
            initialized: true,
            kdf: KdfParams::low_memory(),
            clipboard_timeout_seconds: 45,
            default_category: "work".into(),
            password_length: 32,
            include_symbols: false,
        };
        config.save(&path).unwrap();

        assert_eq!(LocalConfig::load(&path).unwrap(), config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");
        LocalConfig::default().save(&path).unwrap();

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"store_url":"http://localhost:8090","initialized":true}"#).unwrap();

        let config = LocalConfig::load(&path).unwrap();
        assert!(config.initialized);
        assert_eq!(config.session_timeout_minutes, 5);
        assert_eq!(config.kdf, KdfParams::default());
        assert_eq!(config.clipboard_timeout(), Duration::from_secs(30));
        assert_eq!(config.default_category, "general");
        assert_eq!(config.password_length, 20);
        assert!(config.include_symbols);
    }

    #[test]
    fn test_validation() {
        let mut config = LocalConfig::default();
        assert!(config.validate().is_ok());

        config.store_url = "ftp://nope".into();
        assert!(matches!(config.validate(), Err(CliError::Config(_))));

        config.store_url = "http://ok".into();
        config.session_timeout_minutes = 0;
        assert!(config.validate().is_err());
        config.session_timeout_minutes = MAX_TIMEOUT_MINUTES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_settings_validation() {
        let defaults = LocalConfig::default();

        let config = LocalConfig {
            clipboard_timeout_seconds: 0,
            ..defaults.clone()
        };
        assert!(config.validate().is_err());

        let config = LocalConfig {
            default_category: "   ".into(),
            ..defaults.clone()
        };
        assert!(config.validate().is_err());

        for length in [MIN_GENERATED_LENGTH - 1, MAX_GENERATED_LENGTH + 1] {
            let config = LocalConfig {
                password_length: length,
                ..defaults.clone()
            };
            assert!(matches!(config.validate(), Err(CliError::Config(_))));
        }
    }
}
