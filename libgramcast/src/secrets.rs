//! Secret storage
//!
//! The access token is the one secret that changes at runtime: a refresh
//! replaces it in place wherever it is authoritatively stored. Two backends
//! are provided:
//!
//! - [`EnvFileStore`]: a dotenv file, rewritten line by line so comments and
//!   other keys survive a refresh
//! - [`KeyringStore`]: the OS keyring, service `gramcast`
//!
//! [`AccountSecrets`] gathers everything a run needs up front (store first,
//! process environment second) so the rest of the library never reads the
//! environment itself.
//!
//! # Example
//!
//! ```no_run
//! use libgramcast::secrets::{AccountSecrets, EnvFileStore, SecretStore, ACCESS_TOKEN};
//!
//! # fn example() -> libgramcast::error::Result<()> {
//! let store = EnvFileStore::new(".env");
//! let secrets = AccountSecrets::load(&store)?;
//! println!("Posting as account {}", secrets.account_id);
//!
//! store.set(ACCESS_TOKEN, &"EAAnew...".to_string().into())?;
//! # Ok(())
//! # }
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::{CredentialsConfig, StorageBackend};
use crate::error::{ConfigError, CredentialError, Result};
use crate::graph::AppCredentials;

pub const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const APP_ID: &str = "APP_ID";
pub const APP_SECRET: &str = "APP_SECRET";
pub const ACCOUNT_ID: &str = "ACCOUNT_ID";
pub const CLOUDINARY_API: &str = "CLOUDINARY_API";
pub const CLOUDINARY_SECRET: &str = "CLOUDINARY_SECRET";

/// Keyring service name
pub const KEYRING_SERVICE: &str = "gramcast";

/// A place secrets can be read from and written back to
pub trait SecretStore: Send + Sync {
    /// Look up `key`; `Ok(None)` when it is simply not set
    fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &SecretString) -> Result<()>;

    fn backend_name(&self) -> &str;
}

/// Open the backend selected by `[credentials]`
pub fn open_store(config: &CredentialsConfig) -> Box<dyn SecretStore> {
    match config.storage {
        StorageBackend::EnvFile => Box::new(EnvFileStore::new(config.expand_env_file())),
        StorageBackend::Keyring => Box::new(KeyringStore::new()),
    }
}

/// Dotenv file backend
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, reason: impl std::fmt::Display) -> CredentialError {
        CredentialError::Store {
            backend: self.backend_name().to_string(),
            reason: format!("{}: {}", self.path.display(), reason),
        }
    }
}

impl SecretStore for EnvFileStore {
    fn get(&self, key: &str) -> Result<Option<SecretString>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let entries = dotenvy::from_path_iter(&self.path).map_err(|e| self.store_error(e))?;
        let mut found = None;
        for entry in entries {
            let (name, value) = entry.map_err(|e| self.store_error(e))?;
            // Later assignments win, as when the file is sourced
            if name == key {
                found = Some(value);
            }
        }

        Ok(found
            .filter(|value| !value.is_empty())
            .map(SecretString::from))
    }

    fn set(&self, key: &str, value: &SecretString) -> Result<()> {
        let existing = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.store_error(e).into()),
        };

        let updated = replace_assignment(&existing, key, value.expose_secret());

        // Write next to the target and rename so a crash never leaves a truncated file
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, updated).map_err(|e| self.store_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&tmp_path, perms).map_err(|e| self.store_error(e))?;
        }

        std::fs::rename(&tmp_path, &self.path).map_err(|e| self.store_error(e))?;

        tracing::debug!("Stored {} in {}", key, self.path.display());
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "env_file"
    }
}

/// Replace every `KEY=...` (or `export KEY=...`) line, or append one
fn replace_assignment(content: &str, key: &str, value: &str) -> String {
    let assignment = format!("{}={}", key, quote_value(value));
    let mut replaced = false;

    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            if assigns_key(line, key) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(assignment);
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

fn assigns_key(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed).trim_start();
    trimmed
        .strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

fn quote_value(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_-.|:/+=@".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// OS keyring backend
///
/// Each secret is an entry under service `gramcast` with the secret name as
/// the user. The keyring cannot enumerate entries, so only named lookups work.
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| {
            CredentialError::Store {
                backend: self.backend_name().to_string(),
                reason: format!("OS keyring not accessible: {}", e),
            }
            .into()
        })
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<SecretString>> {
        match self.entry(key)?.get_password() {
            Ok(password) => {
                tracing::debug!("Retrieved {} from OS keyring", key);
                Ok(Some(SecretString::from(password)))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Store {
                backend: self.backend_name().to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    fn set(&self, key: &str, value: &SecretString) -> Result<()> {
        self.entry(key)?
            .set_password(value.expose_secret())
            .map_err(|e| CredentialError::Store {
                backend: self.backend_name().to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Stored {} in OS keyring", key);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

/// In-memory backend, for tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.lock().insert(key.to_string(), value.to_string());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<SecretString>> {
        Ok(self.lock().get(key).cloned().map(SecretString::from))
    }

    fn set(&self, key: &str, value: &SecretString) -> Result<()> {
        self.lock()
            .insert(key.to_string(), value.expose_secret().to_string());
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

/// Everything a run needs to talk to the account, read once at start-up
pub struct AccountSecrets {
    pub account_id: String,
    pub access_token: SecretString,
    pub app_id: Option<String>,
    pub app_secret: Option<SecretString>,
    pub cloudinary_api_key: Option<String>,
    pub cloudinary_api_secret: Option<SecretString>,
}

impl AccountSecrets {
    /// Read secrets from `store`, falling back to the process environment
    ///
    /// # Errors
    ///
    /// `ACCOUNT_ID` and `ACCESS_TOKEN` are required; the rest are optional
    /// and only checked by the operations that need them.
    pub fn load(store: &dyn SecretStore) -> Result<Self> {
        Self::load_inner(store, None)
    }

    /// Like [`AccountSecrets::load`], but with the access token supplied by
    /// the caller (first-time setup, before any token has been stored)
    pub fn load_with_access_token(store: &dyn SecretStore, access_token: SecretString) -> Result<Self> {
        Self::load_inner(store, Some(access_token))
    }

    fn load_inner(store: &dyn SecretStore, access_token: Option<SecretString>) -> Result<Self> {
        let lookup = |key: &str| -> Result<Option<SecretString>> {
            if let Some(value) = store.get(key)? {
                return Ok(Some(value));
            }
            Ok(std::env::var(key)
                .ok()
                .filter(|value| !value.is_empty())
                .map(SecretString::from))
        };
        let required = |key: &str| -> Result<SecretString> {
            lookup(key)?.ok_or_else(|| ConfigError::MissingSecret(key.to_string()).into())
        };
        let plain = |value: SecretString| value.expose_secret().to_string();

        Ok(Self {
            account_id: plain(required(ACCOUNT_ID)?),
            access_token: match access_token {
                Some(token) => token,
                None => required(ACCESS_TOKEN)?,
            },
            app_id: lookup(APP_ID)?.map(plain),
            app_secret: lookup(APP_SECRET)?,
            cloudinary_api_key: lookup(CLOUDINARY_API)?.map(plain),
            cloudinary_api_secret: lookup(CLOUDINARY_SECRET)?,
        })
    }

    /// App id and secret, needed for token introspection and exchange
    pub fn app_credentials(&self) -> Result<AppCredentials> {
        let app_id = self
            .app_id
            .clone()
            .ok_or_else(|| ConfigError::MissingSecret(APP_ID.to_string()))?;
        let app_secret = self
            .app_secret
            .clone()
            .ok_or_else(|| ConfigError::MissingSecret(APP_SECRET.to_string()))?;

        Ok(AppCredentials::new(app_id, app_secret))
    }
}
