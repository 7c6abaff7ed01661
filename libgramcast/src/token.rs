//! Long-lived access token lifecycle
//!
//! [`TokenManager`] answers three questions: is the token still good, how
//! many days does it have left, and should it be renewed now. A check that
//! cannot reach a verdict is reported as [`TokenHealth::Unknown`], which
//! unattended callers must treat exactly like an invalid token.
//!
//! Every valid check and every refresh rewrites a small JSON status snapshot
//! (`token_info.json`). The snapshot is advisory; the token itself lives in
//! the secret store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::TokenConfig;
use crate::error::{CredentialError, Result};
use crate::graph::{AppCredentials, GraphApi};
use crate::secrets::{AccountSecrets, SecretStore, ACCESS_TOKEN};

const SECONDS_PER_DAY: i64 = 86_400;

/// Upper bound on a reported `expires_in` (100 years)
const MAX_EXPIRES_IN: i64 = 100 * 365 * SECONDS_PER_DAY;

/// Source of "now"; replaceable so expiry arithmetic can be tested
pub type Clock = fn() -> DateTime<Utc>;

/// Whole days until expiry, or no expiry at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaysRemaining {
    Finite(i64),
    Never,
}

impl DaysRemaining {
    /// Whether `threshold` days or fewer remain
    pub fn within(&self, threshold: i64) -> bool {
        match self {
            DaysRemaining::Finite(days) => *days <= threshold,
            DaysRemaining::Never => false,
        }
    }

    pub fn as_days(&self) -> Option<i64> {
        match self {
            DaysRemaining::Finite(days) => Some(*days),
            DaysRemaining::Never => None,
        }
    }
}

impl std::fmt::Display for DaysRemaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaysRemaining::Finite(days) => write!(f, "{}", days),
            DaysRemaining::Never => write!(f, "infinite"),
        }
    }
}

/// Result of a token check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenHealth {
    Valid {
        expires_at: Option<DateTime<Utc>>,
        days: DaysRemaining,
    },
    /// The platform says the token is not valid
    Invalid { reason: String },
    /// The check itself failed
    Unknown { reason: String },
}

impl TokenHealth {
    pub fn valid(&self) -> bool {
        matches!(self, TokenHealth::Valid { .. })
    }

    /// Days left; zero for anything but a valid token
    pub fn days_remaining(&self) -> DaysRemaining {
        match self {
            TokenHealth::Valid { days, .. } => *days,
            _ => DaysRemaining::Finite(0),
        }
    }
}

impl std::fmt::Display for TokenHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenHealth::Valid {
                expires_at: Some(at),
                days,
            } => write!(f, "valid, expires {} ({} days remaining)", at.to_rfc3339(), days),
            TokenHealth::Valid { expires_at: None, .. } => write!(f, "valid, never expires"),
            TokenHealth::Invalid { reason } => write!(f, "invalid: {}", reason),
            TokenHealth::Unknown { reason } => write!(f, "unknown: {}", reason),
        }
    }
}

/// What [`TokenManager::auto_refresh_if_needed`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nothing to do
    Healthy(DaysRemaining),
    /// The token was exchanged for a new one
    Refreshed { days: Option<i64> },
}

/// Persisted last-known token status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatusSnapshot {
    pub last_checked: DateTime<Utc>,
    /// `null` when the token does not expire or the expiry is unknown
    pub expires_at: Option<DateTime<Utc>>,
    pub days_remaining: Option<i64>,
    pub account_id: String,
}

impl TokenStatusSnapshot {
    /// Read a snapshot; `Ok(None)` when none has been written yet
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot = serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {}", path.display(), e),
            )
        })?;
        Ok(Some(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Checks and renews the account's long-lived access token
pub struct TokenManager {
    graph: Arc<dyn GraphApi>,
    store: Arc<dyn SecretStore>,
    app: AppCredentials,
    account_id: String,
    token: SecretString,
    status_file: PathBuf,
    refresh_threshold_days: i64,
    clock: Clock,
}

impl TokenManager {
    /// Create a manager for the account described by `secrets`
    ///
    /// # Errors
    ///
    /// Fails when `APP_ID` or `APP_SECRET` is missing; both are needed to
    /// inspect or exchange a token.
    pub fn new(
        graph: Arc<dyn GraphApi>,
        store: Arc<dyn SecretStore>,
        secrets: &AccountSecrets,
        config: &TokenConfig,
    ) -> Result<Self> {
        Ok(Self {
            graph,
            store,
            app: secrets.app_credentials()?,
            account_id: secrets.account_id.clone(),
            token: secrets.access_token.clone(),
            status_file: config.expand_status_file(),
            refresh_threshold_days: config.refresh_threshold_days,
            clock: Utc::now,
        })
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The token currently in use (updated by refreshes)
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn status_file(&self) -> &Path {
        &self.status_file
    }

    /// Ask the platform about the current token
    ///
    /// Never fails: transport and response errors come back as
    /// [`TokenHealth::Unknown`]. A valid result overwrites the snapshot.
    pub async fn check_status(&self) -> TokenHealth {
        let introspection = match self.graph.introspect_token(&self.app, &self.token).await {
            Ok(introspection) => introspection,
            Err(e) => {
                warn!("Token check failed: {}", e);
                return TokenHealth::Unknown {
                    reason: e.to_string(),
                };
            }
        };

        if !introspection.is_valid {
            let reason = introspection
                .error_message
                .unwrap_or_else(|| "token is not valid".to_string());
            warn!("Access token is invalid: {}", reason);
            return TokenHealth::Invalid { reason };
        }

        let now = (self.clock)();
        let health = match introspection.expires_at {
            None | Some(0) => TokenHealth::Valid {
                expires_at: None,
                days: DaysRemaining::Never,
            },
            Some(timestamp) => match Utc.timestamp_opt(timestamp, 0).single() {
                Some(expires_at) => TokenHealth::Valid {
                    expires_at: Some(expires_at),
                    days: DaysRemaining::Finite(days_between(now, expires_at)),
                },
                None => {
                    return TokenHealth::Unknown {
                        reason: format!("expires_at out of range: {}", timestamp),
                    }
                }
            },
        };

        info!("Access token is {}", health);

        let expires_at = match &health {
            TokenHealth::Valid { expires_at, .. } => *expires_at,
            _ => None,
        };
        self.write_snapshot(TokenStatusSnapshot {
            last_checked: now,
            expires_at,
            days_remaining: health.days_remaining().as_days(),
            account_id: self.account_id.clone(),
        });

        health
    }

    /// Exchange the current token for a fresh long-lived one and store it
    ///
    /// The new token is available from [`TokenManager::token`] afterwards.
    pub async fn refresh(&mut self) -> Result<RefreshOutcome> {
        info!("Refreshing access token");
        let current = self.token.clone();
        let days = self.exchange_and_store(&current).await?;
        Ok(RefreshOutcome::Refreshed { days })
    }

    /// Turn a short-lived user token into a long-lived one and store it
    pub async fn exchange_short_lived(&mut self, short_lived: &SecretString) -> Result<RefreshOutcome> {
        info!("Exchanging short-lived token for a long-lived one");
        let days = self.exchange_and_store(short_lived).await?;
        Ok(RefreshOutcome::Refreshed { days })
    }

    /// The unattended entry point
    ///
    /// # Errors
    ///
    /// An invalid token, or one whose status could not be determined, yields
    /// `CredentialError::Invalid`: only a manual replacement fixes it.
    pub async fn auto_refresh_if_needed(&mut self) -> Result<RefreshOutcome> {
        match self.check_status().await {
            TokenHealth::Invalid { reason } | TokenHealth::Unknown { reason } => {
                Err(CredentialError::Invalid(format!(
                    "{} (a new token must be generated manually)",
                    reason
                ))
                .into())
            }
            TokenHealth::Valid { days, .. } if days.within(self.refresh_threshold_days) => {
                info!(
                    "{} days remaining (threshold {}), refreshing",
                    days, self.refresh_threshold_days
                );
                self.refresh().await
            }
            TokenHealth::Valid { days, .. } => {
                info!("Token healthy ({} days remaining), no refresh needed", days);
                Ok(RefreshOutcome::Healthy(days))
            }
        }
    }

    /// The last snapshot written, if any
    pub fn load_snapshot(&self) -> Result<Option<TokenStatusSnapshot>> {
        TokenStatusSnapshot::load(&self.status_file)
    }

    /// Exchange `token`, store the result and return its whole days of validity
    async fn exchange_and_store(&mut self, token: &SecretString) -> Result<Option<i64>> {
        let exchanged = self
            .graph
            .exchange_token(&self.app, token)
            .await
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;

        self.store.set(ACCESS_TOKEN, &exchanged.access_token)?;
        self.token = exchanged.access_token;
        info!("Stored new access token in {}", self.store.backend_name());

        let now = (self.clock)();
        let (expires_at, days_remaining) = match exchanged.expires_in {
            Some(seconds) => {
                let seconds = i64::try_from(seconds)
                    .unwrap_or(MAX_EXPIRES_IN)
                    .min(MAX_EXPIRES_IN);
                (
                    now.checked_add_signed(Duration::seconds(seconds)),
                    Some(seconds / SECONDS_PER_DAY),
                )
            }
            None => (None, None),
        };

        self.write_snapshot(TokenStatusSnapshot {
            last_checked: now,
            expires_at,
            days_remaining,
            account_id: self.account_id.clone(),
        });

        Ok(days_remaining)
    }

    fn write_snapshot(&self, snapshot: TokenStatusSnapshot) {
        // The snapshot is advisory; a write failure must not fail the check
        if let Err(e) = snapshot.save(&self.status_file) {
            warn!(
                "Failed to write token status to {}: {}",
                self.status_file.display(),
                e
            );
        }
    }
}

/// Whole days from `now` until `expires_at`, rounded down
fn days_between(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    (expires_at.timestamp() - now.timestamp()).div_euclid(SECONDS_PER_DAY)
}
