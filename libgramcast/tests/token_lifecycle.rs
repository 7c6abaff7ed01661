//! Token check and refresh tests against the mock graph

use chrono::{DateTime, TimeZone, Utc};
use secrecy::ExposeSecret;
use std::sync::Arc;

use libgramcast::config::TokenConfig;
use libgramcast::error::{CredentialError, GramcastError, PlatformError};
use libgramcast::graph::mock::{GraphCall, MockGraph};
use libgramcast::graph::TokenIntrospection;
use libgramcast::secrets::{AccountSecrets, MemoryStore, SecretStore, ACCESS_TOKEN};
use libgramcast::token::{
    DaysRemaining, RefreshOutcome, TokenHealth, TokenManager, TokenStatusSnapshot,
};
use tempfile::TempDir;

const NOW: i64 = 1_750_000_000;
const DAY: i64 = 86_400;

fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(NOW, 0).single().unwrap()
}

fn secrets() -> AccountSecrets {
    AccountSecrets {
        account_id: "17841400000000000".to_string(),
        access_token: "EAAcurrent".to_string().into(),
        app_id: Some("123".to_string()),
        app_secret: Some("app-secret".to_string().into()),
        cloudinary_api_key: None,
        cloudinary_api_secret: None,
    }
}

struct Harness {
    _dir: TempDir,
    mock: Arc<MockGraph>,
    store: Arc<MemoryStore>,
    manager: TokenManager,
}

impl Harness {
    fn status_path(&self) -> &std::path::Path {
        self.manager.status_file()
    }
}

fn harness(mock: MockGraph) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = TokenConfig {
        status_file: dir
            .path()
            .join("token_info.json")
            .to_string_lossy()
            .to_string(),
        refresh_threshold_days: 7,
    };
    let mock = Arc::new(mock);
    let store = Arc::new(MemoryStore::new().with(ACCESS_TOKEN, "EAAcurrent"));

    let manager = TokenManager::new(mock.clone(), store.clone(), &secrets(), &config)
        .unwrap()
        .with_clock(fixed_now);

    Harness {
        _dir: dir,
        mock,
        store,
        manager,
    }
}

fn expiring_in(days: i64) -> MockGraph {
    MockGraph::new().with_introspection(TokenIntrospection {
        is_valid: true,
        expires_at: Some(NOW + days * DAY),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_check_three_days_ahead() {
    let h = harness(expiring_in(3));

    let health = h.manager.check_status().await;

    assert!(health.valid());
    assert_eq!(health.days_remaining(), DaysRemaining::Finite(3));

    let snapshot = TokenStatusSnapshot::load(h.status_path()).unwrap().unwrap();
    assert_eq!(snapshot.days_remaining, Some(3));
    assert_eq!(snapshot.expires_at.unwrap().timestamp(), NOW + 3 * DAY);
    assert_eq!(snapshot.last_checked, fixed_now());
    assert_eq!(snapshot.account_id, "17841400000000000");
}

#[tokio::test]
async fn test_check_without_expiry_is_infinite() {
    for expires_at in [None, Some(0)] {
        let h = harness(MockGraph::new().with_introspection(TokenIntrospection {
            is_valid: true,
            expires_at,
            ..Default::default()
        }));

        let health = h.manager.check_status().await;

        assert!(health.valid());
        assert_eq!(health.days_remaining(), DaysRemaining::Never);

        let snapshot = TokenStatusSnapshot::load(h.status_path()).unwrap().unwrap();
        assert_eq!(snapshot.expires_at, None);
        assert_eq!(snapshot.days_remaining, None);
    }
}

#[tokio::test]
async fn test_check_invalid_token() {
    let h = harness(MockGraph::new().with_introspection(TokenIntrospection {
        is_valid: false,
        error_message: Some("Session has expired".to_string()),
        ..Default::default()
    }));

    let health = h.manager.check_status().await;

    assert!(!health.valid());
    assert_eq!(health.days_remaining(), DaysRemaining::Finite(0));
    assert_eq!(
        health,
        TokenHealth::Invalid {
            reason: "Session has expired".to_string()
        }
    );
    // Only valid checks are recorded
    assert!(TokenStatusSnapshot::load(h.status_path()).unwrap().is_none());
}

#[tokio::test]
async fn test_check_failure_is_unknown() {
    let h = harness(
        MockGraph::new().with_introspection_error(PlatformError::Network("timed out".to_string())),
    );

    let health = h.manager.check_status().await;

    assert!(matches!(health, TokenHealth::Unknown { .. }));
    assert_eq!(health.days_remaining(), DaysRemaining::Finite(0));
}

#[tokio::test]
async fn test_check_uses_app_token() {
    let h = harness(expiring_in(30));
    h.manager.check_status().await;

    assert_eq!(
        h.mock.calls(),
        vec![GraphCall::IntrospectToken("EAAcurrent".to_string())]
    );
}

#[tokio::test]
async fn test_auto_refresh_at_five_days() {
    let mut h = harness(expiring_in(5).with_exchange("EAArefreshed", Some(60 * DAY as u64)));

    let outcome = h.manager.auto_refresh_if_needed().await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Refreshed { days: Some(60) });
    assert_eq!(h.mock.exchange_calls(), 1);
    assert_eq!(
        h.store.get(ACCESS_TOKEN).unwrap().unwrap().expose_secret(),
        "EAArefreshed"
    );
    assert_eq!(h.manager.token().expose_secret(), "EAArefreshed");

    let snapshot = TokenStatusSnapshot::load(h.status_path()).unwrap().unwrap();
    assert_eq!(snapshot.days_remaining, Some(60));
    assert_eq!(snapshot.expires_at.unwrap().timestamp(), NOW + 60 * DAY);
}

#[tokio::test]
async fn test_auto_refresh_at_ten_days_does_nothing() {
    let mut h = harness(expiring_in(10));

    let outcome = h.manager.auto_refresh_if_needed().await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Healthy(DaysRemaining::Finite(10)));
    assert_eq!(h.mock.exchange_calls(), 0);
    assert_eq!(
        h.store.get(ACCESS_TOKEN).unwrap().unwrap().expose_secret(),
        "EAAcurrent"
    );
}

#[tokio::test]
async fn test_auto_refresh_at_threshold_refreshes() {
    let mut h = harness(expiring_in(7));

    let outcome = h.manager.auto_refresh_if_needed().await.unwrap();

    assert!(matches!(outcome, RefreshOutcome::Refreshed { .. }));
    assert_eq!(h.mock.exchange_calls(), 1);
}

#[tokio::test]
async fn test_auto_refresh_never_expiring_does_nothing() {
    let mut h = harness(MockGraph::new());

    let outcome = h.manager.auto_refresh_if_needed().await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Healthy(DaysRemaining::Never));
    assert_eq!(h.mock.exchange_calls(), 0);
}

#[tokio::test]
async fn test_auto_refresh_fails_closed() {
    let invalid = MockGraph::new().with_introspection(TokenIntrospection {
        is_valid: false,
        ..Default::default()
    });
    let unknown =
        MockGraph::new().with_introspection_error(PlatformError::Network("reset".to_string()));

    for mock in [invalid, unknown] {
        let mut h = harness(mock);
        let err = h.manager.auto_refresh_if_needed().await.unwrap_err();

        assert!(matches!(
            err,
            GramcastError::Credential(CredentialError::Invalid(_))
        ));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(h.mock.exchange_calls(), 0);
    }
}

#[tokio::test]
async fn test_refresh_failure_keeps_old_token() {
    let mut h = harness(MockGraph::new().with_exchange_error(PlatformError::Api {
        code: 190,
        subcode: None,
        message: "Error validating access token".to_string(),
    }));

    let err = h.manager.refresh().await.unwrap_err();

    assert!(matches!(
        err,
        GramcastError::Credential(CredentialError::RefreshFailed(_))
    ));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(
        h.store.get(ACCESS_TOKEN).unwrap().unwrap().expose_secret(),
        "EAAcurrent"
    );
    assert!(TokenStatusSnapshot::load(h.status_path()).unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_without_expires_in_records_unknown_expiry() {
    let mut h = harness(MockGraph::new().with_exchange("EAAnew", None));

    let outcome = h.manager.refresh().await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Refreshed { days: None });
    assert_eq!(h.manager.token().expose_secret(), "EAAnew");
    let snapshot = TokenStatusSnapshot::load(h.status_path()).unwrap().unwrap();
    assert_eq!(snapshot.expires_at, None);
    assert_eq!(snapshot.days_remaining, None);
}

#[tokio::test]
async fn test_exchange_short_lived_token() {
    let mut h = harness(MockGraph::new().with_exchange("EAAlong", Some(5_184_000)));

    let outcome = h
        .manager
        .exchange_short_lived(&"EAAshort".to_string().into())
        .await
        .unwrap();

    assert_eq!(outcome, RefreshOutcome::Refreshed { days: Some(60) });
    assert_eq!(
        h.mock.calls(),
        vec![GraphCall::ExchangeToken("EAAshort".to_string())]
    );
    assert_eq!(
        h.store.get(ACCESS_TOKEN).unwrap().unwrap().expose_secret(),
        "EAAlong"
    );
    assert_eq!(
        h.manager.load_snapshot().unwrap().unwrap().days_remaining,
        Some(60)
    );
}

#[tokio::test]
async fn test_refresh_reports_days_when_snapshot_write_fails() {
    let dir = TempDir::new().unwrap();
    // A regular file where the snapshot's parent directory should be
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"x").unwrap();
    let config = TokenConfig {
        status_file: blocker
            .join("token_info.json")
            .to_string_lossy()
            .to_string(),
        refresh_threshold_days: 7,
    };
    let mock = Arc::new(expiring_in(2).with_exchange("EAAfresh", Some(60 * DAY as u64)));
    let store = Arc::new(MemoryStore::new().with(ACCESS_TOKEN, "EAAcurrent"));
    let mut manager = TokenManager::new(mock, store.clone(), &secrets(), &config)
        .unwrap()
        .with_clock(fixed_now);

    let outcome = manager.auto_refresh_if_needed().await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Refreshed { days: Some(60) });
    assert!(!matches!(manager.load_snapshot(), Ok(Some(_))));
    assert_eq!(
        store.get(ACCESS_TOKEN).unwrap().unwrap().expose_secret(),
        "EAAfresh"
    );
}
