use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::*;
use crate::clock::{Clock, ManualClock};
use crate::error::{CryptoError, StorageError};
use crate::storage::{InMemorySecureStorage, SecureStorage};

fn fast_hashing(algorithm: PasswordAlgorithm) -> PasswordHashingConfig {
    PasswordHashingConfig {
        algorithm,
        argon2: Argon2Params {
            memory_cost_kib: 256,
            time_cost: 1,
            parallelism: 1,
        },
        pbkdf2_iterations: 1_000,
        ..PasswordHashingConfig::default()
    }
}

fn start_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap()
}

struct Fixture {
    storage: Arc<InMemorySecureStorage>,
    clock: Arc<ManualClock>,
    provider: LocalAuthenticationProvider,
}

fn provider_on(
    storage: Arc<InMemorySecureStorage>,
    clock: Arc<ManualClock>,
    algorithm: PasswordAlgorithm,
) -> LocalAuthenticationProvider {
    LocalAuthenticationProvider::new(
        fast_hashing(algorithm),
        TokenPolicy::default(),
        TokenSigner::generate().unwrap(),
        storage,
        clock,
    )
    .unwrap()
}

async fn fixture() -> Fixture {
    let storage = Arc::new(InMemorySecureStorage::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let provider = provider_on(storage.clone(), clock.clone(), PasswordAlgorithm::Argon2id);
    provider
        .register_credentials("alice", "correct horse battery staple")
        .await
        .unwrap();

    Fixture {
        storage,
        clock,
        provider,
    }
}

async fn login(fixture: &Fixture) -> AuthToken {
    fixture
        .provider
        .perform_authentication(&Credentials::password(
            "alice",
            "correct horse battery staple",
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_authentication_issues_valid_token() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    assert_eq!(token.user_identifier, "alice");
    assert_eq!(token.issued_at, start_time());
    assert_eq!(token.expires_at, start_time() + Duration::hours(1));
    assert!(fixture.provider.validate_auth_token(&token).await);
    assert_eq!(fixture.provider.check_status().await, AuthStatus::Authenticated);
    assert_eq!(fixture.provider.active_token().await, Some(token));

    let context = fixture.provider.session_context().await;
    assert_eq!(context.get("method").map(String::as_str), Some("password"));
    assert_eq!(context.get("identifier").map(String::as_str), Some("alice"));
}

#[tokio::test]
async fn test_token_invalid_from_expiry() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    fixture.clock.advance(Duration::seconds(3599));
    assert!(fixture.provider.validate_auth_token(&token).await);

    fixture.clock.advance(Duration::seconds(1));
    assert!(!fixture.provider.validate_auth_token(&token).await);
    assert!(matches!(
        fixture.provider.authorize(&token, "backup").await,
        Err(CryptoError::TokenExpired)
    ));
}

#[tokio::test]
async fn test_unknown_user_and_wrong_password_look_the_same() {
    let fixture = fixture().await;

    let unknown = fixture
        .provider
        .perform_authentication(&Credentials::password("mallory", "guess"))
        .await
        .unwrap_err();
    let wrong = fixture
        .provider
        .perform_authentication(&Credentials::password("alice", "guess"))
        .await
        .unwrap_err();

    assert!(matches!(unknown, CryptoError::AuthenticationFailed));
    assert!(matches!(wrong, CryptoError::AuthenticationFailed));
    assert_eq!(unknown.error_code(), wrong.error_code());
    assert_eq!(unknown.to_string(), wrong.to_string());
    assert_eq!(fixture.provider.check_status().await, AuthStatus::NotAuthenticated);
}

#[tokio::test]
async fn test_unsupported_method() {
    let fixture = fixture().await;
    let credentials = Credentials::new("alice", "fingerprint-blob", AuthMethod::Biometric);

    let err = fixture
        .provider
        .perform_authentication(&credentials)
        .await
        .unwrap_err();
    match err {
        CryptoError::MethodNotSupported { method } => assert_eq!(method, "biometric"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_refresh_within_grace() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    fixture.clock.advance(Duration::hours(1) + Duration::days(1));
    assert!(!fixture.provider.validate_auth_token(&token).await);
    assert_eq!(fixture.provider.check_status().await, AuthStatus::RequiresRefresh);

    let refreshed = fixture.provider.refresh_auth_token(&token).await.unwrap();
    assert_ne!(refreshed.token_string, token.token_string);
    assert_eq!(refreshed.user_identifier, "alice");
    assert_eq!(refreshed.issued_at, fixture.clock.now());
    assert!(fixture.provider.validate_auth_token(&refreshed).await);
    assert_eq!(fixture.provider.check_status().await, AuthStatus::Authenticated);

    // The replaced token cannot be refreshed a second time
    assert!(matches!(
        fixture.provider.refresh_auth_token(&token).await,
        Err(CryptoError::TokenRevoked)
    ));
}

#[tokio::test]
async fn test_refresh_keeps_other_active_session() {
    let fixture = fixture().await;
    let alice = login(&fixture).await;

    fixture
        .provider
        .register_credentials("bob", "hunter2 hunter2")
        .await
        .unwrap();
    let bob = fixture
        .provider
        .perform_authentication(&Credentials::password("bob", "hunter2 hunter2"))
        .await
        .unwrap();

    let refreshed = fixture.provider.refresh_auth_token(&alice).await.unwrap();
    assert_eq!(refreshed.user_identifier, "alice");
    assert!(fixture.provider.validate_auth_token(&refreshed).await);
    assert_eq!(fixture.provider.active_token().await, Some(bob));
    assert_eq!(
        fixture.provider.session_context().await.get("identifier").map(String::as_str),
        Some("bob")
    );
}

#[tokio::test]
async fn test_refresh_beyond_grace_fails() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    fixture.clock.advance(Duration::hours(1) + Duration::days(8));
    assert!(matches!(
        fixture.provider.refresh_auth_token(&token).await,
        Err(CryptoError::TokenExpired)
    ));
    assert_eq!(fixture.provider.check_status().await, AuthStatus::NotAuthenticated);
}

#[tokio::test]
async fn test_refresh_grace_boundary_is_inclusive() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    fixture.clock.set(token.expires_at + Duration::days(7));
    assert!(fixture.provider.refresh_auth_token(&token).await.is_ok());
}

#[tokio::test]
async fn test_status_near_expiry() {
    let fixture = fixture().await;
    login(&fixture).await;

    fixture.clock.advance(Duration::minutes(54));
    assert_eq!(fixture.provider.check_status().await, AuthStatus::Authenticated);

    fixture.clock.advance(Duration::minutes(1));
    assert_eq!(fixture.provider.check_status().await, AuthStatus::RequiresRefresh);
}

#[tokio::test]
async fn test_revoke() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    assert!(fixture.provider.revoke_auth_token(&token).await);
    assert!(!fixture.provider.revoke_auth_token(&token).await);
    assert!(!fixture.provider.validate_auth_token(&token).await);
    assert_eq!(fixture.provider.check_status().await, AuthStatus::NotAuthenticated);
    assert!(fixture.provider.active_token().await.is_none());
    assert!(matches!(
        fixture.provider.authorize(&token, "restore").await,
        Err(CryptoError::TokenRevoked)
    ));
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    assert!(fixture.provider.perform_logout().await);
    assert!(!fixture.provider.validate_auth_token(&token).await);
    assert!(fixture.provider.session_context().await.is_empty());
    assert!(fixture.provider.perform_logout().await);
    assert_eq!(fixture.provider.check_status().await, AuthStatus::NotAuthenticated);
}

#[tokio::test]
async fn test_foreign_and_tampered_tokens() {
    let fixture = fixture().await;
    let token = login(&fixture).await;

    let other = provider_on(
        fixture.storage.clone(),
        fixture.clock.clone(),
        PasswordAlgorithm::Argon2id,
    );
    assert!(!other.validate_auth_token(&token).await);
    assert!(!other.revoke_auth_token(&token).await);
    assert!(matches!(
        other.refresh_auth_token(&token).await,
        Err(CryptoError::InvalidToken { .. })
    ));
    assert!(matches!(
        other.authorize(&token, "backup").await,
        Err(CryptoError::Unauthorized { .. })
    ));

    let mut extended = token.clone();
    extended.expires_at += Duration::days(30);
    assert!(!fixture.provider.validate_auth_token(&extended).await);

    let mut relabelled = token.clone();
    relabelled
        .claims
        .insert("sub".to_string(), "admin".to_string());
    relabelled.claims.insert("role".to_string(), "admin".to_string());
    assert!(!fixture.provider.validate_auth_token(&relabelled).await);
    assert!(matches!(
        fixture.provider.authorize(&relabelled, "backup").await,
        Err(CryptoError::Unauthorized { .. })
    ));
    assert!(fixture.provider.refresh_auth_token(&relabelled).await.is_err());

    let mut malformed = token;
    malformed.token_type = "Basic".to_string();
    assert!(!fixture.provider.validate_auth_token(&malformed).await);
}

#[tokio::test]
async fn test_authorize_returns_user() {
    let fixture = fixture().await;
    let token = login(&fixture).await;
    assert_eq!(
        fixture.provider.authorize(&token, "backup").await.unwrap(),
        "alice"
    );
}

#[tokio::test]
async fn test_register_twice_is_rejected() {
    let fixture = fixture().await;
    let err = fixture
        .provider
        .register_credentials("alice", "another password")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CryptoError::Storage(StorageError::AlreadyExists { .. })
    ));
    assert!(fixture.provider.has_credentials("alice").await.unwrap());
    assert!(!fixture.provider.has_credentials("bob").await.unwrap());
}

#[tokio::test]
async fn test_change_password() {
    let fixture = fixture().await;

    assert!(matches!(
        fixture
            .provider
            .change_password("alice", "wrong", "new password")
            .await,
        Err(CryptoError::AuthenticationFailed)
    ));

    fixture
        .provider
        .change_password("alice", "correct horse battery staple", "new password")
        .await
        .unwrap();

    assert!(fixture
        .provider
        .perform_authentication(&Credentials::password("alice", "correct horse battery staple"))
        .await
        .is_err());
    assert!(fixture
        .provider
        .perform_authentication(&Credentials::password("alice", "new password"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_remove_credentials() {
    let fixture = fixture().await;
    fixture.provider.remove_credentials("alice").await.unwrap();

    assert!(matches!(
        fixture
            .provider
            .perform_authentication(&Credentials::password(
                "alice",
                "correct horse battery staple"
            ))
            .await,
        Err(CryptoError::AuthenticationFailed)
    ));
    assert!(matches!(
        fixture.provider.remove_credentials("alice").await,
        Err(CryptoError::Storage(StorageError::NotFound { .. }))
    ));
}

#[tokio::test]
async fn test_login_upgrades_outdated_hash() {
    let storage = Arc::new(InMemorySecureStorage::new());
    let clock = Arc::new(ManualClock::new(start_time()));

    let legacy = provider_on(storage.clone(), clock.clone(), PasswordAlgorithm::Pbkdf2Sha256);
    legacy.register_credentials("bob", "hunter22").await.unwrap();
    let stored = storage.retrieve_data("credential:bob").await.unwrap();
    assert!(stored.starts_with(b"$pbkdf2-sha256$"));

    let current = provider_on(storage.clone(), clock, PasswordAlgorithm::Argon2id);
    current
        .perform_authentication(&Credentials::password("bob", "hunter22"))
        .await
        .unwrap();

    let stored = storage.retrieve_data("credential:bob").await.unwrap();
    assert!(stored.starts_with(b"$argon2id$"));
    assert!(current
        .perform_authentication(&Credentials::password("bob", "hunter22"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_trait_hash_and_verify() {
    let fixture = fixture().await;
    let provider: &dyn AuthenticationProvider = &fixture.provider;

    let encoded = provider.hash_password("s3cret").await.unwrap().to_string();
    assert!(encoded.starts_with("$argon2id$v=19$m=256$t=1$p=1$"));
    assert!(provider.verify_password("s3cret", &encoded).await.unwrap());
    assert!(!provider.verify_password("S3cret", &encoded).await.unwrap());
    assert!(matches!(
        provider.verify_password("s3cret", "$md5$abc").await,
        Err(CryptoError::InvalidHashFormat { .. })
    ));

    // Oversized cost parameters are refused before any derivation starts
    let endless = "$pbkdf2-sha256$i=4294967295$c2FsdHNhbHRzYWx0c2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    assert!(matches!(
        provider.verify_password("s3cret", endless).await,
        Err(CryptoError::InvalidHashFormat { .. })
    ));
}

#[test]
fn test_credentials_debug_hides_secret() {
    let credentials = Credentials::password("alice", "correct horse battery staple")
        .with_metadata("device", "laptop");
    let rendered = format!("{:?}", credentials);
    assert!(!rendered.contains("correct horse"));
    assert!(rendered.contains("laptop"));
}
