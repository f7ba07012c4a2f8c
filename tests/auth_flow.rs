// Session lifecycle through the composed services

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use umbra_crypto::clock::ManualClock;
use umbra_crypto::prelude::*;

fn start_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap()
}

fn fast_config() -> CoreConfig {
    let mut config = CoreConfig::low_resource();
    config.password.algorithm = PasswordAlgorithm::Pbkdf2Sha256;
    config.password.pbkdf2_iterations = 1_000;
    config
}

#[tokio::test]
async fn test_session_lifecycle() {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(start_time()));
    let services = CoreServices::with_clock(
        fast_config(),
        Arc::new(InMemorySecureStorage::new()),
        clock.clone(),
    )
    .unwrap();

    services
        .local_auth()
        .register_credentials("carol", "tr0ub4dor&3")
        .await
        .unwrap();
    let auth = services.auth();
    assert_eq!(auth.check_status().await, AuthStatus::NotAuthenticated);

    let token = auth
        .perform_authentication(&Credentials::password("carol", "tr0ub4dor&3"))
        .await
        .unwrap();
    assert_eq!(auth.check_status().await, AuthStatus::Authenticated);
    assert!(auth.validate_auth_token(&token).await);

    // Past expiry but inside the grace window
    clock.advance(Duration::hours(2));
    assert!(!auth.validate_auth_token(&token).await);
    assert_eq!(auth.check_status().await, AuthStatus::RequiresRefresh);

    let refreshed = auth.refresh_auth_token(&token).await.unwrap();
    assert!(auth.validate_auth_token(&refreshed).await);
    assert!(!auth.validate_auth_token(&token).await);
    assert_eq!(auth.check_status().await, AuthStatus::Authenticated);

    assert!(auth.perform_logout().await);
    assert!(!auth.validate_auth_token(&refreshed).await);
    assert_eq!(auth.check_status().await, AuthStatus::NotAuthenticated);
    assert!(matches!(
        auth.refresh_auth_token(&refreshed).await,
        Err(CryptoError::TokenRevoked)
    ));
}

#[tokio::test]
async fn test_failed_login_does_not_start_session() {
    let services = CoreServices::new(fast_config(), Arc::new(InMemorySecureStorage::new())).unwrap();
    services
        .local_auth()
        .register_credentials("dave", "letmein!")
        .await
        .unwrap();
    let auth = services.auth();

    for credentials in [
        Credentials::password("dave", "letmein?"),
        Credentials::password("erin", "letmein!"),
    ] {
        let err = auth.perform_authentication(&credentials).await.unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
        assert_eq!(err.category(), ErrorCategory::Operational);
        assert!(!err.user_friendly_message().contains("letmein"));
    }
    assert_eq!(auth.check_status().await, AuthStatus::NotAuthenticated);
}

#[tokio::test]
async fn test_tokens_serialize_for_the_client() {
    let services = CoreServices::new(fast_config(), Arc::new(InMemorySecureStorage::new())).unwrap();
    services
        .local_auth()
        .register_credentials("frank", "correct-horse")
        .await
        .unwrap();
    let auth = services.auth();

    let token = auth
        .perform_authentication(&Credentials::password("frank", "correct-horse"))
        .await
        .unwrap();
    let json = serde_json::to_string(&token).unwrap();
    assert!(json.contains("\"tokenString\""));
    assert!(json.contains("\"userIdentifier\":\"frank\""));

    let restored: AuthToken = serde_json::from_str(&json).unwrap();
    assert!(auth.validate_auth_token(&restored).await);
}
