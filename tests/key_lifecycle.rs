// Key generation, rotation and retirement through the composed services

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use umbra_crypto::clock::ManualClock;
use umbra_crypto::prelude::*;
use umbra_crypto::utils;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn start_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap()
}

fn services_on(storage: Arc<dyn SecureStorage>, clock: Arc<ManualClock>) -> CoreServices {
    CoreServices::with_clock(CoreConfig::low_resource(), storage, clock).unwrap()
}

#[tokio::test]
async fn test_rotation_keeps_old_data_readable() {
    init_logging();
    let clock = Arc::new(ManualClock::new(start_time()));
    let services = services_on(Arc::new(InMemorySecureStorage::new()), clock.clone());
    let keys = services.key_manager();
    let rotation = services.rotation();

    let v1 = keys
        .generate_key("backup", EncryptionAlgorithm::Aes256Gcm, BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(v1, "backup_v1");
    let old_blob = keys
        .encrypt_with_key(&v1, b"snapshot index", Some(b"repo-1"))
        .await
        .unwrap();

    clock.advance(Duration::days(89));
    assert!(!rotation.should_rotate_key(&v1).await.unwrap());
    assert_eq!(rotation.time_until_rotation(&v1).await.unwrap(), Some(1));

    clock.advance(Duration::days(1));
    assert!(rotation.should_rotate_key(&v1).await.unwrap());
    assert_eq!(rotation.keys_due_for_rotation().await.unwrap(), vec![v1.clone()]);

    let v2 = rotation.rotate_key(&v1).await.unwrap();
    assert_eq!(v2, "backup_v2");
    assert!(rotation.keys_due_for_rotation().await.unwrap().is_empty());

    let metadata = keys.get_metadata(&v2).await.unwrap().unwrap();
    assert_eq!(metadata.purpose, "backup");
    assert_eq!(metadata.created_at, clock.now());
    assert_eq!(metadata.rotated_from(), Some("backup_v1"));

    // Both generations stay usable
    assert_eq!(
        keys.decrypt_with_key(&v1, &old_blob, Some(b"repo-1")).await.unwrap(),
        b"snapshot index"
    );
    let new_blob = keys.encrypt_with_key(&v2, b"next snapshot", None).await.unwrap();
    assert!(keys.decrypt_with_key(&v1, &new_blob, None).await.is_err());
    assert_eq!(
        keys.decrypt_with_key(&v2, &new_blob, None).await.unwrap(),
        b"next snapshot"
    );

    assert_eq!(
        rotation.key_versions("backup").await.unwrap(),
        vec!["backup_v1".to_string(), "backup_v2".to_string()]
    );

    keys.delete_key(&v1).await.unwrap();
    assert!(keys.get_key(&v1).await.unwrap().is_none());
    assert!(matches!(
        keys.delete_key(&v1).await,
        Err(CryptoError::KeyNotFound { .. })
    ));
    assert!(matches!(
        rotation.rotate_key(&v1).await,
        Err(CryptoError::KeyNotFound { .. })
    ));
}

#[tokio::test]
async fn test_keys_survive_reopening_file_storage() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let master_key = utils::random_secure_bytes(32).unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));

    let blob = {
        let storage = EncryptedFileStorage::open(dir.path(), master_key.clone())
            .await
            .unwrap();
        let services = services_on(Arc::new(storage), clock.clone());
        let keys = services.key_manager();

        keys.generate_key(
            "archive",
            EncryptionAlgorithm::ChaCha20Poly1305,
            BTreeMap::from([("rotationPeriodDays".to_string(), "30".to_string())]),
        )
        .await
        .unwrap();
        keys.encrypt_with_key("archive_v1", b"cold data", None)
            .await
            .unwrap()
    };

    let storage = EncryptedFileStorage::open(dir.path(), master_key).await.unwrap();
    let services = services_on(Arc::new(storage), clock.clone());
    let keys = services.key_manager();

    let metadata = keys.get_metadata("archive_v1").await.unwrap().unwrap();
    assert_eq!(metadata.algorithm, EncryptionAlgorithm::ChaCha20Poly1305);
    assert_eq!(metadata.rotation_period_days(), Some(30));
    assert_eq!(
        keys.decrypt_with_key("archive_v1", &blob, None).await.unwrap(),
        b"cold data"
    );

    clock.advance(Duration::days(30));
    let summary = services.rotation().key_age_summary("archive_v1").await.unwrap();
    assert_eq!(summary.age_days, 30);
    assert_eq!(summary.rotation_period_days, 30);
    assert!(summary.rotation_due);
    assert_eq!(summary.days_until_rotation, None);
}

#[tokio::test]
async fn test_store_and_metadata_are_separate_namespaces() {
    let storage = Arc::new(InMemorySecureStorage::new());
    let services = services_on(storage.clone(), Arc::new(ManualClock::new(start_time())));

    services
        .key_store()
        .store_key(&[1u8; 32], "orphan")
        .await
        .unwrap();
    services
        .key_manager()
        .generate_key("sync", EncryptionAlgorithm::Aes256Cbc, BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(
        services.key_store().list_key_identifiers().await.unwrap(),
        vec!["orphan".to_string(), "sync_v1".to_string()]
    );
    assert_eq!(
        services.metadata_store().get_all_key_identifiers().await.unwrap(),
        vec!["sync_v1".to_string()]
    );

    let mut raw = storage.list_data_identifiers().await.unwrap();
    raw.sort();
    assert_eq!(raw, vec!["key:orphan", "key:sync_v1", "metadata:sync_v1"]);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let config = CoreConfig {
        rotation: RotationPolicy {
            default_period_days: 0,
            ..RotationPolicy::default()
        },
        ..CoreConfig::default()
    };
    let result = CoreServices::new(config, Arc::new(InMemorySecureStorage::new()));
    assert!(matches!(result, Err(CryptoError::Configuration { .. })));
}
