//! Composition root for the crypto core.
//!
//! [`CoreServices`] wires one storage backend into the key stores, the
//! rotation service and the authentication provider. All components share
//! the same engine, clock and storage through `Arc`s; there is no global
//! instance.

use std::sync::Arc;

use crate::auth::{AuthenticationProvider, LocalAuthenticationProvider, TokenSigner};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::engine::{CryptoEngine, SoftwareCryptoEngine};
use crate::error::CryptoResult;
use crate::key_management::{KeyManager, KeyMetadataStore, KeyRotationService, KeyStore};
use crate::storage::SecureStorage;

pub struct CoreServices {
    config: CoreConfig,
    engine: Arc<dyn CryptoEngine>,
    clock: Arc<dyn Clock>,
    key_store: Arc<KeyStore>,
    metadata_store: Arc<KeyMetadataStore>,
    key_manager: Arc<KeyManager>,
    rotation: Arc<KeyRotationService>,
    auth: Arc<LocalAuthenticationProvider>,
}

impl CoreServices {
    /// Build the services on `storage` with the wall clock and a token
    /// signer whose key lives only as long as this instance
    pub fn new(config: CoreConfig, storage: Arc<dyn SecureStorage>) -> CryptoResult<Self> {
        Self::with_components(config, storage, Arc::new(SystemClock), TokenSigner::generate()?)
    }

    pub fn with_clock(
        config: CoreConfig,
        storage: Arc<dyn SecureStorage>,
        clock: Arc<dyn Clock>,
    ) -> CryptoResult<Self> {
        Self::with_components(config, storage, clock, TokenSigner::generate()?)
    }

    pub fn with_components(
        config: CoreConfig,
        storage: Arc<dyn SecureStorage>,
        clock: Arc<dyn Clock>,
        signer: TokenSigner,
    ) -> CryptoResult<Self> {
        config.validate()?;

        let engine: Arc<dyn CryptoEngine> = Arc::new(SoftwareCryptoEngine::new());
        let key_store = Arc::new(KeyStore::new(Arc::clone(&storage)));
        let metadata_store = Arc::new(KeyMetadataStore::new(Arc::clone(&storage)));

        let key_manager = Arc::new(KeyManager::new(
            Arc::clone(&key_store),
            Arc::clone(&metadata_store),
            Arc::clone(&engine),
            Arc::clone(&clock),
        ));
        let rotation = Arc::new(KeyRotationService::new(
            Arc::clone(&key_store),
            Arc::clone(&metadata_store),
            Arc::clone(&engine),
            Arc::clone(&clock),
            config.rotation.clone(),
        ));
        let auth = Arc::new(LocalAuthenticationProvider::new(
            config.password.clone(),
            config.tokens.clone(),
            signer,
            storage,
            Arc::clone(&clock),
        )?);

        log::info!(
            "crypto core ready (rotation every {} days, {} password hashing)",
            config.rotation.period_days(),
            config.password.algorithm
        );

        Ok(Self {
            config,
            engine,
            clock,
            key_store,
            metadata_store,
            key_manager,
            rotation,
            auth,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<dyn CryptoEngine> {
        Arc::clone(&self.engine)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn key_store(&self) -> Arc<KeyStore> {
        Arc::clone(&self.key_store)
    }

    pub fn metadata_store(&self) -> Arc<KeyMetadataStore> {
        Arc::clone(&self.metadata_store)
    }

    pub fn key_manager(&self) -> Arc<KeyManager> {
        Arc::clone(&self.key_manager)
    }

    pub fn rotation(&self) -> Arc<KeyRotationService> {
        Arc::clone(&self.rotation)
    }

    /// The concrete provider, for credential registration
    pub fn local_auth(&self) -> Arc<LocalAuthenticationProvider> {
        Arc::clone(&self.auth)
    }

    pub fn auth(&self) -> Arc<dyn AuthenticationProvider> {
        self.auth.clone()
    }
}
