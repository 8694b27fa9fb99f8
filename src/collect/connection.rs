//! Process-wide TLS connection pool for HTTPS collection

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::Client;
use reqwest::tls::Version;
use tracing::{debug, info};

use super::classify::ConfigurationError;
use super::tls::{CertificatePaths, TlsCredentials};

/// Connect timeout for every HTTPS collection
pub const HTTPS_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Owner of the shared HTTPS client
///
/// Nothing is available until [`ConnectionManager::setup_or_update`] succeeds
/// once. Reconfiguration swaps the pool under a single mutex; jobs hold a
/// cheap clone of the client and are never blocked by it.
///
/// `max_pool_size` bounds idle connections per host. Open connections are
/// bounded by the scheduler's worker permits.
pub struct ConnectionManager {
    max_pool_size: usize,
    client: Mutex<Option<Client>>,
}

impl ConnectionManager {
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            max_pool_size,
            client: Mutex::new(None),
        }
    }

    /// Build a pool from the keystore and trust store, replacing any previous one
    pub fn setup_or_update(&self, paths: &CertificatePaths) -> Result<(), ConfigurationError> {
        let credentials = TlsCredentials::load(paths)?;

        let mut builder = Client::builder()
            .use_native_tls()
            .identity(credentials.reqwest_identity()?)
            .tls_built_in_root_certs(false)
            .min_tls_version(Version::TLS_1_2)
            .max_tls_version(Version::TLS_1_2)
            .pool_max_idle_per_host(self.max_pool_size)
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(HTTPS_CONNECT_TIMEOUT)
            .user_agent(concat!("datafile-collector/", env!("CARGO_PKG_VERSION")));
        for root in credentials.reqwest_roots()? {
            builder = builder.add_root_certificate(root);
        }
        let client = builder
            .build()
            .map_err(|e| ConfigurationError::Tls(e.to_string()))?;

        self.install(client);
        info!(
            keystore = %paths.key_cert_path.display(),
            trust_store = %paths.trusted_ca_path.display(),
            max_pool_size = self.max_pool_size,
            "HTTPS connection pool configured"
        );
        Ok(())
    }

    /// Replace the pool with a prebuilt client
    pub fn install(&self, client: Client) {
        let mut guard = self.lock();
        if guard.take().is_some() {
            debug!("Closed previous HTTPS connection pool");
        }
        *guard = Some(client);
    }

    /// Shared client; fails until the first successful setup
    pub fn instance(&self) -> Result<Client, ConfigurationError> {
        self.lock().clone().ok_or(ConfigurationError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    fn lock(&self) -> MutexGuard<'_, Option<Client>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_instance_before_setup_fails() {
        let manager = ConnectionManager::new(8);
        assert!(!manager.is_initialized());
        assert!(matches!(
            manager.instance(),
            Err(ConfigurationError::NotInitialized)
        ));
    }

    #[test]
    fn test_failed_setup_keeps_manager_uninitialized() {
        let dir = TempDir::new().unwrap();
        let manager = ConnectionManager::new(8);
        let paths = CertificatePaths {
            key_cert_path: dir.path().join("absent.p12"),
            key_cert_password_path: dir.path().join("absent.pass"),
            trusted_ca_path: dir.path().join("absent.pem"),
            trusted_ca_password_path: None,
        };

        assert!(manager.setup_or_update(&paths).is_err());
        assert!(manager.instance().is_err());
    }

    #[test]
    fn test_install_replaces_pool() {
        let manager = ConnectionManager::new(4);
        manager.install(Client::new());
        assert!(manager.instance().is_ok());

        manager.install(Client::new());
        assert!(manager.is_initialized());
        assert_eq!(manager.max_pool_size(), 4);
    }
}
