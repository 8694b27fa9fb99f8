//! Retrieval of one remote file to local storage
//!
//! A [`ClientFactory`] turns a scheme and server into a boxed
//! [`ProtocolClient`]. Clients are blocking; callers drive them from
//! `tokio::task::spawn_blocking` so that no FTP or SSH stream ever crosses
//! an await point.

mod classify;
mod connection;
mod ftps;
mod http;
mod https;
mod sftp;
mod tls;

use std::path::Path;
use std::sync::Arc;

use reqwest::Client;

use crate::model::{FileServerData, Scheme};

pub use classify::{
    Classify, CollectError, ConfigurationError, FailureKind, classify_status, classify_transport,
};
pub use connection::{ConnectionManager, HTTPS_CONNECT_TIMEOUT};
pub use ftps::{FtpsClient, FtpsSettings};
pub use http::{HttpClient, HttpSettings, shared_client};
pub use https::HttpsClient;
pub use sftp::{SftpClient, SftpSettings};
pub use tls::{CertificatePaths, TlsCredentials};

/// Session against one file server
///
/// `open` may be called more than once; `collect_file` opens on demand.
/// `close` is infallible and idempotent. Clients are not required to be
/// `Send`; create and drop them on the thread that uses them.
pub trait ProtocolClient {
    fn open(&mut self) -> Result<(), CollectError>;

    fn collect_file(&mut self, remote_path: &str, local_path: &Path) -> Result<(), CollectError>;

    fn close(&mut self);
}

#[derive(Debug, Clone, Default)]
pub struct CollectSettings {
    pub http: HttpSettings,
    pub ftps: FtpsSettings,
    pub sftp: SftpSettings,
    pub certificates: Option<CertificatePaths>,
}

/// Creates the right client variant for a file's scheme
pub struct ClientFactory {
    settings: CollectSettings,
    http_pool: Client,
    connections: Arc<ConnectionManager>,
}

impl ClientFactory {
    pub fn new(
        settings: CollectSettings,
        connections: Arc<ConnectionManager>,
    ) -> Result<Self, ConfigurationError> {
        let http_pool = shared_client(&settings.http)?;
        Ok(Self {
            settings,
            http_pool,
            connections,
        })
    }

    pub fn create(
        &self,
        scheme: Scheme,
        server: FileServerData,
    ) -> Result<Box<dyn ProtocolClient>, ConfigurationError> {
        let client: Box<dyn ProtocolClient> = match scheme {
            Scheme::Http => Box::new(HttpClient::new(
                self.http_pool.clone(),
                server,
                self.settings.http.request_timeout,
            )),
            Scheme::Https => Box::new(HttpsClient::new(
                self.connections.instance()?,
                server,
                self.settings.http.request_timeout,
            )),
            Scheme::Ftps => {
                let certificates = self
                    .settings
                    .certificates
                    .clone()
                    .ok_or(ConfigurationError::MissingCertificates(Scheme::Ftps))?;
                Box::new(FtpsClient::new(server, self.settings.ftps.clone(), certificates))
            }
            Scheme::Sftp => Box::new(SftpClient::new(server, self.settings.sftp.clone())),
        };
        Ok(client)
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn certificates(&self) -> Option<&CertificatePaths> {
        self.settings.certificates.as_ref()
    }
}
