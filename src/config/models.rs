use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::collect::{CertificatePaths, CollectSettings, FtpsSettings, HttpSettings, SftpSettings};
use crate::worker::SchedulerConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub event_source: EventSourceConfig,
    #[serde(default)]
    pub publish: PublishSettings,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ftps: FtpsConfig,
    #[serde(default)]
    pub sftp: SftpConfig,
    #[serde(default)]
    pub certificates: CertificatesConfig,
}

/// Control surface listener
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8100))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectorConfig {
    /// Concurrent collect-and-publish jobs
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Root under which collected files are staged
    #[serde(default = "default_collected_files_path")]
    pub collected_files_path: PathBuf,
    #[serde(default = "default_published_cache_capacity")]
    pub published_cache_capacity: usize,
    /// Retryable failures tolerated per file before giving up
    #[serde(default = "default_max_collect_attempts")]
    pub max_collect_attempts: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            collected_files_path: default_collected_files_path(),
            published_cache_capacity: default_published_cache_capacity(),
            max_collect_attempts: default_max_collect_attempts(),
        }
    }
}

impl CollectorConfig {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            worker_count: self.worker_count,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_collect_attempts: self.max_collect_attempts,
        }
    }
}

fn default_worker_count() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_collected_files_path() -> PathBuf {
    PathBuf::from("/tmp/onap_datafile")
}

fn default_published_cache_capacity() -> usize {
    100_000
}

fn default_max_collect_attempts() -> u32 {
    3
}

/// Message-router topic delivering file-ready notifications
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventSourceConfig {
    #[serde(default = "default_event_source_url")]
    pub url: String,
    #[serde(default = "default_event_source_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            url: default_event_source_url(),
            request_timeout_ms: default_event_source_timeout_ms(),
        }
    }
}

fn default_event_source_url() -> String {
    "http://message-router:3904/events/unauthenticated.VES_NOTIFICATION_OUTPUT/OpenDcae-c12/C12"
        .to_string()
}

fn default_event_source_timeout_ms() -> u64 {
    20_000
}

/// File-router target
#[derive(Clone, Deserialize, Serialize)]
pub struct PublishSettings {
    #[serde(default = "default_publish_url")]
    pub url: String,
    #[serde(default = "default_publish_user")]
    pub user: String,
    /// Loaded from `DFC_PUBLISH_PASSWORD`, never from the config file
    #[serde(skip)]
    pub password: String,
    #[serde(default = "default_publish_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            url: default_publish_url(),
            user: default_publish_user(),
            password: String::new(),
            timeout_ms: default_publish_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl fmt::Debug for PublishSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishSettings")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

fn default_publish_url() -> String {
    "http://dmaap-dr-prov:8080/publish/1".to_string()
}

fn default_publish_user() -> String {
    "dradmin".to_string()
}

fn default_publish_timeout_ms() -> u64 {
    60_000
}

fn default_max_redirects() -> usize {
    10
}

/// Shared plain-HTTP pool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Must exceed `collector.worker_count`
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_http_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_http_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            connect_timeout_ms: default_http_connect_timeout_ms(),
            request_timeout_ms: default_http_request_timeout_ms(),
        }
    }
}

fn default_pool_size() -> usize {
    200
}

fn default_http_connect_timeout_ms() -> u64 {
    10_000
}

fn default_http_request_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FtpsConfig {
    #[serde(default = "default_ftps_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_ftps_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for FtpsConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_ftps_buffer_size(),
            connect_timeout_ms: default_ftps_connect_timeout_ms(),
        }
    }
}

fn default_ftps_buffer_size() -> usize {
    1024 * 1024
}

fn default_ftps_connect_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SftpConfig {
    #[serde(default = "default_sftp_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sftp_timeout_ms(),
        }
    }
}

fn default_sftp_timeout_ms() -> u64 {
    30_000
}

/// Client keystore and trust store for FTPS and HTTPS; all or none
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CertificatesConfig {
    pub key_cert_path: Option<PathBuf>,
    pub key_cert_password_path: Option<PathBuf>,
    pub trusted_ca_path: Option<PathBuf>,
    pub trusted_ca_password_path: Option<PathBuf>,
}

impl CertificatesConfig {
    pub fn is_empty(&self) -> bool {
        self.key_cert_path.is_none()
            && self.key_cert_password_path.is_none()
            && self.trusted_ca_path.is_none()
    }

    pub fn paths(&self) -> Option<CertificatePaths> {
        Some(CertificatePaths {
            key_cert_path: self.key_cert_path.clone()?,
            key_cert_password_path: self.key_cert_password_path.clone()?,
            trusted_ca_path: self.trusted_ca_path.clone()?,
            trusted_ca_password_path: self.trusted_ca_password_path.clone(),
        })
    }
}

impl Config {
    pub fn collect_settings(&self) -> CollectSettings {
        CollectSettings {
            http: HttpSettings {
                connect_timeout: Duration::from_millis(self.http.connect_timeout_ms),
                request_timeout: Duration::from_millis(self.http.request_timeout_ms),
                pool_size: self.http.pool_size,
            },
            ftps: FtpsSettings {
                connect_timeout: Duration::from_millis(self.ftps.connect_timeout_ms),
                buffer_size: self.ftps.buffer_size,
            },
            sftp: SftpSettings {
                timeout: Duration::from_millis(self.sftp.timeout_ms),
            },
            certificates: self.certificates.paths(),
        }
    }
}
