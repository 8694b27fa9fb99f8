//! Client keystore and trust store loading for FTPS and HTTPS

use std::path::{Path, PathBuf};

use super::classify::ConfigurationError;

/// ASN.1 SEQUENCE, the first byte of every DER certificate
const DER_SEQUENCE: u8 = 0x30;

/// Locations of the client keystore and the trusted CA store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    /// PKCS#12 client keystore
    pub key_cert_path: PathBuf,
    /// File holding the keystore password
    pub key_cert_password_path: PathBuf,
    /// PEM bundle or single DER certificate
    pub trusted_ca_path: PathBuf,
    /// Must be unset; password-protected trust stores are rejected
    pub trusted_ca_password_path: Option<PathBuf>,
}

/// Raw credential material read from disk
pub struct TlsCredentials {
    pkcs12: Vec<u8>,
    password: String,
    /// DER encoded CA certificates
    trusted: Vec<Vec<u8>>,
}

impl TlsCredentials {
    pub fn load(paths: &CertificatePaths) -> Result<Self, ConfigurationError> {
        if let Some(path) = &paths.trusted_ca_password_path {
            return Err(ConfigurationError::InvalidCredentials {
                what: "trusted CA store",
                reason: format!(
                    "password file {} given, only unencrypted PEM or DER stores are supported",
                    path.display()
                ),
            });
        }

        let pkcs12 = read(&paths.key_cert_path, "client keystore")?;
        let password = read(&paths.key_cert_password_path, "keystore password")?;
        let password = String::from_utf8(password)
            .map_err(|_| ConfigurationError::InvalidCredentials {
                what: "keystore password",
                reason: "not valid UTF-8".to_string(),
            })?
            .trim()
            .to_string();

        let trust_store = read(&paths.trusted_ca_path, "trusted CA store")?;
        let trusted = trusted_certificates(&trust_store)?;

        Ok(Self {
            pkcs12,
            password,
            trusted,
        })
    }

    /// TLS connector for the FTPS control and data channels
    pub fn native_connector(&self) -> Result<native_tls::TlsConnector, ConfigurationError> {
        let identity = native_tls::Identity::from_pkcs12(&self.pkcs12, &self.password).map_err(|e| {
            ConfigurationError::InvalidCredentials {
                what: "client keystore",
                reason: e.to_string(),
            }
        })?;

        let mut builder = native_tls::TlsConnector::builder();
        builder
            .identity(identity)
            .disable_built_in_roots(true)
            .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
            .max_protocol_version(Some(native_tls::Protocol::Tlsv12));

        for der in &self.trusted {
            let cert = native_tls::Certificate::from_der(der).map_err(|e| {
                ConfigurationError::InvalidCredentials {
                    what: "trusted CA certificate",
                    reason: e.to_string(),
                }
            })?;
            builder.add_root_certificate(cert);
        }

        builder
            .build()
            .map_err(|e| ConfigurationError::Tls(e.to_string()))
    }

    pub fn reqwest_identity(&self) -> Result<reqwest::Identity, ConfigurationError> {
        reqwest::Identity::from_pkcs12_der(&self.pkcs12, &self.password).map_err(|e| {
            ConfigurationError::InvalidCredentials {
                what: "client keystore",
                reason: e.to_string(),
            }
        })
    }

    pub fn reqwest_roots(&self) -> Result<Vec<reqwest::Certificate>, ConfigurationError> {
        self.trusted
            .iter()
            .map(|der| {
                reqwest::Certificate::from_der(der).map_err(|e| ConfigurationError::InvalidCredentials {
                    what: "trusted CA certificate",
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

fn read(path: &Path, what: &'static str) -> Result<Vec<u8>, ConfigurationError> {
    std::fs::read(path).map_err(|source| ConfigurationError::Unreadable {
        what,
        path: path.to_path_buf(),
        source,
    })
}

/// Certificates of a PEM bundle, or the file itself when it is a DER certificate
fn trusted_certificates(data: &[u8]) -> Result<Vec<Vec<u8>>, ConfigurationError> {
    let mut reader = data;
    let pem = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| der.as_ref().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigurationError::InvalidCredentials {
            what: "trusted CA store",
            reason: format!("failed to parse PEM: {}", e),
        })?;
    if !pem.is_empty() {
        return Ok(pem);
    }

    if data.first() == Some(&DER_SEQUENCE) {
        return Ok(vec![data.to_vec()]);
    }
    Err(ConfigurationError::InvalidCredentials {
        what: "trusted CA store",
        reason: "no PEM or DER certificate found".to_string(),
    })
}
