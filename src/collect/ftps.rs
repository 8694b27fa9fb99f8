use std::io::{BufWriter, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use suppaftp::types::FileType;
use suppaftp::{FtpError, Mode, NativeTlsConnector, NativeTlsFtpStream};
use tracing::{debug, warn};

use super::ProtocolClient;
use super::classify::CollectError;
use super::tls::{CertificatePaths, TlsCredentials};
use crate::model::{FileServerData, Scheme};

#[derive(Debug, Clone)]
pub struct FtpsSettings {
    pub connect_timeout: Duration,
    /// Write buffer for the data channel
    pub buffer_size: usize,
}

impl Default for FtpsSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            buffer_size: 1024 * 1024,
        }
    }
}

/// FTP over explicit TLS with client-certificate authentication
///
/// Every failure from this variant is retryable.
pub struct FtpsClient {
    server: FileServerData,
    settings: FtpsSettings,
    certificates: CertificatePaths,
    connector: Option<native_tls::TlsConnector>,
    stream: Option<NativeTlsFtpStream>,
}

impl FtpsClient {
    pub fn new(server: FileServerData, settings: FtpsSettings, certificates: CertificatePaths) -> Self {
        Self {
            server,
            settings,
            certificates,
            connector: None,
            stream: None,
        }
    }

    /// Key and trust material is loaded once per client
    fn tls_connector(&mut self) -> Result<native_tls::TlsConnector, CollectError> {
        if let Some(connector) = &self.connector {
            return Ok(connector.clone());
        }
        let connector = TlsCredentials::load(&self.certificates)
            .and_then(|credentials| credentials.native_connector())
            .map_err(|e| CollectError::Retryable(format!("FTPS TLS setup failed: {}", e)))?;
        self.connector = Some(connector.clone());
        Ok(connector)
    }

    fn address(&self) -> Result<SocketAddr, CollectError> {
        let port = self.server.port_or(Scheme::Ftps.default_port());
        (self.server.server_address.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                CollectError::Retryable(format!("cannot resolve {}", self.server.server_address))
            })
    }

    fn connect(&mut self) -> Result<NativeTlsFtpStream, CollectError> {
        let tls = self.tls_connector()?;
        let address = self.address()?;

        let stream = NativeTlsFtpStream::connect_timeout(address, self.settings.connect_timeout)
            .map_err(ftp_error)?;
        // AUTH TLS followed by PBSZ 0 and PROT P for a private data channel
        let mut stream = stream
            .into_secure(NativeTlsConnector::from(tls), &self.server.server_address)
            .map_err(ftp_error)?;
        stream
            .login(self.server.user_id.as_str(), self.server.password.as_str())
            .map_err(ftp_error)?;
        stream.set_mode(Mode::Passive);
        stream.transfer_type(FileType::Binary).map_err(ftp_error)?;

        debug!(server = %self.server.server_address, "FTPS session established");
        Ok(stream)
    }
}

impl ProtocolClient for FtpsClient {
    fn open(&mut self) -> Result<(), CollectError> {
        if self.stream.is_none() {
            let stream = self.connect()?;
            self.stream = Some(stream);
        }
        Ok(())
    }

    fn collect_file(&mut self, remote_path: &str, local_path: &Path) -> Result<(), CollectError> {
        self.open()?;
        let buffer_size = self.settings.buffer_size;
        let Some(stream) = self.stream.as_mut() else {
            return Err(CollectError::Retryable("FTPS session is not open".to_string()));
        };

        let mut reader = stream.retr_as_stream(remote_path).map_err(ftp_error)?;
        let file = std::fs::File::create(local_path)?;
        let mut writer = BufWriter::with_capacity(buffer_size, file);
        std::io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        stream.finalize_retr_stream(reader).map_err(ftp_error)?;

        debug!(remote_path, "FTPS file retrieved");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.quit() {
                warn!(error = %e, "FTPS logout failed, dropping connection");
            }
        }
    }
}

impl Drop for FtpsClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn ftp_error(err: FtpError) -> CollectError {
    CollectError::Retryable(format!("FTPS: {}", err))
}
