use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ssh2::{Session, Sftp};
use tracing::{debug, warn};

use super::ProtocolClient;
use super::classify::CollectError;
use crate::model::{FileServerData, Scheme};

#[derive(Debug, Clone)]
pub struct SftpSettings {
    pub timeout: Duration,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// SFTP with password authentication
///
/// Host keys are not verified. The session and channel are reused by every
/// `collect_file` until `close`. Every failure is retryable.
pub struct SftpClient {
    server: FileServerData,
    settings: SftpSettings,
    session: Option<(Session, Sftp)>,
}

impl SftpClient {
    pub fn new(server: FileServerData, settings: SftpSettings) -> Self {
        Self {
            server,
            settings,
            session: None,
        }
    }

    fn connect(&self) -> Result<(Session, Sftp), CollectError> {
        let port = self.server.port_or(Scheme::Sftp.default_port());
        let address = (self.server.server_address.as_str(), port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                CollectError::Retryable(format!("cannot resolve {}", self.server.server_address))
            })?;

        let tcp = TcpStream::connect_timeout(&address, self.settings.timeout)?;
        tcp.set_read_timeout(Some(self.settings.timeout))?;

        let mut session = Session::new().map_err(ssh_error)?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.settings.timeout.as_millis().min(u32::MAX as u128) as u32);
        session.handshake().map_err(ssh_error)?;
        session
            .userauth_password(&self.server.user_id, &self.server.password)
            .map_err(ssh_error)?;
        if !session.authenticated() {
            return Err(CollectError::Retryable("SFTP authentication rejected".to_string()));
        }
        let sftp = session.sftp().map_err(ssh_error)?;

        debug!(server = %self.server.server_address, port, "SFTP session established");
        Ok((session, sftp))
    }
}

impl ProtocolClient for SftpClient {
    fn open(&mut self) -> Result<(), CollectError> {
        if self.session.is_none() {
            self.session = Some(self.connect()?);
        }
        Ok(())
    }

    fn collect_file(&mut self, remote_path: &str, local_path: &Path) -> Result<(), CollectError> {
        self.open()?;
        let Some((_, sftp)) = self.session.as_ref() else {
            return Err(CollectError::Retryable("SFTP session is not open".to_string()));
        };

        let mut remote = sftp.open(Path::new(remote_path)).map_err(ssh_error)?;
        let mut local = std::fs::File::create(local_path)?;
        let size = std::io::copy(&mut remote, &mut local)?;

        debug!(remote_path, size, "SFTP file retrieved");
        Ok(())
    }

    fn close(&mut self) {
        if let Some((session, sftp)) = self.session.take() {
            drop(sftp);
            if let Err(e) = session.disconnect(None, "collection finished", None) {
                warn!(error = %e, "SFTP disconnect failed");
            }
        }
    }
}

impl Drop for SftpClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn ssh_error(err: ssh2::Error) -> CollectError {
    CollectError::Retryable(format!("SFTP: {}", err))
}
