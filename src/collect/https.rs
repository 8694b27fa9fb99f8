use std::path::Path;
use std::time::Duration;

use reqwest::Client;

use super::ProtocolClient;
use super::classify::CollectError;
use super::http::{Authorization, fetch_blocking, request_url};
use crate::model::{FileServerData, Scheme};

/// HTTPS variant over the [`ConnectionManager`](super::ConnectionManager) pool
///
/// Same credential precedence as plain HTTP. Any failure before a response
/// arrives is terminal for the file.
pub struct HttpsClient {
    client: Client,
    server: FileServerData,
    request_timeout: Duration,
    auth: Option<Authorization>,
}

impl HttpsClient {
    pub fn new(client: Client, server: FileServerData, request_timeout: Duration) -> Self {
        Self {
            client,
            server,
            request_timeout,
            auth: None,
        }
    }
}

impl ProtocolClient for HttpsClient {
    fn open(&mut self) -> Result<(), CollectError> {
        if self.auth.is_none() {
            self.auth = Some(Authorization::from_server(&self.server)?);
        }
        Ok(())
    }

    fn collect_file(&mut self, remote_path: &str, local_path: &Path) -> Result<(), CollectError> {
        self.open()?;
        let Some(auth) = self.auth.as_ref() else {
            return Err(CollectError::NonRetryable("HTTPS client has no credentials".to_string()));
        };
        let url = request_url(Scheme::Https, &self.server, remote_path, auth)?;
        fetch_blocking(
            &self.client,
            Scheme::Https,
            url,
            auth,
            local_path,
            self.request_timeout,
        )
    }

    fn close(&mut self) {
        self.auth = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::classify::{Classify, FailureKind};
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn run(location: String) -> tokio::task::JoinHandle<Result<(), CollectError>> {
        tokio::task::spawn_blocking(move || {
            let dir = TempDir::new()?;
            let mut client = HttpsClient::new(
                Client::new(),
                FileServerData::from_location(&location).map_err(|e| CollectError::NonRetryable(e.to_string()))?,
                Duration::from_secs(5),
            );
            client.open()?;
            let result = client.collect_file("/A.gz", &dir.path().join("A.gz"));
            client.close();
            result
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tls_handshake_failure_is_terminal() {
        // a plaintext server cannot complete a TLS handshake
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        let address = mock_server.address();

        let result = run(format!("https://u:p@{}:{}/A.gz", address.ip(), address.port()))
            .await
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), FailureKind::NonRetryable);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refused_connection_is_terminal() {
        let result = run("https://u:p@127.0.0.1:1/A.gz".to_string()).await.unwrap();
        assert_eq!(result.unwrap_err().kind(), FailureKind::NonRetryable);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_host_is_terminal() {
        let result = run("https://u:p@host.invalid/A.gz".to_string()).await.unwrap();
        assert_eq!(result.unwrap_err().kind(), FailureKind::NonRetryable);
    }

    #[test]
    fn test_missing_credentials_fail_to_open() {
        let mut client = HttpsClient::new(
            Client::new(),
            FileServerData::from_location("https://host/A.gz").unwrap(),
            Duration::from_secs(1),
        );
        assert_eq!(client.open().unwrap_err().kind(), FailureKind::NonRetryable);
    }
}
