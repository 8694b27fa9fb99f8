//! Plain HTTP collection and the request helpers shared with HTTPS

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tracing::debug;
use url::Url;

use super::ProtocolClient;
use super::classify::{CollectError, ConfigurationError, classify_status, classify_transport};
use crate::model::{FileServerData, Scheme};

/// Shared plain-HTTP pool settings
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Idle connections kept per host; must exceed the worker count
    ///
    /// reqwest does not cap open connections, so in-flight requests are
    /// bounded by the scheduler's worker permits rather than this value.
    pub pool_size: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            pool_size: 200,
        }
    }
}

/// Build the single pool used by every plain-HTTP collection
///
/// Redirects are not followed; a 3xx reaches the status classifier.
pub fn shared_client(settings: &HttpSettings) -> Result<Client, ConfigurationError> {
    Client::builder()
        .connect_timeout(settings.connect_timeout)
        .pool_max_idle_per_host(settings.pool_size)
        .user_agent(concat!("datafile-collector/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ConfigurationError::ClientBuild(e.to_string()))
}

/// Credentials sent with a collection request
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum Authorization {
    Bearer(String),
    Basic { user: String, password: String },
}

impl Authorization {
    /// Bearer token from the query wins over basic-auth user info
    pub(crate) fn from_server(server: &FileServerData) -> Result<Self, CollectError> {
        if let Some(token) = server.access_token() {
            return Ok(Authorization::Bearer(token));
        }
        if server.has_basic_credentials() {
            return Ok(Authorization::Basic {
                user: server.user_id.clone(),
                password: server.password.clone(),
            });
        }
        Err(CollectError::NonRetryable(
            "not sufficient information to authenticate: no bearer token and no user/password"
                .to_string(),
        ))
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Authorization::Bearer(token) => request.bearer_auth(token),
            Authorization::Basic { user, password } => request.basic_auth(user, Some(password)),
        }
    }

    fn is_bearer(&self) -> bool {
        matches!(self, Authorization::Bearer(_))
    }
}

/// Target URL for a GET; the query is dropped when it only carried the token
pub(crate) fn request_url(
    scheme: Scheme,
    server: &FileServerData,
    remote_path: &str,
    auth: &Authorization,
) -> Result<Url, CollectError> {
    let base = format!(
        "{}://{}:{}",
        scheme.to_string().to_ascii_lowercase(),
        server.server_address,
        server.port_or(scheme.default_port())
    );
    let mut url = Url::parse(&base)
        .map_err(|e| CollectError::NonRetryable(format!("invalid server address: {}", e)))?;
    url.set_path(remote_path);
    if !auth.is_bearer() {
        url.set_query(server.query.as_deref());
    }
    url.set_fragment(server.fragment.as_deref());
    Ok(url)
}

/// Blocking GET of `url` into `local_path`; must run off the async workers
pub(crate) fn fetch_blocking(
    client: &Client,
    scheme: Scheme,
    url: Url,
    auth: &Authorization,
    local_path: &Path,
    timeout: Duration,
) -> Result<(), CollectError> {
    let runtime = Handle::try_current()
        .map_err(|e| CollectError::Retryable(format!("no async runtime available: {}", e)))?;
    runtime.block_on(fetch(client, scheme, url, auth, local_path, timeout))
}

async fn fetch(
    client: &Client,
    scheme: Scheme,
    url: Url,
    auth: &Authorization,
    local_path: &Path,
    timeout: Duration,
) -> Result<(), CollectError> {
    debug!(%scheme, path = url.path(), "Starting collection request");

    let request = auth.apply(client.get(url).timeout(timeout));
    let mut response = request
        .send()
        .await
        .map_err(|e| classify_transport(&e, scheme))?;
    classify_status(response.status())?;

    let mut file = tokio::fs::File::create(local_path).await?;
    let mut size = 0usize;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_transport(&e, scheme))?
    {
        size += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    debug!(%scheme, size, "Collection request completed");
    Ok(())
}

/// Plain HTTP variant over the shared pool
pub struct HttpClient {
    client: Client,
    server: FileServerData,
    request_timeout: Duration,
    auth: Option<Authorization>,
}

impl HttpClient {
    pub fn new(client: Client, server: FileServerData, request_timeout: Duration) -> Self {
        Self {
            client,
            server,
            request_timeout,
            auth: None,
        }
    }
}

impl ProtocolClient for HttpClient {
    fn open(&mut self) -> Result<(), CollectError> {
        if self.auth.is_none() {
            self.auth = Some(Authorization::from_server(&self.server)?);
        }
        Ok(())
    }

    fn collect_file(&mut self, remote_path: &str, local_path: &Path) -> Result<(), CollectError> {
        self.open()?;
        let Some(auth) = self.auth.as_ref() else {
            return Err(CollectError::NonRetryable("HTTP client has no credentials".to_string()));
        };
        let url = request_url(Scheme::Http, &self.server, remote_path, auth)?;
        fetch_blocking(
            &self.client,
            Scheme::Http,
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
