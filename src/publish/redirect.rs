//! Redirect handling for file-router requests
//!
//! reqwest's built-in policy turns 301/302/303 into a bodiless GET. The
//! publish client disables automatic redirects and hands every request to
//! [`Redirector`], which replays the original method and body at the new
//! location.

use std::collections::BTreeMap;

use reqwest::header::{HeaderName, HeaderValue, LOCATION};
use reqwest::{Client, Method, Request, Response, StatusCode};
use tracing::debug;

use super::{PublishError, Result};

#[derive(Debug, Clone)]
pub struct Redirector {
    max_redirects: usize,
}

impl Redirector {
    pub fn new(max_redirects: usize) -> Self {
        Self { max_redirects }
    }

    /// Methods that may be sent again to a redirect target
    pub fn is_redirectable(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::PUT | Method::POST | Method::HEAD | Method::DELETE
        )
    }

    pub fn is_redirect(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT
        )
    }

    /// Send `request`, following redirects with the same method and body
    ///
    /// `context` is applied to every hop, so trace headers survive a
    /// redirect to another host.
    pub async fn execute(
        &self,
        client: &Client,
        request: Request,
        context: &BTreeMap<String, String>,
    ) -> Result<Response> {
        let mut current = request;
        let mut hops = 0;

        loop {
            let retry = current.try_clone();
            let method = current.method().clone();
            let response = client
                .execute(current)
                .await
                .map_err(|e| PublishError::Transport(e.to_string()))?;

            let status = response.status();
            if !Self::is_redirect(status) || !Self::is_redirectable(&method) {
                return Ok(response);
            }
            if hops >= self.max_redirects {
                return Err(PublishError::TooManyRedirects(self.max_redirects));
            }

            let Some(mut next) = retry else {
                return Err(PublishError::Request(
                    "request body cannot be replayed after redirect".to_string(),
                ));
            };
            let target = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    PublishError::Request(format!("redirect {} without Location", status.as_u16()))
                })?;
            let url = response
                .url()
                .join(target)
                .map_err(|e| PublishError::Request(format!("invalid redirect target: {}", e)))?;

            hops += 1;
            debug!(status = status.as_u16(), hops, host = ?url.host_str(), "Following redirect");
            *next.url_mut() = url;
            apply_context(&mut next, context)?;
            current = next;
        }
    }
}

/// Copy the trace context onto a request as headers
pub(crate) fn apply_context(request: &mut Request, context: &BTreeMap<String, String>) -> Result<()> {
    for (key, value) in context {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| PublishError::Request(format!("invalid context key {}: {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PublishError::Request(format!("invalid context value for {}: {}", key, e)))?;
        request.headers_mut().insert(name, value);
    }
    Ok(())
}
