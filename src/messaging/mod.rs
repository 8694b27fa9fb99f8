//! File-ready event consumption
//!
//! The scheduler pulls batches through [`EventSource`]. The production
//! implementation polls a message-router topic over HTTP; tests use
//! [`MockEventSource`].

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::model::FileReadyEvent;

#[derive(Debug, Error)]
pub enum EventSourceError {
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, EventSourceError>;

/// Source of file-ready notifications
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Next batch of events; an empty batch means nothing is pending
    async fn fetch(&self) -> Result<Vec<FileReadyEvent>>;
}

/// Polls a message-router topic
///
/// The response body is a JSON array whose items are VES notifications,
/// either as objects or as JSON-encoded strings.
pub struct MessageRouterSource {
    client: Client,
    url: Url,
}

impl MessageRouterSource {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EventSourceError::FetchFailed(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EventSource for MessageRouterSource {
    async fn fetch(&self) -> Result<Vec<FileReadyEvent>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| EventSourceError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EventSourceError::FetchFailed(format!("HTTP {}", status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EventSourceError::InvalidResponse(e.to_string()))?;
        let Value::Array(items) = body else {
            return Err(EventSourceError::InvalidResponse(
                "expected a JSON array".to_string(),
            ));
        };

        let events: Vec<FileReadyEvent> = items.iter().filter_map(parse_item).collect();
        debug!(received = items.len(), parsed = events.len(), "Fetched file ready events");
        Ok(events)
    }
}

fn parse_item(item: &Value) -> Option<FileReadyEvent> {
    let parsed = match item {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|e| e.to_string())
            .and_then(|value| FileReadyEvent::from_json(&value).map_err(|e| e.to_string())),
        other => FileReadyEvent::from_json(other).map_err(|e| e.to_string()),
    };
    match parsed {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(error = %error, "Skipping malformed file ready event");
            None
        }
    }
}

/// Queue-backed source for tests and local runs
#[derive(Debug, Default)]
pub struct MockEventSource {
    batches: Mutex<VecDeque<Vec<FileReadyEvent>>>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch for a future `fetch`
    pub fn push(&self, batch: Vec<FileReadyEvent>) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push_back(batch);
        }
    }

    pub fn pending(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn fetch(&self) -> Result<Vec<FileReadyEvent>> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|e| EventSourceError::FetchFailed(e.to_string()))?;
        Ok(batches.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification(name: &str) -> Value {
        json!({
            "event": {
                "commonEventHeader": {
                    "eventName": "Noti_RnNode-Ericsson_FileReady",
                    "sourceName": "oteNB5309",
                    "startEpochMicrosec": 1,
                    "lastEpochMicrosec": 2,
                    "timeZoneOffset": "UTC"
                },
                "notificationFields": {
                    "changeIdentifier": "PM_MEAS_FILES",
                    "changeType": "FileReady",
                    "arrayOfNamedHashMap": [
                        { "name": name, "hashMap": { "location": format!("sftp://host/{}", name) } }
                    ]
                }
            }
        })
    }

    fn source(server: &MockServer) -> MessageRouterSource {
        let url = Url::parse(&format!("{}/events/unauthenticated.VES_NOTIFICATION_OUTPUT", server.uri())).unwrap();
        MessageRouterSource::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_accepts_objects_and_encoded_strings() {
        let server = MockServer::start().await;
        let body = json!([notification("A.gz"), notification("B.gz").to_string()]);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let events = source(&server).fetch().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].files[0].name, "A.gz");
        assert_eq!(events[1].files[0].name, "B.gz");
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let server = MockServer::start().await;
        let body = json!(["not json", {"event": {}}, notification("C.gz")]);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let events = source(&server).fetch().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].files[0].name, "C.gz");
    }

    #[tokio::test]
    async fn test_error_status_fails_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(matches!(
            source(&server).fetch().await,
            Err(EventSourceError::FetchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_source_drains_in_order() {
        let source = MockEventSource::new();
        source.push(vec![FileReadyEvent::default()]);
        source.push(vec![]);
        assert_eq!(source.pending(), 2);

        assert_eq!(source.fetch().await.unwrap().len(), 1);
        assert!(source.fetch().await.unwrap().is_empty());
        assert!(source.fetch().await.unwrap().is_empty());
    }
}
