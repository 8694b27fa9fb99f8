use serde::Deserialize;
use tracing::warn;

use super::file_data::{FileData, MessageMetaData, Scheme};
use super::{ParseError, Result};

/// Ordered batch of files announced by one notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReadyEvent {
    pub files: Vec<FileData>,
}

impl FileReadyEvent {
    pub fn new(files: Vec<FileData>) -> Self {
        Self { files }
    }

    /// Parse a VES file-ready notification
    ///
    /// Files whose location carries an unsupported scheme are dropped with a
    /// warning; the rest of the event is kept.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let message = VesMessage::deserialize(value)
            .map_err(|e| ParseError::MalformedEvent(e.to_string()))?;
        let header = message.event.common_event_header;
        let fields = message.event.notification_fields;
        let (product_name, vendor_name) = product_and_vendor(&header.event_name)?;

        let meta = MessageMetaData {
            source_name: header.source_name,
            product_name,
            vendor_name,
            last_epoch_microsec: header.last_epoch_microsec,
            start_epoch_microsec: header.start_epoch_microsec,
            time_zone_offset: header.time_zone_offset,
            change_identifier: fields.change_identifier,
            change_type: fields.change_type,
        };

        let files = fields
            .array_of_named_hash_map
            .into_iter()
            .filter_map(|entry| {
                let scheme = match Scheme::from_location(&entry.hash_map.location) {
                    Ok(scheme) => scheme,
                    Err(e) => {
                        warn!(file = %entry.name, error = %e, "Skipping file with unusable location");
                        return None;
                    }
                };
                Some(FileData {
                    name: entry.name,
                    location: entry.hash_map.location,
                    scheme,
                    compression: entry.hash_map.compression,
                    file_format_type: entry.hash_map.file_format_type,
                    file_format_version: entry.hash_map.file_format_version,
                    message_meta_data: meta.clone(),
                })
            })
            .collect();

        Ok(Self { files })
    }
}

/// `Noti_<product>-<vendor>_FileReady` -> (product, vendor)
fn product_and_vendor(event_name: &str) -> Result<(String, String)> {
    event_name
        .split('_')
        .nth(1)
        .and_then(|middle| middle.split_once('-'))
        .map(|(product, vendor)| (product.to_string(), vendor.to_string()))
        .ok_or_else(|| ParseError::MalformedEvent(format!("unexpected eventName '{}'", event_name)))
}

#[derive(Deserialize)]
struct VesMessage {
    event: VesEvent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VesEvent {
    common_event_header: CommonEventHeader,
    notification_fields: NotificationFields,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommonEventHeader {
    event_name: String,
    source_name: String,
    #[serde(default)]
    start_epoch_microsec: i64,
    #[serde(default)]
    last_epoch_microsec: i64,
    #[serde(default)]
    time_zone_offset: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationFields {
    change_identifier: String,
    change_type: String,
    #[serde(default)]
    array_of_named_hash_map: Vec<NamedHashMap>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedHashMap {
    name: String,
    hash_map: FileInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    location: String,
    #[serde(default)]
    compression: String,
    #[serde(default)]
    file_format_type: String,
    #[serde(default)]
    file_format_version: String,
}
