use bon::Builder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use super::file_data::{FileData, FileIdentity};

/// Record handed to the file-router for one collected file
#[derive(Clone, PartialEq, Eq, Builder)]
#[builder(on(String, into))]
pub struct FilePublishInformation {
    pub product_name: String,
    pub vendor_name: String,
    pub last_epoch_microsec: i64,
    pub source_name: String,
    pub start_epoch_microsec: i64,
    pub time_zone_offset: String,
    pub name: String,
    /// Original location, sent on the wire but never logged
    pub location: String,
    /// Local path of the collected file
    pub internal_location: PathBuf,
    pub compression: String,
    pub file_format_type: String,
    pub file_format_version: String,
    pub change_identifier: String,
    /// Trace context forwarded as request headers
    #[builder(default)]
    pub context: BTreeMap<String, String>,
}

/// Metadata header body; exactly these fields go on the wire
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishMetadata<'a> {
    pub product_name: &'a str,
    pub vendor_name: &'a str,
    pub last_epoch_microsec: i64,
    pub source_name: &'a str,
    pub start_epoch_microsec: i64,
    pub time_zone_offset: &'a str,
    pub location: &'a str,
    pub compression: &'a str,
    pub file_format_type: &'a str,
    pub file_format_version: &'a str,
}

impl FilePublishInformation {
    pub fn from_file_data(
        file: &FileData,
        internal_location: PathBuf,
        context: BTreeMap<String, String>,
    ) -> Self {
        let meta = &file.message_meta_data;
        Self::builder()
            .product_name(&meta.product_name)
            .vendor_name(&meta.vendor_name)
            .last_epoch_microsec(meta.last_epoch_microsec)
            .source_name(&meta.source_name)
            .start_epoch_microsec(meta.start_epoch_microsec)
            .time_zone_offset(&meta.time_zone_offset)
            .name(&file.name)
            .location(&file.location)
            .internal_location(internal_location)
            .compression(&file.compression)
            .file_format_type(&file.file_format_type)
            .file_format_version(&file.file_format_version)
            .change_identifier(&meta.change_identifier)
            .context(context)
            .build()
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity::new(&self.source_name, &self.name)
    }

    pub fn metadata(&self) -> PublishMetadata<'_> {
        PublishMetadata {
            product_name: &self.product_name,
            vendor_name: &self.vendor_name,
            last_epoch_microsec: self.last_epoch_microsec,
            source_name: &self.source_name,
            start_epoch_microsec: self.start_epoch_microsec,
            time_zone_offset: &self.time_zone_offset,
            location: &self.location,
            compression: &self.compression,
            file_format_type: &self.file_format_type,
            file_format_version: &self.file_format_version,
        }
    }

    /// JSON value of the metadata header
    pub fn metadata_header(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.metadata())
    }
}

impl fmt::Debug for FilePublishInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePublishInformation")
            .field("name", &self.name)
            .field("source_name", &self.source_name)
            .field("location", &"<redacted>")
            .field("internal_location", &self.internal_location)
            .field("change_identifier", &self.change_identifier)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
