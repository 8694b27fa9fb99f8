use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::server::FileServerData;
use super::{ParseError, Result};

/// Transfer protocol used to collect a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scheme {
    Ftps,
    Sftp,
    Http,
    Https,
}

impl Scheme {
    /// Port used when the location does not name one
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Ftps => 21,
            Scheme::Sftp => 22,
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    /// FTPS and SFTP share the FTP attempt/failure counters
    pub fn is_file_transfer(self) -> bool {
        matches!(self, Scheme::Ftps | Scheme::Sftp)
    }

    /// Scheme of a location URI (`ftpes://...`, `sftp://...`)
    pub fn from_location(location: &str) -> Result<Self> {
        let (scheme, _) = location
            .split_once("://")
            .ok_or_else(|| ParseError::InvalidLocation("missing scheme separator".to_string()))?;
        scheme.parse()
    }
}

impl FromStr for Scheme {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ftps" | "ftpes" => Ok(Scheme::Ftps),
            "sftp" => Ok(Scheme::Sftp),
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(ParseError::UnknownScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scheme::Ftps => "FTPS",
            Scheme::Sftp => "SFTP",
            Scheme::Http => "HTTP",
            Scheme::Https => "HTTPS",
        };
        f.write_str(name)
    }
}

/// Metadata carried from the notification header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetaData {
    pub source_name: String,
    pub product_name: String,
    pub vendor_name: String,
    pub last_epoch_microsec: i64,
    pub start_epoch_microsec: i64,
    pub time_zone_offset: String,
    pub change_identifier: String,
    pub change_type: String,
}

/// Deduplication key of a file: where it came from and what it is called
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    pub source_name: String,
    pub name: String,
}

impl FileIdentity {
    pub fn new(source_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_name, self.name)
    }
}

/// A file announced by a network element
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    /// Bare file name
    pub name: String,
    /// Location URI, may embed credentials
    pub location: String,
    pub scheme: Scheme,
    pub compression: String,
    pub file_format_type: String,
    pub file_format_version: String,
    pub message_meta_data: MessageMetaData,
}

impl FileData {
    /// Server connection details parsed from `location`
    pub fn server_data(&self) -> Result<FileServerData> {
        FileServerData::from_location(&self.location)
    }

    /// Path of the file on the remote server
    pub fn remote_path(&self) -> Result<String> {
        let url = url::Url::parse(&self.location)
            .map_err(|e| ParseError::InvalidLocation(e.to_string()))?;
        let decoded = percent_encoding::percent_decode_str(url.path()).decode_utf8_lossy();
        Ok(decoded.into_owned())
    }

    /// Where the collected file is stored locally: `<root>/<sourceName>/<name>`
    ///
    /// Only the last component of each part is used, so the result always
    /// stays below `root`.
    pub fn local_path(&self, root: &Path) -> Result<PathBuf> {
        let file_name = last_component(&self.name)
            .ok_or_else(|| ParseError::InvalidFileName(self.name.clone()))?;
        let source = last_component(&self.message_meta_data.source_name)
            .unwrap_or_else(|| "unknown".into());
        Ok(root.join(source).join(file_name))
    }

    pub fn identity(&self) -> FileIdentity {
        FileIdentity::new(&self.message_meta_data.source_name, &self.name)
    }
}

fn last_component(raw: &str) -> Option<std::ffi::OsString> {
    Path::new(raw).file_name().map(|name| name.to_os_string())
}

impl fmt::Debug for FileData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileData")
            .field("name", &self.name)
            .field("location", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("compression", &self.compression)
            .field("file_format_type", &self.file_format_type)
            .field("file_format_version", &self.file_format_version)
            .field("message_meta_data", &self.message_meta_data)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn sample_file(name: &str, location: &str) -> FileData {
    FileData {
        name: name.to_string(),
        location: location.to_string(),
        scheme: Scheme::from_location(location).unwrap_or(Scheme::Http),
        compression: "gzip".to_string(),
        file_format_type: "org.3GPP.32.435#measCollec".to_string(),
        file_format_version: "V10".to_string(),
        message_meta_data: MessageMetaData {
            source_name: "oteNB5309".to_string(),
            product_name: "RnNode".to_string(),
            vendor_name: "Ericsson".to_string(),
            last_epoch_microsec: 151983,
            start_epoch_microsec: 15198378,
            time_zone_offset: "UTC+05:00".to_string(),
            change_identifier: "PM_MEAS_FILES".to_string(),
            change_type: "FileReady".to_string(),
        },
    }
}
