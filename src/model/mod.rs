//! Data model shared by the collection pipeline
//!
//! - [`FileData`] - one announced file, as delivered by the event consumer
//! - [`FileServerData`] - connection details parsed from a file location
//! - [`Scheme`] - closed set of supported transfer protocols
//! - [`FileReadyEvent`] - ordered batch of files from one notification
//! - [`FilePublishInformation`] - record sent to the file-router

mod event;
mod file_data;
mod publish_info;
mod server;

pub use event::FileReadyEvent;
pub use file_data::{FileData, FileIdentity, MessageMetaData, Scheme};
pub use publish_info::{FilePublishInformation, PublishMetadata};
pub use server::FileServerData;

#[cfg(test)]
pub(crate) use file_data::sample_file;

use thiserror::Error;

/// Failures while turning raw event data into model types. Always permanent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid file location: {0}")]
    InvalidLocation(String),

    #[error("unsupported protocol scheme: {0}")]
    UnknownScheme(String),

    #[error("malformed file ready event: {0}")]
    MalformedEvent(String),

    #[error("file name '{0}' has no usable final component")]
    InvalidFileName(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
