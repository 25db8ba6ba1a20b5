use bytes::Bytes;
use futures_util::Stream;
use reqwest::Body;
use serde::Serialize;
use std::fmt;
use std::io;
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Byte stream accepted as upload content
pub type ContentStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync + 'static>>;

/// Metadata attached to every file this integration uploads
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileMetadata {
    pub tags: Vec<String>,
    pub description: String,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            tags: vec!["twitter".to_string(), "archive".to_string()],
            description: "Archive tweets and metadata downloaded from twitter".to_string(),
        }
    }
}

/// File content: buffered, spooled to disk, or streamed
pub enum UploadContent {
    Bytes(Bytes),
    /// Anonymous temporary file positioned at its start
    File { file: File, length: u64 },
    Stream {
        stream: ContentStream,
        /// Sent as Content-Length when known; storage targets may reject
        /// chunked bodies without it
        length: Option<u64>,
    },
}

impl UploadContent {
    /// Body and explicit length for the transfer PUT
    pub(crate) fn into_body(self) -> (Body, Option<u64>) {
        match self {
            UploadContent::Bytes(bytes) => (Body::from(bytes), None),
            UploadContent::File { file, length } => (Body::from(file), Some(length)),
            UploadContent::Stream { stream, length } => (Body::wrap_stream(stream), length),
        }
    }
}

impl From<Bytes> for UploadContent {
    fn from(bytes: Bytes) -> Self {
        UploadContent::Bytes(bytes)
    }
}

impl From<Vec<u8>> for UploadContent {
    fn from(bytes: Vec<u8>) -> Self {
        UploadContent::Bytes(Bytes::from(bytes))
    }
}

impl fmt::Debug for UploadContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadContent::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            UploadContent::File { length, .. } => write!(f, "File({} bytes)", length),
            UploadContent::Stream { length, .. } => write!(f, "Stream(length: {:?})", length),
        }
    }
}

/// Writes incoming chunks to an anonymous temporary file, so large uploads
/// are not held in memory and their length is known before the transfer.
pub struct ContentSpool {
    file: File,
    length: u64,
}

impl ContentSpool {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: File::from_std(tempfile::tempfile()?),
            length: 0,
        })
    }

    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.length += chunk.len() as u64;
        Ok(())
    }

    /// Rewind the file and hand it over as upload content
    pub async fn finish(mut self) -> io::Result<UploadContent> {
        self.file.flush().await?;
        self.file.rewind().await?;
        Ok(UploadContent::File {
            file: self.file,
            length: self.length,
        })
    }
}

/// One file submitted by a member
#[derive(Debug)]
pub struct UploadRequest {
    pub filename: String,
    pub content: UploadContent,
    pub metadata: FileMetadata,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, content: impl Into<UploadContent>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            metadata: FileMetadata::default(),
        }
    }
}
