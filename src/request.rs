//! Upload request descriptor

use crate::error::{Result, StreamifyError};
use crate::transform::{GzipTransform, OutputTransform, SingleEntryZipTransform, TransformChain};
use uuid::Uuid;

/// Content type of newline-delimited JSON uploads
pub const JSON_LINES_CONTENT_TYPE: &str = "application/x-jsonlines";

/// Describes one upload: what it is, how it is buffered and transformed
#[derive(Debug, Clone)]
pub struct StreamingRequest {
    /// Opaque identifier of the upload
    pub id: String,
    /// Content type sent with the request; must not be empty
    pub content_type: String,
    /// Pipe capacity in bytes; `None` or `0` uses the channel default
    pub buffer_size: Option<usize>,
    /// Transforms applied to written bytes, innermost first
    pub transforms: TransformChain,
}

impl StreamingRequest {
    pub fn new(id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            buffer_size: None,
            transforms: TransformChain::new(),
        }
    }

    /// A JSON-lines request with a random identifier
    pub fn json_lines() -> Self {
        Self::new(Uuid::new_v4().to_string(), JSON_LINES_CONTENT_TYPE)
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size);
        self
    }

    /// Add a transform on top of the current ones
    pub fn transform<T: OutputTransform + 'static>(mut self, transform: T) -> Self {
        self.transforms = self.transforms.then(transform);
        self
    }

    /// Gzip the payload
    pub fn gzip(self) -> Self {
        self.transform(GzipTransform::new())
    }

    /// Pack the payload into a single-entry zip archive
    pub fn zip_entry(self, entry_name: impl Into<String>) -> Result<Self> {
        let transform = SingleEntryZipTransform::new(entry_name)
            .map_err(|e| StreamifyError::invalid_parameter("entry_name", e.to_string()))?;
        Ok(self.transform(transform))
    }

    pub fn validate(&self) -> Result<()> {
        if self.content_type.trim().is_empty() {
            return Err(StreamifyError::invalid_parameter(
                "content_type",
                "Missing content type!",
            ));
        }
        Ok(())
    }
}
