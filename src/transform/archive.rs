//! Single-entry zip archive layer
//!
//! Everything written through the layer becomes the content of one archive
//! entry. The archive is produced in streaming mode (data descriptors after
//! the entry) so the layer beneath never has to seek.

use super::{OutputTransform, SinkLayer};
use std::io::{self, Write};
use zip::write::{SimpleFileOptions, StreamWriter};
use zip::{CompressionMethod, ZipWriter};

/// Packs the stream into a zip archive holding a single named entry
#[derive(Debug, Clone)]
pub struct SingleEntryZipTransform {
    entry_name: String,
}

impl SingleEntryZipTransform {
    /// Create a transform writing an entry called `entry_name`
    ///
    /// Returns `InvalidInput` if the name is empty.
    pub fn new(entry_name: impl Into<String>) -> io::Result<Self> {
        let entry_name = entry_name.into();
        if entry_name.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Missing entry name!",
            ));
        }
        Ok(Self { entry_name })
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }
}

impl OutputTransform for SingleEntryZipTransform {
    fn name(&self) -> &str {
        "zip"
    }

    fn wrap(&self, inner: Box<dyn SinkLayer>) -> io::Result<Box<dyn SinkLayer>> {
        let mut writer = ZipWriter::new_stream(inner);
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer
            .start_file(self.entry_name.as_str(), options)
            .map_err(io::Error::other)?;
        Ok(Box::new(ZipLayer { writer }))
    }
}

struct ZipLayer {
    writer: ZipWriter<StreamWriter<Box<dyn SinkLayer>>>,
}

impl Write for ZipLayer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl SinkLayer for ZipLayer {
    fn close(self: Box<Self>) -> io::Result<()> {
        // Finalizes the entry and writes the central directory
        let stream = self.writer.finish().map_err(io::Error::other)?;
        stream.into_inner().close()
    }
}
