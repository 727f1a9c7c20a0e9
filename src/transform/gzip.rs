//! Gzip compression layer

use super::{OutputTransform, SinkLayer};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Compresses everything written through it with gzip
#[derive(Debug, Clone, Copy)]
pub struct GzipTransform {
    level: Compression,
}

impl Default for GzipTransform {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit compression level (0-9)
    pub fn level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }
}

impl OutputTransform for GzipTransform {
    fn name(&self) -> &str {
        "gzip"
    }

    fn wrap(&self, inner: Box<dyn SinkLayer>) -> io::Result<Box<dyn SinkLayer>> {
        Ok(Box::new(GzipLayer {
            encoder: GzEncoder::new(inner, self.level),
        }))
    }
}

struct GzipLayer {
    encoder: GzEncoder<Box<dyn SinkLayer>>,
}

impl Write for GzipLayer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl SinkLayer for GzipLayer {
    fn close(self: Box<Self>) -> io::Result<()> {
        // Writes the trailing block and CRC before the inner layer closes
        let inner = self.encoder.finish()?;
        inner.close()
    }
}
