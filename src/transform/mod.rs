//! Byte-stream transforms applied in front of the pipe
//!
//! A transform wraps the layer beneath it and returns a new layer the caller
//! writes to. Every layer knows how to finish its own framing on close and
//! then close the layer it wraps, so closing the outermost layer unwinds the
//! whole stack down to the pipe.

pub mod archive;
pub mod gzip;

pub use archive::SingleEntryZipTransform;
pub use gzip::GzipTransform;

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

/// One layer of a sink: a writer that can be finished and closed
pub trait SinkLayer: Write + Send {
    /// Finish this layer's framing, then close the layer beneath it
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// A decorator turning one sink layer into another
pub trait OutputTransform: Send + Sync {
    /// Short name used in logs and release errors
    fn name(&self) -> &str;

    /// Wrap `inner`, returning the layer callers write to
    fn wrap(&self, inner: Box<dyn SinkLayer>) -> io::Result<Box<dyn SinkLayer>>;
}

/// Ordered list of transforms, applied innermost first
///
/// The last transform pushed becomes the outermost layer.
#[derive(Clone, Default)]
pub struct TransformChain {
    transforms: Vec<Arc<dyn OutputTransform>>,
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.transforms.iter().map(|t| t.name()))
            .finish()
    }
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform on top of the ones already in the chain
    pub fn then<T: OutputTransform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    /// Append a shared transform
    pub fn push(&mut self, transform: Arc<dyn OutputTransform>) {
        self.transforms.push(transform);
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Names of the transforms, innermost first
    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Stack every transform over `base`
    ///
    /// On failure the layers built so far are dropped, which aborts the pipe
    /// beneath them.
    pub fn apply(&self, base: Box<dyn SinkLayer>) -> io::Result<Box<dyn SinkLayer>> {
        let mut layer = base;
        for transform in &self.transforms {
            layer = transform.wrap(layer)?;
        }
        Ok(layer)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryLayer;
    use super::*;

    struct Upper;

    struct UpperLayer(Box<dyn SinkLayer>);

    impl Write for UpperLayer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write_all(&buf.to_ascii_uppercase())?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }

    impl SinkLayer for UpperLayer {
        fn close(self: Box<Self>) -> io::Result<()> {
            self.0.close()
        }
    }

    impl OutputTransform for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn wrap(&self, inner: Box<dyn SinkLayer>) -> io::Result<Box<dyn SinkLayer>> {
            Ok(Box::new(UpperLayer(inner)))
        }
    }

    struct Tagging;

    struct TaggingLayer(Box<dyn SinkLayer>);

    impl Write for TaggingLayer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.0.flush()
        }
    }

    impl SinkLayer for TaggingLayer {
        fn close(mut self: Box<Self>) -> io::Result<()> {
            self.0.write_all(b"!end")?;
            self.0.close()
        }
    }

    impl OutputTransform for Tagging {
        fn name(&self) -> &str {
            "tagging"
        }

        fn wrap(&self, inner: Box<dyn SinkLayer>) -> io::Result<Box<dyn SinkLayer>> {
            Ok(Box::new(TaggingLayer(inner)))
        }
    }

    #[test]
    fn test_empty_chain_is_passthrough() {
        let (base, bytes, closed) = MemoryLayer::new();
        let chain = TransformChain::new();
        assert!(chain.is_empty());

        let mut layer = chain.apply(Box::new(base)).unwrap();
        layer.write_all(b"hello").unwrap();
        layer.close().unwrap();

        assert_eq!(&*bytes.lock().unwrap(), b"hello");
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_last_transform_is_outermost() {
        let (base, bytes, closed) = MemoryLayer::new();
        // Upper wraps the base, Tagging wraps Upper: the tag passes through Upper.
        let chain = TransformChain::new().then(Upper).then(Tagging);
        assert_eq!(chain.names(), vec!["upper", "tagging"]);

        let mut layer = chain.apply(Box::new(base)).unwrap();
        layer.write_all(b"abc").unwrap();
        layer.close().unwrap();

        assert_eq!(&*bytes.lock().unwrap(), b"ABC!END");
        assert!(*closed.lock().unwrap());
    }

    #[test]
    fn test_chain_debug_lists_names() {
        let chain = TransformChain::new().then(Upper);
        assert_eq!(format!("{:?}", chain), "[\"upper\"]");
    }
}
