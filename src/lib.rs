pub mod channel;
pub mod elements;
pub mod error;
pub mod outcome;
pub mod pipe;
pub mod request;
pub mod sink;
pub mod transfer;
pub mod transform;

pub use channel::{upload_reader, ChannelConfig, StreamingChannel, WebDavChannel};

pub use elements::{write_elements, write_json_lines};

pub use error::{Result, StreamifyError, TransferError};

pub use pipe::{PipeControl, PipeReader, PipeStats, PipeWriter, DEFAULT_BUFFER_SIZE};

pub use request::{StreamingRequest, JSON_LINES_CONTENT_TYPE};

pub use sink::{SinkState, StreamingSink};

pub use transfer::{
    BasicAuthInterceptor, HttpTransport, RequestInterceptor, TransferCoordinator, TransferHandle,
    TransferReport, Transport, TransportResponse,
};

pub use transform::{GzipTransform, OutputTransform, SingleEntryZipTransform, SinkLayer, TransformChain};

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
