//! Writing element streams into a sink
//!
//! Each element of a fallible iterator is encoded and written to the sink.
//! A failing element stops the stream and is reported with its position;
//! the caller still owns the sink and decides whether to close it.

use crate::error::{BoxError, Result, StreamifyError};
use serde::Serialize;
use std::io::Write;

/// Encode and write every element, returning how many were written
pub fn write_elements<W, I, T, E, F, G>(sink: &mut W, elements: I, mut encode: F) -> Result<u64>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = std::result::Result<T, E>>,
    E: Into<BoxError>,
    F: FnMut(&T, &mut Vec<u8>) -> std::result::Result<(), G>,
    G: Into<BoxError>,
{
    let mut buf = Vec::new();
    let mut count = 0u64;

    for element in elements {
        let element = element.map_err(|e| StreamifyError::element(count, e))?;
        buf.clear();
        encode(&element, &mut buf).map_err(|e| StreamifyError::element(count, e))?;
        sink.write_all(&buf)?;
        count += 1;
    }

    sink.flush()?;
    Ok(count)
}

/// Write every element as one line of JSON
pub fn write_json_lines<W, I, T, E>(sink: &mut W, elements: I) -> Result<u64>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = std::result::Result<T, E>>,
    T: Serialize,
    E: Into<BoxError>,
{
    write_elements(sink, elements, |element, buf| {
        serde_json::to_writer(&mut *buf, element)?;
        buf.push(b'\n');
        Ok::<(), serde_json::Error>(())
    })
}
