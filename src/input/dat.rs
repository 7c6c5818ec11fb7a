use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;

use super::RawStream;
use crate::error::{DecodeError, Result};

/// Read a PC-80B `.dat` dump into memory
/// The file handle is dropped before returning
pub fn read_dat<P: AsRef<Path>>(path: P) -> Result<RawStream> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| DecodeError::io(path, e))?;

    debug!(path = %path.display(), size = bytes.len(), "loaded dump");
    Ok(RawStream::new(bytes))
}
