//! Dump a mapped region to a file

use crate::error::DumpError;
use crate::mmio::MappedRegion;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Dump file permissions: owner read/write only
const DUMP_MODE: u32 = 0o600;

/// What a successful dump wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSummary {
    /// Target file
    pub path: PathBuf,
    /// Bytes written (equal to the mapping size)
    pub bytes: usize,
}

/// Write the full mapped region to `path`, creating or truncating it.
///
/// # Errors
///
/// - `DumpError::InvalidArgument` for an empty path or zero-size mapping
/// - `DumpError::OpenFailed` if the file cannot be created
/// - `DumpError::PartialWrite` if fewer than `mapping.size()` bytes land
pub fn dump_to_file(
    mapping: &MappedRegion,
    path: impl AsRef<Path>,
) -> Result<DumpSummary, DumpError> {
    let path = path.as_ref();

    if path.as_os_str().is_empty() {
        return Err(DumpError::InvalidArgument {
            reason: "empty output path",
        });
    }
    if mapping.size() == 0 {
        return Err(DumpError::InvalidArgument {
            reason: "empty mapping",
        });
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(DUMP_MODE)
        .open(path)
        .map_err(|source| {
            tracing::error!("failed to open {}: {source}", path.display());
            DumpError::OpenFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;

    let image = mapping.view().snapshot();
    let expected = image.len();

    let (written, cause) = write_counted(&mut file, &image);
    if written != expected {
        match cause {
            Some(e) => tracing::error!("can't write HDA memory, {written} bytes written: {e}"),
            None => tracing::error!("can't write HDA memory, {written} bytes written"),
        }
        return Err(DumpError::PartialWrite { written, expected });
    }

    tracing::info!(
        "{written} ({written:#x}) bytes written to file {}",
        path.display()
    );

    Ok(DumpSummary {
        path: path.to_path_buf(),
        bytes: written,
    })
}

/// Write as much of `data` as the sink accepts.
///
/// Returns the byte count and the error that stopped it, if any.
fn write_counted<W: Write>(sink: &mut W, data: &[u8]) -> (usize, Option<io::Error>) {
    let mut written = 0;
    while written < data.len() {
        match sink.write(&data[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (written, Some(e)),
        }
    }
    (written, None)
}
