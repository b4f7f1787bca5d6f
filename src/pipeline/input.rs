//! Input validation: make sure the path names a readable DjVu file.
//!
//! The DjVuLibre tools report a missing or foreign file with terse messages
//! and exit codes, so the file is checked up front. Every DjVu document
//! (single-page or bundled) starts with the IFF header `AT&TFORM`.

use crate::error::Djvu2PdfError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// First eight bytes of every DjVu file.
pub const DJVU_MAGIC: &[u8; 8] = b"AT&TFORM";

/// Validate that `path` exists, is readable, and carries the DjVu magic.
pub fn validate_input(path: impl AsRef<Path>) -> Result<PathBuf, Djvu2PdfError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(Djvu2PdfError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 8];
            let read = read_prefix(&mut f, &mut magic);
            if read < magic.len() || &magic != DJVU_MAGIC {
                return Err(Djvu2PdfError::NotADjvu { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Djvu2PdfError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Djvu2PdfError::FileNotFound { path });
        }
    }

    debug!("Validated DjVu input: {}", path.display());
    Ok(path)
}

/// Fill as much of `buf` as the file allows; short files leave zeros.
fn read_prefix(f: &mut std::fs::File, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match f.read(&mut buf[filled..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}
