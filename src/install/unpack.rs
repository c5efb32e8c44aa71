//! Bundle extraction.

use crate::error::{ConvergeError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;

/// Unpacks a gzip tarball into `target`, overwriting existing files.
///
/// Extraction is blocking I/O and runs on the blocking thread pool.
pub async fn unpack(archive: &Path, target: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let target = target.to_path_buf();

    tokio::task::spawn_blocking(move || unpack_blocking(&archive, &target))
        .await
        .map_err(|e| ConvergeError::backend_with_source("Unpack task failed", e))?
}

fn unpack_blocking(archive: &Path, target: &Path) -> Result<()> {
    let unpack_error = |e: std::io::Error| ConvergeError::Unpack {
        archive: archive.display().to_string(),
        message: e.to_string(),
    };

    let file = File::open(archive).map_err(unpack_error)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);
    tar.unpack(target).map_err(unpack_error)
}
