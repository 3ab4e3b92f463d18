//! Local filesystem origins

use std::fs::File;
use std::path::Path;
use std::time::SystemTime;

use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;

use crate::{FetchedArchive, Origin};

/// Size and modification time of a local origin, used to detect new data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginStamp {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Stat a local origin
///
/// # Errors
/// Returns an error if the file metadata cannot be read.
pub fn stamp(path: &Path) -> Result<OriginStamp> {
    let meta = std::fs::metadata(path)
        .wrap_err_with(|| format!("failed to stat {}", path.display()))?;
    Ok(OriginStamp {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}

/// Copy a local archive into a scratch file.
///
/// Copying rather than reading in place means a later rewrite of the origin
/// cannot change the archive underneath a loaded snapshot.
///
/// # Errors
/// Returns an error if the source cannot be read or the copy fails.
pub fn fetch(path: &Path) -> Result<FetchedArchive> {
    let mut source =
        File::open(path).wrap_err_with(|| format!("failed to open {}", path.display()))?;

    let mut scratch = tempfile::Builder::new()
        .prefix("tzsync-")
        .suffix(".zip")
        .tempfile()?;
    let len = std::io::copy(&mut source, scratch.as_file_mut())
        .wrap_err_with(|| format!("failed to copy {}", path.display()))?;

    Ok(FetchedArchive::new(
        scratch.into_temp_path(),
        Origin::Local(path.to_path_buf()),
        len,
    ))
}
