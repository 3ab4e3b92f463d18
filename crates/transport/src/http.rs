//! Remote origins over HTTP(S)
//!
//! Uses the blocking reqwest client; callers on an async runtime run the
//! fetch on a blocking thread.

use color_eyre::Result;
use color_eyre::eyre::WrapErr as _;
use url::Url;

use crate::{FetchOptions, FetchedArchive, Origin};

/// Download a remote archive into a scratch file
///
/// # Errors
/// Returns an error on connection failure, a non-success status, a timeout
/// or a failed write to the scratch file.
pub fn fetch(url: &Url, options: &FetchOptions) -> Result<FetchedArchive> {
    let mut builder = reqwest::blocking::Client::builder()
        .user_agent(concat!("tzsync/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    let mut response = client
        .get(url.clone())
        .send()
        .wrap_err_with(|| format!("request to {url} failed"))?
        .error_for_status()
        .wrap_err_with(|| format!("{url} returned an error status"))?;

    let mut scratch = tempfile::Builder::new()
        .prefix("tzsync-")
        .suffix(".zip")
        .tempfile()?;
    let len = response
        .copy_to(scratch.as_file_mut())
        .wrap_err_with(|| format!("download from {url} failed"))?;

    Ok(FetchedArchive::new(
        scratch.into_temp_path(),
        Origin::Remote(url.clone()),
        len,
    ))
}
