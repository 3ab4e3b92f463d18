//! tzsync-transport: origin fetch for dataset archives
//!
//! An origin is either a local filesystem path or an `http(s)://` URL. Both
//! are fetched into a scratch temp file that the caller owns until it is
//! released.

pub mod http;
pub mod local;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use color_eyre::Result;
use tempfile::TempPath;
use url::Url;

/// Where a dataset archive comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Local(PathBuf),
    Remote(Url),
}

impl Origin {
    /// Parse an origin string.
    ///
    /// `http://` and `https://` are remote, `file://` URLs and anything else
    /// are local paths.
    ///
    /// # Errors
    /// Returns an error for an empty string, a malformed URL or an
    /// unsupported scheme.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            color_eyre::eyre::bail!("empty origin");
        }

        if !value.contains("://") {
            return Ok(Self::Local(PathBuf::from(value)));
        }

        let url = Url::parse(value)?;
        match url.scheme() {
            "http" | "https" => Ok(Self::Remote(url)),
            "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|()| color_eyre::eyre::eyre!("invalid file URL: {value}")),
            other => color_eyre::eyre::bail!("unsupported origin scheme: {other}"),
        }
    }

    /// Check if the origin needs a network transfer
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Local path, if this is a local origin
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Fetch settings
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Whole-request timeout for remote origins; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

/// An archive fetched into a scratch file.
///
/// The scratch file is removed when this value is dropped or released.
#[derive(Debug)]
pub struct FetchedArchive {
    path: TempPath,
    origin: Origin,
    len: u64,
    fetched_at: SystemTime,
}

impl FetchedArchive {
    pub(crate) fn new(path: TempPath, origin: Origin, len: u64) -> Self {
        Self {
            path,
            origin,
            len,
            fetched_at: SystemTime::now(),
        }
    }

    /// Path of the scratch file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Bytes transferred
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// Remove the scratch file, reporting failure instead of ignoring it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be deleted.
    pub fn release(self) -> Result<()> {
        let display = self.path.display().to_string();
        self.path
            .close()
            .map_err(|e| color_eyre::eyre::eyre!("failed to remove scratch file {display}: {e}"))
    }
}

/// Fetch an origin into a scratch file
///
/// # Errors
/// Returns an error if the origin cannot be read or downloaded.
pub fn fetch(origin: &Origin, options: &FetchOptions) -> Result<FetchedArchive> {
    let started = std::time::Instant::now();
    let fetched = match origin {
        Origin::Local(path) => local::fetch(path)?,
        Origin::Remote(url) => http::fetch(url, options)?,
    };

    tracing::debug!(
        origin = %origin,
        bytes = fetched.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fetched archive"
    );
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            Origin::parse("/var/lib/tzdata.zip").unwrap(),
            Origin::Local(PathBuf::from("/var/lib/tzdata.zip"))
        );
        assert_eq!(
            Origin::parse("file:///var/lib/tzdata.zip").unwrap(),
            Origin::Local(PathBuf::from("/var/lib/tzdata.zip"))
        );

        let remote = Origin::parse("https://tz.example.com/tzdata.zip").unwrap();
        assert!(remote.is_remote());
        assert_eq!(remote.to_string(), "https://tz.example.com/tzdata.zip");
    }

    #[test]
    fn test_parse_rejects_bad_origins() {
        assert!(Origin::parse("").is_err());
        assert!(Origin::parse("ftp://tz.example.com/tzdata.zip").is_err());
    }

    #[test]
    fn test_release_removes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tzdata.zip");
        std::fs::write(&source, b"PK").unwrap();

        let fetched = fetch(&Origin::Local(source), &FetchOptions::default()).unwrap();
        let scratch = fetched.path().to_path_buf();
        assert!(scratch.exists());
        assert_eq!(fetched.len(), 2);

        fetched.release().unwrap();
        assert!(!scratch.exists());
    }
}
