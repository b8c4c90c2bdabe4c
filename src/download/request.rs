//! Single download request and target resolution.

use std::path::{Path, PathBuf};

use url::Url;

use super::RequestError;
use super::filename::{filename_from_url, random_unique_path, reserve_unique_path};

/// One item to download: a source URI plus where to put it.
///
/// Target resolution: an explicit path wins; otherwise a directory with an
/// extension yields a random unique name; otherwise a directory alone yields
/// a unique name derived from the URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    uri: String,
    path: Option<PathBuf>,
    directory: Option<PathBuf>,
    extension: Option<String>,
}

impl DownloadRequest {
    /// Creates a request with no target yet.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            path: None,
            directory: None,
            extension: None,
        }
    }

    /// Creates a request that writes to an explicit path.
    pub fn to_path(uri: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(uri).with_path(path)
    }

    /// Creates a request that writes into `directory` under a URI-derived name.
    pub fn in_directory(uri: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self::new(uri).with_directory(directory)
    }

    /// Sets the explicit target path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the target directory.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Sets the extension used for random names inside the directory.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// The source URI as given.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Parses the URI, accepting only absolute `http`/`https` URLs.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUri`] when the URI does not parse or
    /// uses another scheme.
    pub fn parse_uri(&self) -> Result<Url, RequestError> {
        parse_http_url(&self.uri)
    }

    /// Decides how the target path will be produced, without touching disk.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MissingTarget`] when neither a path nor a
    /// directory was supplied.
    pub fn target_spec(&self) -> Result<TargetSpec, RequestError> {
        if let Some(path) = &self.path {
            return Ok(TargetSpec::Explicit(path.clone()));
        }
        match (&self.directory, &self.extension) {
            (Some(dir), Some(ext)) => Ok(TargetSpec::Random {
                directory: dir.clone(),
                extension: ext.clone(),
            }),
            (Some(dir), None) => Ok(TargetSpec::Derived {
                directory: dir.clone(),
            }),
            (None, _) => Err(RequestError::MissingTarget {
                uri: self.uri.clone(),
            }),
        }
    }
}

/// How a request's target path is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Write to exactly this path.
    Explicit(PathBuf),
    /// Random unique name with the given extension.
    Random {
        /// Directory the file is created in.
        directory: PathBuf,
        /// Extension appended to the random name.
        extension: String,
    },
    /// Unique name derived from the URI's last path segment.
    Derived {
        /// Directory the file is created in.
        directory: PathBuf,
    },
}

impl TargetSpec {
    /// Resolves the target to a concrete path, reserving it on disk unless explicit.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while creating the directory or claiming
    /// the file.
    pub async fn materialize(&self, url: &Url) -> std::io::Result<PathBuf> {
        match self {
            Self::Explicit(path) => Ok(path.clone()),
            Self::Random {
                directory,
                extension,
            } => random_unique_path(directory, Some(extension)).await,
            Self::Derived { directory } => {
                reserve_unique_path(directory, &filename_from_url(url)).await
            }
        }
    }

    /// Directory the target lives in, when known before materializing.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        match self {
            Self::Explicit(path) => path.parent(),
            Self::Random { directory, .. } | Self::Derived { directory } => Some(directory),
        }
    }
}

/// Parses `raw` as an absolute `http`/`https` URL.
pub(crate) fn parse_http_url(raw: &str) -> Result<Url, RequestError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| RequestError::invalid_uri(raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RequestError::invalid_uri(
                raw,
                format!("unsupported scheme '{other}'"),
            ));
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(RequestError::invalid_uri(raw, "missing host"));
    }
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins_over_directory() {
        let request = DownloadRequest::in_directory("https://example.com/a.pdf", "/tmp/dir")
            .with_extension("bin")
            .with_path("/tmp/explicit.pdf");
        assert_eq!(
            request.target_spec().unwrap(),
            TargetSpec::Explicit(PathBuf::from("/tmp/explicit.pdf"))
        );
    }

    #[test]
    fn test_directory_with_extension_is_random() {
        let request =
            DownloadRequest::in_directory("https://example.com/a", "/tmp/dir").with_extension("json");
        assert!(matches!(
            request.target_spec().unwrap(),
            TargetSpec::Random { ref extension, .. } if extension == "json"
        ));
    }

    #[test]
    fn test_directory_alone_is_derived() {
        let request = DownloadRequest::in_directory("https://example.com/a", "/tmp/dir");
        assert_eq!(
            request.target_spec().unwrap(),
            TargetSpec::Derived {
                directory: PathBuf::from("/tmp/dir")
            }
        );
    }

    #[test]
    fn test_missing_target_is_rejected() {
        let request = DownloadRequest::new("https://example.com/a").with_extension("pdf");
        assert!(matches!(
            request.target_spec(),
            Err(RequestError::MissingTarget { .. })
        ));
    }

    #[test]
    fn test_parse_uri_accepts_http_and_https() {
        assert!(DownloadRequest::new("http://example.com/x").parse_uri().is_ok());
        assert!(DownloadRequest::new("https://example.com/x").parse_uri().is_ok());
    }

    #[test]
    fn test_parse_uri_rejects_relative_and_other_schemes() {
        for raw in ["not a url", "/relative/path", "ftp://example.com/x", "file:///etc/passwd"] {
            let result = DownloadRequest::new(raw).parse_uri();
            assert!(
                matches!(result, Err(RequestError::InvalidUri { .. })),
                "{raw} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_materialize_derived_uses_uri_filename() {
        let temp_dir = TempDir::new().unwrap();
        let url = Url::parse("https://example.com/files/report.pdf").unwrap();
        let spec = TargetSpec::Derived {
            directory: temp_dir.path().to_path_buf(),
        };

        let first = spec.materialize(&url).await.unwrap();
        let second = spec.materialize(&url).await.unwrap();

        assert_eq!(first, temp_dir.path().join("report.pdf"));
        assert_eq!(second, temp_dir.path().join("report_1.pdf"));
    }

    #[tokio::test]
    async fn test_materialize_explicit_does_not_touch_disk() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested").join("out.bin");
        let url = Url::parse("https://example.com/x").unwrap();

        let path = TargetSpec::Explicit(target.clone())
            .materialize(&url)
            .await
            .unwrap();

        assert_eq!(path, target);
        assert!(!target.exists());
    }
}
