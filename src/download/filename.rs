//! Filename derivation, sanitization, and unique path reservation.
//!
//! Paths handed out by [`reserve_unique_path`] and [`random_unique_path`] are
//! claimed on disk with `create_new`, so two concurrent callers asking for the
//! same name always receive different paths.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use rand::Rng;
use tokio::fs::OpenOptions;
use tracing::debug;
use url::Url;

/// Highest numeric suffix tried before falling back to a random suffix.
const MAX_NUMERIC_SUFFIX: usize = 1000;

/// Attempts at a random name before giving up.
const MAX_RANDOM_ATTEMPTS: usize = 16;

/// Filename used when sanitization leaves nothing usable.
const FALLBACK_FILENAME: &str = "download.bin";

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Filename derived from the URL's last path segment, or `download_<timestamp>.bin`.
pub(crate) fn filename_from_url(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
            debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
            last.into()
        });
        return sanitize_filename(&decoded);
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}.bin")
}

/// Normalizes a caller-supplied extension to `.ext`, or nothing when empty.
pub(crate) fn normalize_extension(extension: &str) -> String {
    let cleaned = sanitize_filename(extension.trim().trim_start_matches('.'));
    if cleaned.trim_matches('_').is_empty() {
        String::new()
    } else {
        format!(".{cleaned}")
    }
}

/// Reserves a unique path for `filename` inside `dir`.
///
/// Tries `file.ext`, then `file_1.ext`, `file_2.ext`, ... and claims the first
/// free name by creating an empty file. `dir` is created if missing.
///
/// # Errors
///
/// Returns the underlying IO error if the directory cannot be created or a
/// candidate cannot be created for a reason other than already existing.
pub async fn reserve_unique_path(dir: &Path, filename: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let filename = {
        let sanitized = sanitize_filename(filename);
        if sanitized.contains('/')
            || sanitized.contains('\\')
            || sanitized.trim_matches('_').is_empty()
        {
            FALLBACK_FILENAME.to_string()
        } else {
            sanitized
        }
    };

    if let Some(path) = try_claim(dir.join(&filename)).await? {
        return Ok(path);
    }

    let (stem, ext) = match filename.rfind('.') {
        Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
        _ => (filename.as_str(), ""),
    };

    for i in 1..MAX_NUMERIC_SUFFIX {
        if let Some(path) = try_claim(dir.join(format!("{stem}_{i}{ext}"))).await? {
            return Ok(path);
        }
    }

    claim_random(dir, &format!("{stem}_"), ext).await
}

/// Reserves a random, unique path inside `dir` with an optional extension.
///
/// # Errors
///
/// Returns the underlying IO error if the directory or file cannot be created.
pub async fn random_unique_path(dir: &Path, extension: Option<&str>) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let ext = extension.map(normalize_extension).unwrap_or_default();
    claim_random(dir, "", &ext).await
}

async fn claim_random(dir: &Path, prefix: &str, ext: &str) -> std::io::Result<PathBuf> {
    for _ in 0..MAX_RANDOM_ATTEMPTS {
        let token: u64 = rand::thread_rng().r#gen();
        if let Some(path) = try_claim(dir.join(format!("{prefix}{token:016x}{ext}"))).await? {
            return Ok(path);
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free filename found in {}", dir.display()),
    ))
}

/// Creates `path` if it does not exist; `None` when it is already taken.
async fn try_claim(path: PathBuf) -> std::io::Result<Option<PathBuf>> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
    {
        Ok(_) => Ok(Some(path)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}
