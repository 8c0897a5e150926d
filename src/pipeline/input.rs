//! Input resolution: a path, URL or byte buffer → a local PDF file.
//!
//! pdfium opens files by path, so URLs and in-memory buffers are written to
//! a temporary directory that lives as long as the [`ResolvedInput`].

use crate::error::DatasheetError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A PDF available on the local file system.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// Downloaded or materialised into a temp dir, removed on drop.
    Temporary { path: PathBuf, _dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Temporary { path, .. } => path,
        }
    }

    /// File name shown in headers and used for output names.
    pub fn file_name(&self) -> String {
        self.path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string())
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or an HTTP(S) URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, DatasheetError> {
    if input.trim().is_empty() {
        return Err(DatasheetError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download(input, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

fn check_magic(path: &Path, head: &[u8]) -> Result<(), DatasheetError> {
    if head.len() >= 4 && &head[..4] != PDF_MAGIC {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[..4]);
        return Err(DatasheetError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn resolve_local(path: &Path) -> Result<ResolvedInput, DatasheetError> {
    if !path.is_file() {
        return Err(DatasheetError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DatasheetError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => DatasheetError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    let mut head = [0u8; 4];
    let n = file.read(&mut head).unwrap_or(0);
    check_magic(path, &head[..n])?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path.to_path_buf()))
}

/// Write `bytes` to a temp file named `file_name`.
pub fn materialise_bytes(bytes: &[u8], file_name: &str) -> Result<ResolvedInput, DatasheetError> {
    let dir = TempDir::new().map_err(|e| DatasheetError::Internal(format!("temp dir: {e}")))?;
    let path = dir.path().join(file_name);
    check_magic(&path, bytes)?;
    std::fs::write(&path, bytes)
        .map_err(|e| DatasheetError::Internal(format!("writing temp PDF: {e}")))?;
    Ok(ResolvedInput::Temporary { path, _dir: dir })
}

async fn download(url: &str, timeout_secs: u64) -> Result<ResolvedInput, DatasheetError> {
    info!("Downloading {}", url);
    let failed = |reason: String| DatasheetError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DatasheetError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;

    let resolved = materialise_bytes(&bytes, &file_name_from_url(url))?;
    info!("Downloaded {} bytes to {}", bytes.len(), resolved.path().display());
    Ok(resolved)
}

/// Last path segment of `url` when it looks like a file name.
fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|seg| !seg.is_empty() && seg.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
