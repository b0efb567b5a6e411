//! Multipart file uploads shared by the blog and forum apps.
//!
//! Files land in the configured upload directory as
//! `<yyyymmdd_HHMMSS>_<sanitized original name>` and are served back under
//! `/uploads/<stored name>`.

use crate::api::ApiError;
use axum::extract::Multipart;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A file written to the upload directory.
#[derive(Debug, Clone)]
pub struct SavedUpload {
    /// File name inside the upload directory.
    pub stored_name: String,
    pub original_filename: String,
    /// Full path on disk.
    pub path: PathBuf,
    pub size: usize,
    pub content_type: String,
}

impl SavedUpload {
    /// Public URL of the file.
    pub fn url(&self) -> String {
        format!("/uploads/{}", self.stored_name)
    }

    /// Best-effort removal, used when the database write that should
    /// reference the file fails.
    pub async fn discard(&self) {
        remove_file(&self.path).await;
    }
}

/// Reduces a client-supplied file name to ASCII letters, digits, `.`, `-`
/// and `_`. Directory components are dropped, whitespace becomes `_`, and
/// leading dots are stripped so the result can never name a hidden file or
/// escape the upload directory.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// Lowercased extension of `name`, if it has one.
pub fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Timestamped storage name for an already sanitized file name.
pub fn stored_name(sanitized: &str, now: DateTime<Local>) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), sanitized)
}

/// Path of a previously stored file, or `None` when `name` is not a plain
/// file name produced by [`stored_name`].
pub fn stored_path(upload_dir: &Path, name: &str) -> Option<PathBuf> {
    (!name.is_empty() && sanitize_filename(name) == name).then(|| upload_dir.join(name))
}

/// Deletes `path`, logging instead of failing when it cannot be removed.
pub async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove uploaded file");
    }
}

/// Limits applied to one upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadRules<'a> {
    pub allowed_extensions: &'a [&'a str],
    pub max_bytes: usize,
}

/// Reads the next file field of `multipart` and writes it to `upload_dir`.
///
/// Fields without a file name (plain form fields) are skipped. Returns
/// `None` once the body has no more file fields.
pub async fn next_upload(
    multipart: &mut Multipart,
    upload_dir: &Path,
    rules: UploadRules<'_>,
) -> Result<Option<SavedUpload>, ApiError> {
    loop {
        let field = match multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("multipart error: {}", e)))?
        {
            Some(field) => field,
            None => return Ok(None),
        };

        let original_filename = match field.file_name() {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => continue,
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let sanitized = sanitize_filename(&original_filename);
        let allowed = extension(&sanitized)
            .is_some_and(|ext| rules.allowed_extensions.contains(&ext.as_str()));
        if sanitized.is_empty() || !allowed {
            return Err(ApiError::BadRequest(format!(
                "file type not allowed: {} (allowed: {})",
                original_filename,
                rules.allowed_extensions.join(", ")
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

        if data.len() > rules.max_bytes {
            return Err(ApiError::BadRequest(format!(
                "file too large: {} bytes (max {})",
                data.len(),
                rules.max_bytes
            )));
        }

        tokio::fs::create_dir_all(upload_dir).await.map_err(|e| {
            ApiError::InternalServerError(format!("failed to create upload dir: {}", e))
        })?;

        let (stored_name, path) = write_unique(upload_dir, &sanitized, &data).await?;
        tracing::info!(
            file = %stored_name,
            size = data.len(),
            "stored upload"
        );

        return Ok(Some(SavedUpload {
            stored_name,
            original_filename,
            path,
            size: data.len(),
            content_type,
        }));
    }
}

/// Writes `data` under a fresh timestamped name. Two uploads of the same
/// name within one second get a numeric suffix instead of overwriting each
/// other.
async fn write_unique(
    upload_dir: &Path,
    sanitized: &str,
    data: &[u8],
) -> Result<(String, PathBuf), ApiError> {
    let base = stored_name(sanitized, Local::now());
    for attempt in 0..100u32 {
        let name = if attempt == 0 {
            base.clone()
        } else {
            match base.rsplit_once('.') {
                Some((stem, ext)) => format!("{stem}_{attempt}.{ext}"),
                None => format!("{base}_{attempt}"),
            }
        };
        let path = upload_dir.join(&name);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(ApiError::InternalServerError(format!(
                    "failed to write file: {}",
                    e
                )))
            }
        };
        write_or_remove(&mut file, &path, data).await?;
        return Ok((name, path));
    }
    Err(ApiError::InternalServerError(
        "failed to allocate upload file name".to_string(),
    ))
}

/// Writes and flushes `data`. On failure the partly written file at `path`
/// is removed before the error is returned.
async fn write_or_remove<W>(writer: &mut W, path: &Path, data: &[u8]) -> Result<(), ApiError>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(data).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        remove_file(path).await;
        return Err(ApiError::InternalServerError(format!(
            "failed to write file: {}",
            e
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Accepts nothing; every write fails like a full disk.
    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20240101_000000_big.pdf");
        tokio::fs::write(&path, b"").await.unwrap();

        let err = write_or_remove(&mut FullDisk, &path, b"payload")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InternalServerError(_)));
        assert!(!path.exists());
    }

    #[test]
    fn sanitize_strips_paths_and_unsafe_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\My Report.pdf"), "My_Report.pdf");
        assert_eq!(sanitize_filename("  notes (final).txt "), "notes_final.txt");
        assert_eq!(sanitize_filename(".hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("..."), "");
        assert_eq!(sanitize_filename("ümlaut.jpg"), "mlaut.jpg");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension("README"), None);
        assert_eq!(extension("trailing."), None);
    }

    #[test]
    fn stored_name_is_timestamped() {
        let now = Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(stored_name("notes.txt", now), "20240301_090507_notes.txt");
    }

    #[test]
    fn stored_path_rejects_traversal() {
        let dir = Path::new("/srv/uploads");
        assert_eq!(
            stored_path(dir, "20240301_090507_a.png"),
            Some(dir.join("20240301_090507_a.png"))
        );
        assert_eq!(stored_path(dir, "../secret"), None);
        assert_eq!(stored_path(dir, ""), None);
    }

    #[tokio::test]
    async fn write_unique_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let (first, first_path) = write_unique(dir.path(), "a.txt", b"one").await.unwrap();
        let (second, second_path) = write_unique(dir.path(), "a.txt", b"two").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(tokio::fs::read(&first_path).await.unwrap(), b"one");
        assert_eq!(tokio::fs::read(&second_path).await.unwrap(), b"two");
    }
}
