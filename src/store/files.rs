//! On-disk storage for uploaded document bytes.
//!
//! Files land under a content-stable name derived from the document id, and are renamed
//! exactly once, after classification, to a descriptive slug. Renames never overwrite: a
//! colliding target gets a fresh random suffix instead.

use crate::store::DocType;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by file storage operations.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The rename source no longer exists on disk.
    #[error("Source file not found for rename: {0}")]
    MissingSource(PathBuf),
}

/// Result of persisting an upload.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Filename under the storage root.
    pub stored_file_name: String,
    /// Full path of the stored file.
    pub file_path: PathBuf,
    /// Size in bytes.
    pub file_size: i64,
    /// MIME type from the upload, falling back to an extension-based guess.
    pub mime_type: String,
}

/// Directory-rooted store for uploaded bytes.
#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily on first save.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Persist uploaded bytes under `{id}{ext}`, a collision-free name derived from the
    /// document id.
    pub async fn save(
        &self,
        id: Uuid,
        original_file_name: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredFile, FileStoreError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let extension = extension_of(original_file_name);
        let stored_file_name = format!("{}{extension}", id.simple());
        let file_path = self.root.join(&stored_file_name);
        tokio::fs::write(&file_path, bytes).await?;

        let mime_type = content_type
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| mime_from_extension(&extension).to_string());

        Ok(StoredFile {
            stored_file_name,
            file_path,
            file_size: bytes.len() as i64,
            mime_type,
        })
    }

    /// Atomically rename a stored file to `new_file_name`, slugifying its stem.
    ///
    /// If the target already exists, a fresh random suffix is appended rather than
    /// overwriting. Returns the final filename and path.
    pub async fn rename(
        &self,
        current_path: &Path,
        new_file_name: &str,
    ) -> Result<(String, PathBuf), FileStoreError> {
        if tokio::fs::metadata(current_path).await.is_err() {
            return Err(FileStoreError::MissingSource(current_path.to_path_buf()));
        }

        let directory = current_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let stem = Path::new(new_file_name)
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("document");
        let extension = extension_of(new_file_name);

        let mut final_name = format!("{}{extension}", slugify(stem));
        let mut new_path = directory.join(&final_name);

        if new_path == current_path {
            return Ok((final_name, new_path));
        }

        if tokio::fs::metadata(&new_path).await.is_ok() {
            let suffix = short_suffix(Uuid::new_v4());
            final_name = format!("{}-{suffix}{extension}", slugify(stem));
            new_path = directory.join(&final_name);
        }

        tokio::fs::rename(current_path, &new_path).await?;
        Ok((final_name, new_path))
    }

    /// Remove a stored file. Missing files are not an error.
    pub async fn delete(&self, path: &Path) -> Result<(), FileStoreError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Reduce arbitrary text to a filesystem-safe slug: lowercase, keep `[a-z0-9 -]`,
/// collapse whitespace runs, hyphenate.
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .collect();
    kept.split([' ', '-'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Compose the canonical post-classification filename:
/// `{docType}-{yyyymmdd}-{betterName}-{shortIdSuffix}{ext}`.
///
/// The stem is slugified during rename, which also squashes the spaces in multi-word
/// type labels.
pub fn compose_final_name(
    doc_type: DocType,
    better_name: &str,
    id: Uuid,
    extension: &str,
) -> String {
    let now = OffsetDateTime::now_utc();
    let date_part = format!(
        "{:04}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day()
    );
    format!(
        "{}-{date_part}-{better_name}-{}{extension}",
        doc_type.label(),
        short_suffix(id)
    )
}

/// Lowercased extension of a filename including the leading dot, or `.bin` when absent.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_else(|| ".bin".to_string())
}

fn short_suffix(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn mime_from_extension(extension: &str) -> &'static str {
    match extension {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn slugify_strips_and_hyphenates() {
        assert_eq!(slugify("Flight to Oslo!"), "flight-to-oslo");
        assert_eq!(slugify("  REMA 1000   receipt "), "rema-1000-receipt");
        assert_eq!(slugify("już--gotowe"), "ju-gotowe");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn final_name_carries_type_date_and_suffix() {
        let id = Uuid::new_v4();
        let name = compose_final_name(DocType::FlightTicket, "oslo trip", id, ".pdf");
        assert!(name.starts_with("Flight Ticket-"));
        assert!(name.ends_with(&format!("-{}.pdf", &id.simple().to_string()[..8])));
        assert!(name.contains("-oslo trip-"));
    }

    #[test]
    fn extension_defaults_to_bin() {
        assert_eq!(extension_of("photo.JPG"), ".jpg");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("no-extension"), ".bin");
    }

    #[tokio::test]
    async fn save_writes_bytes_under_id_derived_name() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();

        let stored = store
            .save(id, "receipt.png", None, b"fake image bytes")
            .await
            .expect("save");

        assert_eq!(stored.stored_file_name, format!("{}.png", id.simple()));
        assert_eq!(stored.file_size, 16);
        assert_eq!(stored.mime_type, "image/png");
        let on_disk = tokio::fs::read(&stored.file_path).await.expect("read back");
        assert_eq!(on_disk, b"fake image bytes");
    }

    #[tokio::test]
    async fn rename_slugifies_stem_and_moves_file() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());
        let id = Uuid::new_v4();
        let stored = store
            .save(id, "scan.pdf", None, b"pdf bytes")
            .await
            .expect("save");

        let (name, path) = store
            .rename(&stored.file_path, "Receipt-20250101-Grocery Run-abcd1234.pdf")
            .await
            .expect("rename");

        assert_eq!(name, "receipt-20250101-grocery-run-abcd1234.pdf");
        assert!(tokio::fs::metadata(&path).await.is_ok());
        assert!(tokio::fs::metadata(&stored.file_path).await.is_err());
    }

    #[tokio::test]
    async fn rename_avoids_collisions_with_fresh_suffix() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());

        let first = store
            .save(Uuid::new_v4(), "a.pdf", None, b"one")
            .await
            .expect("save");
        let (occupied, _) = store
            .rename(&first.file_path, "same-name.pdf")
            .await
            .expect("rename");

        let second = store
            .save(Uuid::new_v4(), "b.pdf", None, b"two")
            .await
            .expect("save");
        let (renamed, path) = store
            .rename(&second.file_path, "same-name.pdf")
            .await
            .expect("rename with collision");

        assert_ne!(renamed, occupied);
        assert!(renamed.starts_with("same-name-"));
        assert!(tokio::fs::metadata(&path).await.is_ok());
    }

    #[tokio::test]
    async fn rename_missing_source_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());
        let missing = dir.path().join("ghost.pdf");

        let error = store
            .rename(&missing, "anything.pdf")
            .await
            .expect_err("missing source");
        assert!(matches!(error, FileStoreError::MissingSource(_)));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_files() {
        let dir = tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());
        store
            .delete(&dir.path().join("not-there.pdf"))
            .await
            .expect("idempotent delete");
    }
}
