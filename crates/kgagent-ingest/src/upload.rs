//! Upload validation and storage.

use std::path::{Path, PathBuf};

use kgagent_core::config::UploadConfig;
use kgagent_core::DocumentId;

use crate::error::{IngestError, Result};

/// Check an upload against the configured limits.
///
/// Returns the lowercased file extension on success.
pub fn validate_upload(filename: &str, size: u64, config: &UploadConfig) -> Result<String> {
    let name = base_name(filename);
    if name.is_empty() {
        return Err(IngestError::MissingFilename);
    }

    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension.is_empty() || !config.allowed_types.iter().any(|t| *t == extension) {
        return Err(IngestError::UnsupportedType {
            extension,
            allowed: config.allowed_types.clone(),
        });
    }

    if size > config.max_file_size {
        return Err(IngestError::TooLarge {
            size,
            max: config.max_file_size,
        });
    }

    Ok(extension)
}

/// MIME type recorded for a validated extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    }
}

/// BLAKE3 hex digest used to detect duplicate uploads.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Name the upload is stored under: `<document_id>_<filename>`, with any
/// client-supplied directory components dropped.
pub fn stored_file_name(document_id: &DocumentId, filename: &str) -> String {
    let safe: String = base_name(filename)
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    format!("{document_id}_{safe}")
}

/// Write an upload into `dir`, creating the directory if needed.
pub async fn save_upload(
    dir: &Path,
    document_id: &DocumentId,
    filename: &str,
    bytes: &[u8],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(stored_file_name(document_id, filename));
    tokio::fs::write(&path, bytes).await?;
    tracing::debug!(path = %path.display(), size = bytes.len(), "Stored upload");
    Ok(path)
}

/// Remove a stored upload. A file that is already gone is not an error.
pub async fn remove_upload(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UploadConfig {
        UploadConfig::default()
    }

    #[test]
    fn test_accepts_allowed_types_case_insensitively() {
        assert_eq!(validate_upload("report.PDF", 10, &config()).unwrap(), "pdf");
        assert_eq!(validate_upload("notes.txt", 10, &config()).unwrap(), "txt");
    }

    #[test]
    fn test_rejects_unsupported_and_missing_extension() {
        let err = validate_upload("image.png", 10, &config()).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedType { ref extension, .. } if extension == "png"));
        assert_eq!(
            err.to_string(),
            "File type .png not allowed. Allowed types: pdf, txt"
        );
        assert!(validate_upload("README", 10, &config()).is_err());
    }

    #[test]
    fn test_rejects_missing_filename() {
        assert!(matches!(
            validate_upload("", 10, &config()),
            Err(IngestError::MissingFilename)
        ));
        assert!(matches!(
            validate_upload("dir/", 10, &config()),
            Err(IngestError::MissingFilename)
        ));
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let cfg = config();
        assert!(validate_upload("a.txt", cfg.max_file_size, &cfg).is_ok());
        let err = validate_upload("a.txt", cfg.max_file_size + 1, &cfg).unwrap_err();
        assert!(matches!(err, IngestError::TooLarge { .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_stored_file_name_strips_directories() {
        let id = DocumentId::new();
        assert_eq!(
            stored_file_name(&id, "../../etc/passwd.txt"),
            format!("{id}_passwd.txt")
        );
        assert_eq!(
            stored_file_name(&id, "C:\\Users\\me\\notes.txt"),
            format!("{id}_notes.txt")
        );
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"abc").len(), 64);
    }

    #[tokio::test]
    async fn test_save_and_remove_upload() {
        let dir = tempfile::tempdir().unwrap();
        let id = DocumentId::new();
        let path = save_upload(&dir.path().join("uploads"), &id, "a.txt", b"hello")
            .await
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");

        remove_upload(&path).await.unwrap();
        assert!(!path.exists());
        remove_upload(&path).await.unwrap();
    }
}
