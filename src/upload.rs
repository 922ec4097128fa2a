use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

pub const ALLOWED_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg"];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Unsupported file type. Use: {}", ALLOWED_TYPES.join(", "))]
    UnsupportedType,
    #[error("No file uploaded. Use the form field 'file'.")]
    MissingFile,
    #[error("Failed to read upload: {message}")]
    Multipart { status: u16, message: String },
    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    /// Match a declared content type against the accepted list.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, UploadError> {
        let essence = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match essence.as_str() {
            "image/png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            _ => Err(UploadError::UnsupportedType),
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Png => ".png",
            Self::Jpeg => ".jpg",
        }
    }
}

/// An uploaded image written to a uniquely named file in the upload
/// directory. The file is removed when this value is dropped, on every path.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    kind: ImageKind,
}

impl StagedUpload {
    pub fn stage(dir: &Path, kind: ImageKind, bytes: &[u8]) -> Result<Self, UploadError> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("menu-")
            .suffix(kind.suffix())
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        tracing::debug!(path = %file.path().display(), size = bytes.len(), "staged upload");
        Ok(Self { file, kind })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Remove the file now instead of waiting for drop. Removal failures
    /// are logged; an already-missing file is fine.
    pub fn discard(self) {
        let path = self.to_path_buf();
        if let Err(e) = self.file.close() {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staged upload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_allowed_types() {
        assert_eq!(ImageKind::from_content_type(Some("image/png")).unwrap(), ImageKind::Png);
        assert_eq!(ImageKind::from_content_type(Some("image/jpeg")).unwrap(), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_content_type(Some("image/jpg")).unwrap(), ImageKind::Jpeg);
        assert_eq!(
            ImageKind::from_content_type(Some("Image/PNG; charset=binary")).unwrap(),
            ImageKind::Png
        );
    }

    #[test]
    fn test_rejects_other_types_with_accepted_list() {
        for ct in [Some("image/gif"), Some("application/pdf"), Some("text/plain"), None] {
            let err = ImageKind::from_content_type(ct).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Unsupported file type. Use: image/png, image/jpeg, image/jpg"
            );
        }
    }

    #[test]
    fn test_staged_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("uploads");

        let staged = StagedUpload::stage(&uploads, ImageKind::Jpeg, b"jpegbytes").unwrap();
        let path = staged.to_path_buf();
        assert!(path.starts_with(&uploads));
        assert_eq!(path.extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegbytes");

        drop(staged);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 0);
    }

    #[test]
    fn test_discard_tolerates_already_removed_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::stage(dir.path(), ImageKind::Png, b"png").unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        staged.discard();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_each_upload_gets_unique_path() {
        let dir = tempfile::tempdir().unwrap();
        let a = StagedUpload::stage(dir.path(), ImageKind::Png, b"a").unwrap();
        let b = StagedUpload::stage(dir.path(), ImageKind::Png, b"b").unwrap();
        assert_ne!(a.path(), b.path());
    }
}
