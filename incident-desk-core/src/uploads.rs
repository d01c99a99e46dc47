//! Photo attachments
//!
//! Photos arrive buffered in memory with the rest of the form. They are
//! checked against the limits only after the request is authenticated, then
//! written as `<uuid>.<ext>` under the uploads directory and referenced from
//! reports by their public URL.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::UploadLimits;

/// URL prefix under which uploaded photos are served
pub const PUBLIC_PREFIX: &str = "/uploads/";

/// A photo received in a submission
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("at most {max} photos may be attached")]
    TooMany { max: usize },

    #[error("photo '{name}' exceeds {max} bytes")]
    TooLarge { name: String, max: usize },

    #[error("unsupported photo type '{content_type}'")]
    UnsupportedType { content_type: String },

    #[error("photo '{name}' is empty")]
    Empty { name: String },

    #[error("Failed to write photo {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File extension for an accepted image content type
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" | "image/heif" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

fn extension_from_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "webp" => Some("webp"),
        "heic" | "heif" => Some("heic"),
        "gif" => Some("gif"),
        _ => None,
    }
}

impl PhotoUpload {
    fn display_name(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| "photo".to_string())
    }

    /// Extension from the declared type, or the file name when the client
    /// sent a generic type
    pub fn extension(&self) -> Result<&'static str, UploadError> {
        let declared = self.content_type.as_deref().unwrap_or("application/octet-stream");
        if let Some(ext) = extension_for(declared) {
            return Ok(ext);
        }
        if declared.starts_with("application/octet-stream") {
            if let Some(ext) = self.file_name.as_deref().and_then(extension_from_name) {
                return Ok(ext);
            }
        }
        Err(UploadError::UnsupportedType {
            content_type: declared.to_string(),
        })
    }
}

/// Writes and removes photo files
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    limits: UploadLimits,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, limits: UploadLimits) -> Self {
        Self {
            dir: dir.into(),
            limits,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Check count, size and type of every photo without touching disk
    pub fn check(&self, photos: &[PhotoUpload]) -> Result<(), UploadError> {
        if photos.len() > self.limits.max_photos {
            return Err(UploadError::TooMany {
                max: self.limits.max_photos,
            });
        }
        for photo in photos {
            if photo.bytes.is_empty() {
                return Err(UploadError::Empty {
                    name: photo.display_name(),
                });
            }
            if photo.bytes.len() > self.limits.max_photo_bytes {
                return Err(UploadError::TooLarge {
                    name: photo.display_name(),
                    max: self.limits.max_photo_bytes,
                });
            }
            photo.extension()?;
        }
        Ok(())
    }

    /// Check and write every photo, returning their public URLs
    ///
    /// Either all photos are written or none are left behind.
    pub async fn save_all(&self, photos: &[PhotoUpload]) -> Result<Vec<String>, UploadError> {
        self.check(photos)?;
        if photos.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| UploadError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let mut urls = Vec::with_capacity(photos.len());
        for photo in photos {
            let name = format!("{}.{}", uuid::Uuid::new_v4(), photo.extension()?);
            let path = self.dir.join(&name);

            if let Err(source) = tokio::fs::write(&path, &photo.bytes).await {
                self.remove(&urls).await;
                return Err(UploadError::Io { path, source });
            }

            debug!("Saved photo {} ({} bytes)", name, photo.bytes.len());
            urls.push(format!("{PUBLIC_PREFIX}{name}"));
        }
        Ok(urls)
    }

    /// Map a public URL back to its file, refusing anything but a plain name
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(PUBLIC_PREFIX)?;
        let is_plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.starts_with('.');
        is_plain.then(|| self.dir.join(name))
    }

    /// Delete the files behind the given URLs, best effort
    pub async fn remove(&self, urls: &[String]) {
        for url in urls {
            let Some(path) = self.path_for_url(url) else {
                warn!("Refusing to remove photo outside the uploads directory: {}", url);
                continue;
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed photo {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove photo {}: {}", path.display(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn photo(content_type: &str, len: usize) -> PhotoUpload {
        PhotoUpload {
            file_name: Some("IMG_0001.jpg".to_string()),
            content_type: Some(content_type.to_string()),
            bytes: vec![0xFF; len],
        }
    }

    fn limits() -> UploadLimits {
        UploadLimits {
            max_photos: 2,
            max_photo_bytes: 16,
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("IMAGE/PNG; charset=binary"), Some("png"));
        assert_eq!(extension_for("image/heif"), Some("heic"));
        assert_eq!(extension_for("text/html"), None);
        assert_eq!(extension_for("image/svg+xml"), None);
    }

    #[test]
    fn test_octet_stream_falls_back_to_file_name() {
        assert_eq!(photo("application/octet-stream", 1).extension().unwrap(), "jpg");

        let svg = PhotoUpload {
            file_name: Some("evil.svg".to_string()),
            ..photo("application/octet-stream", 1)
        };
        assert!(matches!(
            svg.extension(),
            Err(UploadError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_check_limits() {
        let store = UploadStore::new("/unused", limits());

        assert!(store.check(&[]).is_ok());
        assert!(store.check(&[photo("image/jpeg", 16)]).is_ok());
        assert!(matches!(
            store.check(&[photo("image/jpeg", 17)]),
            Err(UploadError::TooLarge { max: 16, .. })
        ));
        assert!(matches!(
            store.check(&[photo("image/jpeg", 1), photo("image/png", 1), photo("image/png", 1)]),
            Err(UploadError::TooMany { max: 2 })
        ));
        assert!(matches!(
            store.check(&[photo("text/plain", 1)]),
            Err(UploadError::UnsupportedType { .. })
        ));
        assert!(matches!(
            store.check(&[photo("image/png", 0)]),
            Err(UploadError::Empty { .. })
        ));
    }

    #[test]
    fn test_path_for_url_refuses_traversal() {
        let store = UploadStore::new("/srv/uploads", limits());

        assert_eq!(
            store.path_for_url("/uploads/abc.jpg"),
            Some(PathBuf::from("/srv/uploads/abc.jpg"))
        );
        assert_eq!(store.path_for_url("/uploads/../secret"), None);
        assert_eq!(store.path_for_url("/uploads/.."), None);
        assert_eq!(store.path_for_url("/uploads/a\\b"), None);
        assert_eq!(store.path_for_url("/uploads/.hidden"), None);
        assert_eq!(store.path_for_url("/uploads/"), None);
        assert_eq!(store.path_for_url("/etc/passwd"), None);
    }

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"), limits());

        let urls = store
            .save_all(&[photo("image/jpeg", 4), photo("image/png", 8)])
            .await
            .unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].starts_with(PUBLIC_PREFIX) && urls[0].ends_with(".jpg"));
        assert!(urls[1].ends_with(".png"));

        let paths: Vec<PathBuf> = urls.iter().filter_map(|u| store.path_for_url(u)).collect();
        assert_eq!(std::fs::read(&paths[0]).unwrap().len(), 4);

        store.remove(&urls).await;
        assert!(paths.iter().all(|p| !p.exists()));

        // Removing twice is harmless
        store.remove(&urls).await;
    }

    #[tokio::test]
    async fn test_rejected_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        let store = UploadStore::new(&uploads, limits());

        let result = store
            .save_all(&[photo("image/jpeg", 4), photo("image/jpeg", 64)])
            .await;
        assert!(result.is_err());
        assert!(!uploads.exists());
    }
}
