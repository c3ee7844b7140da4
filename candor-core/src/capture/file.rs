//! File-backed capture sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{CameraSource, CaptureError, ImageRef, LocationSource, RawPosition};

/// "Camera" that reads an image file from disk, byte for byte.
#[derive(Debug, Clone)]
pub struct FileCamera {
    path: PathBuf,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CameraSource for FileCamera {
    async fn take_picture(&self) -> Result<ImageRef, CaptureError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            CaptureError::Camera(format!("Failed to read file {}: {e}", self.path.display()))
        })?;
        Ok(ImageRef::new(
            format!("file://{}", self.path.display()),
            bytes,
        ))
    }
}

/// Location source for devices without a sensor: permission is never granted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLocation;

#[async_trait]
impl LocationSource for NoLocation {
    async fn request_permission(&self) -> Result<bool, CaptureError> {
        Ok(false)
    }

    async fn current_position(&self) -> Result<RawPosition, CaptureError> {
        Err(CaptureError::Location("no location sensor".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ImageHash;

    #[tokio::test]
    async fn test_file_camera_reads_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"\xff\xd8\xff\xe0fake-jpeg").unwrap();

        let image = FileCamera::new(&path).take_picture().await.unwrap();
        assert_eq!(image.bytes(), b"\xff\xd8\xff\xe0fake-jpeg");
        assert!(image.uri().starts_with("file://"));
        assert_eq!(
            ImageHash::of(image.bytes()),
            ImageHash::of(b"\xff\xd8\xff\xe0fake-jpeg")
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_camera_error() {
        let result = FileCamera::new("/nonexistent/photo.jpg").take_picture().await;
        assert!(matches!(result, Err(CaptureError::Camera(_))));
    }
}
