//! Image payloads and file selection.
//!
use std::path::Path;

use bytes::Bytes;
use image::ImageFormat;

use crate::sensors::CaptureError;

/// Encoded image bytes ready for submission.
#[derive(Clone, Debug)]
pub struct ImagePayload {
    bytes: Bytes,
    mime: String,
    file_name: String,
}

impl ImagePayload {
    pub fn new(
        bytes: impl Into<Bytes>,
        mime: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            mime: mime.into(),
            file_name: file_name.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn into_parts(self) -> (Bytes, String, String) {
        (self.bytes, self.mime, self.file_name)
    }
}

/// A file chosen for submission together with a reference to preview it.
#[derive(Clone, Debug)]
pub struct SelectedFile {
    pub payload: ImagePayload,
    /// `file://` URL of the selected file.
    pub preview: String,
}

/// Wrap a local image file as a payload.
pub async fn select_file(path: impl AsRef<Path>) -> Result<SelectedFile, CaptureError> {
    let path = tokio::fs::canonicalize(path.as_ref()).await?;
    let bytes = tokio::fs::read(&path).await?;

    let mime = image::guess_format(&bytes)
        .ok()
        .and_then(mime_for_format)
        .or_else(|| mime_for_extension(&path))
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} is not an image", path.display()),
            )
        })?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_owned();

    log::info!(
        "Selected {} ({}, {} bytes)",
        path.display(),
        mime,
        bytes.len()
    );

    Ok(SelectedFile {
        payload: ImagePayload::new(bytes, mime, file_name),
        preview: format!("file://{}", path.display()),
    })
}

fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Tiff => Some("image/tiff"),
        _ => None,
    }
}

fn mime_for_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

#[cfg(test)]
mod test {

    use tempfile::tempdir;

    use super::*;
    use crate::Error;

    #[tokio::test]
    async fn select_png_file() -> Result<(), Error> {
        let dir = tempdir()?;
        let path = dir.path().join("forest.png");
        image::RgbImage::new(4, 4).save(&path)?;

        let selected = select_file(&path).await?;
        assert_eq!(selected.payload.mime(), "image/png");
        assert_eq!(selected.payload.file_name(), "forest.png");
        assert!(selected.preview.starts_with("file://"));
        assert!(selected.preview.ends_with("forest.png"));
        assert_eq!(selected.payload.bytes(), &std::fs::read(&path)?[..]);

        Ok(())
    }

    #[tokio::test]
    async fn content_wins_over_extension() -> Result<(), Error> {
        let dir = tempdir()?;
        let path = dir.path().join("frame.dat");
        image::RgbImage::new(4, 4).save_with_format(&path, ImageFormat::Png)?;

        let selected = select_file(&path).await?;
        assert_eq!(selected.payload.mime(), "image/png");

        Ok(())
    }

    #[tokio::test]
    async fn reject_non_image() -> Result<(), Error> {
        let dir = tempdir()?;
        for name in ["notes.txt", "blob.dat"] {
            let path = dir.path().join(name);
            std::fs::write(&path, "no pixels here")?;

            let selected = select_file(&path).await;
            assert!(matches!(selected, Err(CaptureError::File(_))), "{name}");
        }

        Ok(())
    }

    #[tokio::test]
    async fn missing_file_fails() -> Result<(), Error> {
        let dir = tempdir()?;

        let selected = select_file(dir.path().join("missing.jpg")).await;
        assert!(matches!(selected, Err(CaptureError::File(_))));

        Ok(())
    }
}
