use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::media::{detect_mime_type, gemini_supports_image_mime, normalize_image_mime_type};
use crate::state::ReferenceImage;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not an image")]
    NotAnImage { path: PathBuf },
    #[error("{path} has unsupported image type {mime_type}")]
    UnsupportedType { path: PathBuf, mime_type: String },
}

#[derive(Debug, Default)]
pub struct IntakeReport {
    pub accepted: Vec<ReferenceImage>,
    pub skipped: Vec<IntakeError>,
    /// Files left unread because the collection was already full.
    pub dropped: usize,
}

fn reference_id(path: &Path, modified: Option<std::time::SystemTime>) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let modified_ms = modified
        .map(|time| DateTime::<Utc>::from(time).timestamp_millis())
        .unwrap_or(0);
    format!("{name}-{modified_ms}")
}

pub async fn read_reference_image(path: &Path) -> Result<ReferenceImage, IntakeError> {
    let read_error = |source| IntakeError::Read {
        path: path.to_path_buf(),
        source,
    };
    let metadata = tokio::fs::metadata(path).await.map_err(read_error)?;
    let bytes = tokio::fs::read(path).await.map_err(read_error)?;

    let mime_type = detect_mime_type(&bytes)
        .map(|mime| normalize_image_mime_type(&mime))
        .filter(|mime| mime.starts_with("image/"))
        .ok_or_else(|| IntakeError::NotAnImage {
            path: path.to_path_buf(),
        })?;
    if !gemini_supports_image_mime(&mime_type) {
        return Err(IntakeError::UnsupportedType {
            path: path.to_path_buf(),
            mime_type,
        });
    }

    Ok(ReferenceImage {
        id: reference_id(path, metadata.modified().ok()),
        data: general_purpose::STANDARD.encode(&bytes),
        mime_type,
    })
}

/// Reads files in order until `capacity` images have been accepted. Unreadable
/// or non-image files are skipped without stopping the batch.
pub async fn load_reference_images(paths: &[PathBuf], capacity: usize) -> IntakeReport {
    let mut report = IntakeReport::default();

    for (index, path) in paths.iter().enumerate() {
        if report.accepted.len() >= capacity {
            report.dropped = paths.len() - index;
            debug!(
                "Reference image limit reached; dropping {} file(s)",
                report.dropped
            );
            break;
        }

        match read_reference_image(path).await {
            Ok(image) => {
                debug!(id = %image.id, mime = %image.mime_type, "Accepted reference image");
                report.accepted.push(image);
            }
            Err(err) => {
                warn!("Skipping reference file: {}", err);
                report.skipped.push(err);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";
    const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    fn write_files(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|index| {
                let path = dir.join(format!("ref-{index:02}.png"));
                std::fs::write(&path, PNG_BYTES).unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn reads_image_as_base64_with_detected_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.jpg");
        std::fs::write(&path, JPEG_BYTES).unwrap();

        let image = read_reference_image(&path).await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(
            general_purpose::STANDARD.decode(&image.data).unwrap(),
            JPEG_BYTES
        );
        assert!(image.id.starts_with("face.jpg-"));
    }

    #[tokio::test]
    async fn batch_is_truncated_to_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_files(dir.path(), 20);

        let report = load_reference_images(&paths, 15).await;
        assert_eq!(report.accepted.len(), 15);
        assert_eq!(report.dropped, 5);
        assert!(report.skipped.is_empty());
        assert!(report.accepted[0].id.starts_with("ref-00.png-"));
        assert!(report.accepted[14].id.starts_with("ref-14.png-"));
    }

    #[tokio::test]
    async fn bad_files_are_skipped_without_aborting_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_files(dir.path(), 2);
        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "not an image").unwrap();
        paths.insert(1, text);
        paths.insert(0, dir.path().join("missing.png"));

        let report = load_reference_images(&paths, 15).await;
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0], IntakeError::Read { .. }));
        assert!(matches!(report.skipped[1], IntakeError::NotAnImage { .. }));
    }

    #[tokio::test]
    async fn zero_capacity_accepts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_files(dir.path(), 3);
        let report = load_reference_images(&paths, 0).await;
        assert!(report.accepted.is_empty());
        assert_eq!(report.dropped, 3);
    }

    #[tokio::test]
    async fn gif_is_rejected_as_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anim.gif");
        std::fs::write(&path, b"GIF89a\x01\0\x01\0\0\0\0").unwrap();
        let err = read_reference_image(&path).await.unwrap_err();
        assert!(matches!(err, IntakeError::UnsupportedType { .. }));
    }
}
