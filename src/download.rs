use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::llm::media::extension_for_mime;
use crate::state::GeneratedImage;

const FILE_NAME_PROMPT_CHARS: usize = 40;

static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[^a-z0-9]").expect("valid file name regex"));

pub fn download_file_name(image: &GeneratedImage) -> String {
    let prefix: String = image.prompt.chars().take(FILE_NAME_PROMPT_CHARS).collect();
    let stem = UNSAFE_FILE_CHARS.replace_all(&prefix, "_").to_lowercase();
    format!("{stem}_{}.{}", image.id, extension_for_mime(&image.mime_type))
}

pub async fn save_generated_image(image: &GeneratedImage, dir: &Path) -> Result<PathBuf> {
    let bytes = general_purpose::STANDARD
        .decode(image.data.trim())
        .with_context(|| format!("Image {} has invalid base64 data", image.id))?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(download_file_name(image));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(id = %image.id, path = %path.display(), bytes = bytes.len(), "Saved generated image");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(prompt: &str, mime_type: &str) -> GeneratedImage {
        GeneratedImage {
            id: "test-1700000000000".to_string(),
            data: general_purpose::STANDARD.encode(b"image-bytes"),
            mime_type: mime_type.to_string(),
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn file_name_sanitizes_and_truncates_the_prompt() {
        let image = generated(
            "A photo of Kael92 sitting in a cafe, golden hour light!",
            "image/png",
        );
        assert_eq!(
            download_file_name(&image),
            "a_photo_of_kael92_sitting_in_a_cafe__gol_test-1700000000000.png"
        );
    }

    #[test]
    fn extension_follows_the_media_type() {
        assert!(download_file_name(&generated("x", "image/jpeg")).ends_with(".jpg"));
        assert!(download_file_name(&generated("x", "image/webp")).ends_with(".webp"));
        assert!(download_file_name(&generated("x", "application/octet-stream")).ends_with(".png"));
    }

    #[test]
    fn non_ascii_characters_become_single_underscores() {
        let image = generated("Café über", "image/png");
        assert_eq!(download_file_name(&image), "caf___ber_test-1700000000000.png");
    }

    #[tokio::test]
    async fn saves_decoded_bytes_into_a_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let image = generated("kael92", "image/png");

        let path = save_generated_image(&image, &target).await.unwrap();
        assert_eq!(path, target.join("kael92_test-1700000000000.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"image-bytes");
    }

    #[tokio::test]
    async fn invalid_base64_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = generated("kael92", "image/png");
        image.data = "not base64!!".to_string();
        assert!(save_generated_image(&image, dir.path()).await.is_err());
    }
}
