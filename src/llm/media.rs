pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heix" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
            if brand == b"mif1" || brand == b"heif" {
                return Some("image/heif".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

/// Image types the Gemini API accepts as inline data.
pub fn gemini_supports_image_mime(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/heif"
    )
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match normalize_image_mime_type(mime_type).as_str() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/heif" => "heif",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn detects_png_and_jpeg_from_magic_bytes() {
        assert_eq!(detect_mime_type(PNG_HEADER).as_deref(), Some("image/png"));
        assert_eq!(
            detect_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10]).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(detect_mime_type(b"just some text"), None);
    }

    #[test]
    fn detects_heic_brand() {
        let mut data = vec![0, 0, 0, 0x18];
        data.extend_from_slice(b"ftypheic");
        data.extend_from_slice(&[0; 8]);
        assert_eq!(detect_mime_type(&data).as_deref(), Some("image/heic"));
    }

    #[test]
    fn normalizes_aliases_before_support_check() {
        let normalized = normalize_image_mime_type("Image/JPG");
        assert_eq!(normalized, "image/jpeg");
        assert!(gemini_supports_image_mime(&normalized));
        assert!(!gemini_supports_image_mime("image/gif"));
    }

    #[test]
    fn picks_file_extensions() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }
}
