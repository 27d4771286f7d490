use std::path::Path;

/// Extensions treated as images without looking at the content (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "heic", "heif", "raw", "cr2",
    "nef", "orf", "sr2", "ico",
];

/// Lowercased extension of `path`, empty when there is none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Whether the extension is in the recognised set (case-insensitive)
pub fn has_image_extension(path: &Path) -> bool {
    IMAGE_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Decide whether `path` is a genuine image.
///
/// Files with a recognised extension pass straight away; anything else is
/// sniffed and fully decoded, and only counts when decoding succeeds.
pub fn is_image(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    if has_image_extension(path) {
        return true;
    }

    let decoded = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.decode());

    match decoded {
        Ok(_) => true,
        Err(e) => {
            log::debug!("{} is not a decodable image: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_extension_allowlist_is_case_insensitive() {
        assert!(has_image_extension(Path::new("a/B/1234.JPG")));
        assert!(has_image_extension(Path::new("1234.Heic")));
        assert!(has_image_extension(Path::new("scan.tif")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("1234")));
    }

    #[test]
    fn test_known_extension_is_trusted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("4711.jpg");
        fs::write(&path, b"not really a jpeg").unwrap();
        assert!(is_image(&path));
    }

    #[test]
    fn test_unknown_extension_is_sniffed() {
        let temp_dir = TempDir::new().unwrap();

        let disguised = temp_dir.path().join("4711.dat");
        RgbImage::new(4, 4)
            .save_with_format(&disguised, ImageFormat::Png)
            .unwrap();
        assert!(is_image(&disguised));

        let text = temp_dir.path().join("readme.dat");
        fs::write(&text, "plain text").unwrap();
        assert!(!is_image(&text));
    }

    #[test]
    fn test_directories_and_missing_files_are_not_images() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("folder.jpg");
        fs::create_dir(&dir).unwrap();
        assert!(!is_image(&dir));
        assert!(!is_image(&temp_dir.path().join("missing.png")));
    }
}
