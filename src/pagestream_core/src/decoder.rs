//! Page image loading.
//!
//! Pages are served as their original encoded bytes. JPEG headers are parsed
//! with zune-jpeg for dimensions; pixels are never decoded here.

use std::cmp::Ordering;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use zune_jpeg::JpegDecoder;

use crate::error::{PageError, PageResult};

/// Extensions recognised as page images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif"];

/// Encoded page image ready to hand to a renderer.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Raw file bytes.
    pub bytes: Bytes,
    pub mime: &'static str,
    /// Width in pixels, 0 if not probed.
    pub width: u32,
    /// Height in pixels, 0 if not probed.
    pub height: u32,
}

impl PageImage {
    /// Size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Check if `path` has one of the page image extensions.
pub fn is_image_file(path: &Path) -> bool {
    lowercase_extension(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type by extension. Unknown extensions are served as JPEG.
pub fn mime_type_for(path: &Path) -> &'static str {
    match lowercase_extension(path).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tiff") | Some("tif") => "image/tiff",
        _ => "image/jpeg",
    }
}

/// Natural order on file names: `page2` sorts before `page10`.
pub fn natural_cmp(a: &Path, b: &Path) -> Ordering {
    let name_a = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let name_b = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    natord::compare(&name_a, &name_b)
}

/// Parse JPEG headers for `(width, height)` without decoding pixels.
pub fn probe_jpeg_dimensions(data: &[u8]) -> PageResult<(u32, u32)> {
    let mut decoder = JpegDecoder::new(data);
    decoder
        .decode_headers()
        .map_err(|e| PageError::Decode(format!("Failed to parse JPEG header: {:?}", e)))?;

    let info = decoder
        .info()
        .ok_or_else(|| PageError::Decode("Failed to get image info from header".into()))?;

    Ok((info.width as u32, info.height as u32))
}

/// Read a page image file.
///
/// JPEG files must have a parseable header; other formats are passed
/// through with unknown (0x0) dimensions.
pub fn read_page_image(path: &Path) -> PageResult<PageImage> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let mime = mime_type_for(path);
    let (width, height) = if mime == "image/jpeg" {
        probe_jpeg_dimensions(&data)?
    } else {
        (0, 0)
    };

    Ok(PageImage {
        bytes: Bytes::from(data),
        mime,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a/001.jpg")));
        assert!(is_image_file(Path::new("cover.JPEG")));
        assert!(is_image_file(Path::new("scan.TIF")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("volume.cbz")));
        assert!(!is_image_file(Path::new("README")));
    }

    #[test]
    fn test_mime_mapping() {
        assert_eq!(mime_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_type_for(Path::new("a.tif")), "image/tiff");
        assert_eq!(mime_type_for(Path::new("a.unknown")), "image/jpeg");
    }

    #[test]
    fn test_natural_order() {
        let mut names: Vec<PathBuf> = ["page10.png", "page2.png", "page1.png", "cover.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        names.sort_by(|a, b| natural_cmp(a, b));
        let sorted: Vec<_> = names.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        assert_eq!(sorted, ["cover.png", "page1.png", "page2.png", "page10.png"]);
    }

    #[test]
    fn test_read_png_passthrough() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("01.png");
        fs::write(&path, b"\x89PNG fake body").unwrap();

        let image = read_page_image(&path).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.size_bytes(), 15);
        assert_eq!((image.width, image.height), (0, 0));
    }

    #[test]
    fn test_read_invalid_path() {
        let result = read_page_image(Path::new("/nonexistent/path.jpg"));
        assert!(matches!(result, Err(PageError::Io(_))));
    }

    #[test]
    fn test_read_invalid_jpeg() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fake.jpg");
        fs::write(&path, b"not a jpeg").unwrap();

        let result = read_page_image(&path);
        assert!(matches!(result, Err(PageError::Decode(_))));
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(probe_jpeg_dimensions(&[0u8; 64]).is_err());
    }
}
