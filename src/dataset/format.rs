//! Image format detection from magic-number prefixes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Formats recognised by [`classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Bmp,
    Gif,
    Png,
    Tiff,
    Jpeg,
    Unknown,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Bmp => "bmp",
            ImageFormat::Gif => "gif",
            ImageFormat::Png => "png",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Unknown => "unknown",
        }
    }

    /// File extension used when persisting images of this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Tiff => "tif",
            other => other.as_str(),
        }
    }

    /// Only JPEG and PNG are decoded by the preprocessing stage
    pub fn is_accepted(&self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::Png)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest signature checked by [`classify`]
pub const MAX_SIGNATURE_LEN: usize = 4;

/// Signatures in priority order; the first match wins
const SIGNATURES: &[(&[u8], ImageFormat)] = &[
    (b"BM", ImageFormat::Bmp),
    (b"GIF", ImageFormat::Gif),
    (&[137, 80, 78, 71], ImageFormat::Png),
    (&[73, 73, 42], ImageFormat::Tiff),
    (&[77, 77, 42], ImageFormat::Tiff),
    (&[255, 216, 255, 224], ImageFormat::Jpeg),
    (&[255, 216, 255, 225], ImageFormat::Jpeg),
];

/// Classify raw bytes by their leading signature.
///
/// Inputs shorter than a signature simply fail to match it, so truncated or
/// empty buffers yield [`ImageFormat::Unknown`].
pub fn classify(bytes: &[u8]) -> ImageFormat {
    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, format)| *format)
        .unwrap_or(ImageFormat::Unknown)
}

/// True when the bytes look like JPEG or PNG
pub fn is_accepted(bytes: &[u8]) -> bool {
    classify(bytes).is_accepted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_inputs_are_unknown() {
        assert_eq!(classify(&[]), ImageFormat::Unknown);
        assert_eq!(classify(&[137]), ImageFormat::Unknown);
        assert_eq!(classify(&[137, 80, 78]), ImageFormat::Unknown);
        assert_eq!(classify(&[255, 216, 255]), ImageFormat::Unknown);
    }

    #[test]
    fn test_png_and_jpeg() {
        assert_eq!(classify(&[137, 80, 78, 71, 13, 10, 26, 10]), ImageFormat::Png);
        assert_eq!(classify(&[255, 216, 255, 224, 0, 16]), ImageFormat::Jpeg);
        assert_eq!(classify(&[255, 216, 255, 225, 0, 16]), ImageFormat::Jpeg);
        // Other APPn markers are not recognised
        assert_eq!(classify(&[255, 216, 255, 219, 0, 16]), ImageFormat::Unknown);
    }

    #[test]
    fn test_other_formats() {
        assert_eq!(classify(b"BM\x00\x00"), ImageFormat::Bmp);
        assert_eq!(classify(b"GIF89a"), ImageFormat::Gif);
        assert_eq!(classify(&[73, 73, 42, 0]), ImageFormat::Tiff);
        assert_eq!(classify(&[77, 77, 42]), ImageFormat::Tiff);
        assert_eq!(classify(b"hello world"), ImageFormat::Unknown);
    }

    #[test]
    fn test_is_accepted() {
        assert!(is_accepted(&[137, 80, 78, 71]));
        assert!(is_accepted(&[255, 216, 255, 224]));
        assert!(!is_accepted(b"GIF87a"));
        assert!(!is_accepted(b"BM"));
        assert!(!is_accepted(&[]));
    }

    #[test]
    fn test_extension() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Png.extension(), "png");
    }
}
