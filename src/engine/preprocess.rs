//! Image preprocessing: decode, grayscale, resize and tensor conversion

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::Array4;

use crate::dataset::{classify, ImageFormat, ImageSource};
use crate::error::{ClassifyError, Result};

/// Decoded pixels with their dimensions.
///
/// Pixels are row-major and interleaved: `pixels.len() == width * height * channels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    /// Build a buffer, checking that the declared shape matches the pixel count
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if !matches!(channels, 1 | 3) || pixels.len() != expected {
            return Err(ClassifyError::InvalidImage {
                width,
                height,
                channels,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32, u8) {
        (self.width, self.height, self.channels)
    }

    /// Single-channel luminance copy.
    ///
    /// Uses the Rec. 601 weights in integer arithmetic. Grayscale input is
    /// returned unchanged, so repeated application is a no-op.
    pub fn to_grayscale(&self) -> PixelBuffer {
        if self.channels == 1 {
            return self.clone();
        }

        let pixels = self
            .pixels
            .chunks_exact(3)
            .map(|p| {
                let (r, g, b) = (p[0] as u32, p[1] as u32, p[2] as u32);
                ((299 * r + 587 * g + 114 * b + 500) / 1000) as u8
            })
            .collect();

        PixelBuffer {
            width: self.width,
            height: self.height,
            channels: 1,
            pixels,
        }
    }

    /// Resize to exactly `width` x `height`
    pub fn resize(&self, width: u32, height: u32) -> Result<PixelBuffer> {
        if width == 0 || height == 0 {
            return Err(ClassifyError::InvalidInput(format!(
                "cannot resize to {}x{}",
                width, height
            )));
        }
        if (width, height) == (self.width, self.height) {
            return Ok(self.clone());
        }

        let invalid = || ClassifyError::InvalidImage {
            width: self.width,
            height: self.height,
            channels: self.channels,
            actual: self.pixels.len(),
        };

        let pixels = match self.channels {
            1 => {
                let img = GrayImage::from_raw(self.width, self.height, self.pixels.clone())
                    .ok_or_else(invalid)?;
                imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
            }
            _ => {
                let img = RgbImage::from_raw(self.width, self.height, self.pixels.clone())
                    .ok_or_else(invalid)?;
                imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
            }
        };

        PixelBuffer::new(width, height, self.channels, pixels)
    }

    /// Convert to an NCHW tensor normalised to [0, 1]
    pub fn to_nchw(&self) -> Array4<f32> {
        let (w, h, c) = (
            self.width as usize,
            self.height as usize,
            self.channels as usize,
        );
        let mut tensor = Array4::<f32>::zeros((1, c, h, w));

        for y in 0..h {
            for x in 0..w {
                let base = (y * w + x) * c;
                for ch in 0..c {
                    tensor[[0, ch, y, x]] = self.pixels[base + ch] as f32 / 255.0;
                }
            }
        }

        tensor
    }

    /// Flat feature vector in [0, 1], in pixel order
    pub fn to_features(&self) -> Vec<f32> {
        self.pixels.iter().map(|&p| p as f32 / 255.0).collect()
    }
}

/// Decode JPEG or PNG bytes into an RGB buffer.
///
/// Other formats are rejected before any decoding work happens.
pub fn decode(data: &[u8]) -> Result<PixelBuffer> {
    if data.is_empty() {
        return Err(ClassifyError::EmptyPayload);
    }
    let format = classify(data);
    if !format.is_accepted() {
        return Err(ClassifyError::UnsupportedFormat(format));
    }

    let image = decode_image(data, format)?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    PixelBuffer::new(width, height, 3, rgb.into_raw())
}

/// Decode an accepted image; JPEG pixels are rotated to their EXIF orientation
fn decode_image(data: &[u8], format: ImageFormat) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)?;

    if format == ImageFormat::Jpeg {
        Ok(apply_exif_orientation(data, image))
    } else {
        Ok(image)
    }
}

/// Rotate or flip according to the EXIF orientation tag, if present
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    };

    // See: https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Brings raw images to the shape a model expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    pub width: u32,
    pub height: u32,
    pub grayscale: bool,
}

impl Preprocessor {
    pub fn new(width: u32, height: u32, grayscale: bool) -> Self {
        Self {
            width,
            height,
            grayscale,
        }
    }

    /// Channel count of prepared buffers
    pub fn channels(&self) -> u8 {
        if self.grayscale {
            1
        } else {
            3
        }
    }

    /// Decode, optionally reduce to grayscale, and resize
    pub fn prepare(&self, data: &[u8]) -> Result<PixelBuffer> {
        let decoded = decode(data)?;
        let reduced = if self.grayscale {
            decoded.to_grayscale()
        } else {
            decoded
        };
        reduced.resize(self.width, self.height)
    }

    /// Resolve the source to bytes, then [`prepare`](Self::prepare)
    pub fn prepare_source(&self, source: &ImageSource) -> Result<PixelBuffer> {
        let bytes = source.resolve()?;
        self.prepare(&bytes)
    }
}
