//! Image loading, sizing and persistence for image placeholders

use std::fs;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::package::Package;

/// English Metric Units per inch
pub const EMU_PER_INCH: u64 = 914_400;

/// Errors that can occur while loading an image
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed data URI: {0}")]
    DataUri(String),

    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unrecognized image format")]
    UnknownFormat,

    #[error("image header is truncated")]
    Truncated,
}

/// Supported raster formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
}

impl ImageKind {
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
            ImageKind::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Gif => "image/gif",
        }
    }
}

/// Decoded image bytes with their pixel size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
    pub width_px: u32,
    pub height_px: u32,
}

impl ImageData {
    /// Sniff format and pixel size from the file header
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
        let (kind, width_px, height_px) = sniff(&bytes)?;
        Ok(Self {
            bytes,
            kind,
            width_px,
            height_px,
        })
    }
}

/// Rendered size of an image in EMU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub cx: u64,
    pub cy: u64,
}

/// Pluggable image handling used by image placeholders
///
/// A strategy is passed explicitly with each generation call, so runs can use
/// different strategies side by side.
pub trait ImageStrategy: Send + Sync {
    /// Load image bytes from a resolved source string
    fn load(&self, source: &str) -> Result<ImageData, ImageError>;

    /// Size the image will be rendered at
    fn scale(&self, image: &ImageData) -> Extent;

    /// Store the image bytes in the package under `media_dir`, returning the
    /// new part name
    fn persist(&self, image: &ImageData, package: &mut Package, media_dir: &str) -> String {
        let mut index = 1;
        loop {
            let name = format!("{media_dir}/image{index}.{}", image.kind.extension());
            if !package.contains(&name) {
                package.set_part(&name, image.bytes.clone());
                return name;
            }
            index += 1;
        }
    }
}

/// Reads files or base64 `data:` URIs and caps the rendered width
#[derive(Debug, Clone)]
pub struct DefaultImageStrategy {
    /// Pixel density used to convert pixels to EMU
    pub dpi: u32,
    /// Widest rendered size; larger images shrink keeping their aspect ratio
    pub max_width_emu: u64,
}

impl Default for DefaultImageStrategy {
    fn default() -> Self {
        Self {
            dpi: 96,
            max_width_emu: 6 * EMU_PER_INCH,
        }
    }
}

impl DefaultImageStrategy {
    pub fn with_max_width_emu(mut self, max_width_emu: u64) -> Self {
        self.max_width_emu = max_width_emu;
        self
    }
}

impl ImageStrategy for DefaultImageStrategy {
    fn load(&self, source: &str) -> Result<ImageData, ImageError> {
        let bytes = match source.strip_prefix("data:") {
            Some(uri) => decode_data_uri(uri)?,
            None => fs::read(source).map_err(|source_err| ImageError::Io {
                path: source.to_string(),
                source: source_err,
            })?,
        };
        ImageData::from_bytes(bytes)
    }

    fn scale(&self, image: &ImageData) -> Extent {
        let emu_per_px = EMU_PER_INCH / u64::from(self.dpi.max(1));
        let cx = u64::from(image.width_px).saturating_mul(emu_per_px);
        let cy = u64::from(image.height_px).saturating_mul(emu_per_px);
        if cx <= self.max_width_emu || cx == 0 {
            return Extent { cx, cy };
        }
        // Header sizes are untrusted; the ratio is taken in 128 bits.
        let scaled = u128::from(cy) * u128::from(self.max_width_emu) / u128::from(cx);
        Extent {
            cx: self.max_width_emu,
            cy: u64::try_from(scaled).unwrap_or(u64::MAX),
        }
    }
}

fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ImageError> {
    let (meta, payload) = uri
        .split_once(',')
        .ok_or_else(|| ImageError::DataUri("missing ','".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(ImageError::DataUri(format!("unsupported encoding '{meta}'")));
    }
    Ok(BASE64_STANDARD.decode(payload.trim())?)
}

fn sniff(bytes: &[u8]) -> Result<(ImageKind, u32, u32), ImageError> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        let header = bytes.get(16..24).ok_or(ImageError::Truncated)?;
        let width = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let height = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        return Ok((ImageKind::Png, width, height));
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        let header = bytes.get(6..10).ok_or(ImageError::Truncated)?;
        let width = u16::from_le_bytes([header[0], header[1]]);
        let height = u16::from_le_bytes([header[2], header[3]]);
        return Ok((ImageKind::Gif, width.into(), height.into()));
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        let (width, height) = jpeg_size(bytes)?;
        return Ok((ImageKind::Jpeg, width, height));
    }
    Err(ImageError::UnknownFormat)
}

/// Walk JPEG segments up to the first start-of-frame marker
fn jpeg_size(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let mut i = 2;
    loop {
        while bytes.get(i) == Some(&0xFF) && bytes.get(i + 1) == Some(&0xFF) {
            i += 1;
        }
        let marker = match bytes.get(i..i + 2) {
            Some([0xFF, marker]) => *marker,
            _ => return Err(ImageError::Truncated),
        };
        if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            i += 2;
            continue;
        }
        let length = bytes.get(i + 2..i + 4).ok_or(ImageError::Truncated)?;
        let length = usize::from(u16::from_be_bytes([length[0], length[1]]));
        let is_frame = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let frame = bytes.get(i + 5..i + 9).ok_or(ImageError::Truncated)?;
            let height = u16::from_be_bytes([frame[0], frame[1]]);
            let width = u16::from_be_bytes([frame[2], frame[3]]);
            return Ok((width.into(), height.into()));
        }
        i += 2 + length;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A 1x1 PNG
    pub(crate) const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    #[test]
    fn test_sniff_png() {
        let image = ImageData::from_bytes(TINY_PNG.to_vec()).unwrap();
        assert_eq!(image.kind, ImageKind::Png);
        assert_eq!((image.width_px, image.height_px), (1, 1));
    }

    #[test]
    fn test_sniff_gif_and_jpeg() {
        let gif = b"GIF89a\x20\x00\x10\x00rest".to_vec();
        let image = ImageData::from_bytes(gif).unwrap();
        assert_eq!((image.kind, image.width_px, image.height_px), (ImageKind::Gif, 32, 16));

        let jpeg = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00,
            0x30, 0x00, 0x40, 0x01, 0x01, 0x11, 0x00,
        ];
        let image = ImageData::from_bytes(jpeg).unwrap();
        assert_eq!((image.kind, image.width_px, image.height_px), (ImageKind::Jpeg, 64, 48));
    }

    #[test]
    fn test_unknown_format() {
        assert!(matches!(
            ImageData::from_bytes(b"hello".to_vec()),
            Err(ImageError::UnknownFormat)
        ));
    }

    #[test]
    fn test_data_uri() {
        let uri = format!("data:image/png;base64,{}", BASE64_STANDARD.encode(TINY_PNG));
        let image = DefaultImageStrategy::default().load(&uri).unwrap();
        assert_eq!(image.bytes, TINY_PNG);
        assert!(matches!(
            DefaultImageStrategy::default().load("data:image/png,raw"),
            Err(ImageError::DataUri(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = DefaultImageStrategy::default()
            .load("/definitely/not/here.png")
            .unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));
    }

    #[test]
    fn test_scale_keeps_aspect_ratio() {
        let strategy = DefaultImageStrategy::default().with_max_width_emu(9525 * 100);
        let image = ImageData {
            bytes: Vec::new(),
            kind: ImageKind::Png,
            width_px: 200,
            height_px: 50,
        };
        assert_eq!(strategy.scale(&image), Extent { cx: 952_500, cy: 238_125 });

        let small = ImageData {
            width_px: 10,
            height_px: 20,
            ..image
        };
        assert_eq!(strategy.scale(&small), Extent { cx: 95_250, cy: 190_500 });
    }

    #[test]
    fn test_scale_huge_declared_size() {
        let strategy = DefaultImageStrategy::default();
        let image = ImageData {
            bytes: Vec::new(),
            kind: ImageKind::Png,
            width_px: u32::MAX,
            height_px: u32::MAX,
        };
        let extent = strategy.scale(&image);
        assert_eq!(extent, Extent { cx: strategy.max_width_emu, cy: strategy.max_width_emu });

        let tall = ImageData {
            width_px: 1,
            ..image
        };
        assert_eq!(strategy.scale(&tall).cx, 9525);
        assert_eq!(strategy.scale(&tall).cy, u64::from(u32::MAX) * 9525);
    }

    #[test]
    fn test_persist_picks_free_name() {
        let mut package = Package::new();
        package.set_part("word/media/image1.png", vec![1]);
        let image = ImageData::from_bytes(TINY_PNG.to_vec()).unwrap();
        let name = DefaultImageStrategy::default().persist(&image, &mut package, "word/media");
        assert_eq!(name, "word/media/image2.png");
        assert_eq!(package.part(&name), Some(TINY_PNG));
    }
}
