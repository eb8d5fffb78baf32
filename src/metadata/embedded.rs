use super::iptc;
use super::{ImageMetadata, MetadataExtractor, EXIF_DIRECTORY, IPTC_DIRECTORY};
use async_trait::async_trait;
use exif::{In, Tag, Value};
use std::collections::BTreeMap;
use std::io::Cursor;

/// Reads metadata straight out of the image bytes: IPTC records, EXIF
/// fields and the pixel dimensions of the decoded header.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedMetadataReader;

impl EmbeddedMetadataReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read(&self, data: &[u8]) -> ImageMetadata {
        let mut tags = BTreeMap::new();
        let mut exif_dimensions = None;

        match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
            Ok(exif) => {
                exif_dimensions = pixel_dimensions(&exif);
                let fields = exif_tags(&exif);
                if !fields.is_empty() {
                    tags.insert(EXIF_DIRECTORY.to_string(), fields);
                }
            }
            Err(e) => log::debug!("No EXIF data in image: {}", e),
        }

        let iptc = iptc::to_tags(&iptc::read_iptc(data));
        if !iptc.is_empty() {
            tags.insert(IPTC_DIRECTORY.to_string(), iptc);
        }

        let (width, height) = match image_dimensions(data).or(exif_dimensions) {
            Some((width, height)) => (Some(width), Some(height)),
            None => (None, None),
        };
        ImageMetadata::from_tags(width, height, tags)
    }
}

#[async_trait]
impl MetadataExtractor for EmbeddedMetadataReader {
    async fn extract(&self, data: &[u8], _mime_type: &str) -> Option<ImageMetadata> {
        Some(self.read(data))
    }
}

/// Sniffs the image format from its magic bytes.
pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .format()
        .map(|format| format.to_mime_type().to_string())
}

fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn pixel_dimensions(exif: &exif::Exif) -> Option<(u32, u32)> {
    let dimension = |tag| {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
    };
    Some((
        dimension(Tag::PixelXDimension)?,
        dimension(Tag::PixelYDimension)?,
    ))
}

fn exif_tags(exif: &exif::Exif) -> BTreeMap<String, String> {
    exif.fields()
        .filter(|field| field.ifd_num == In::PRIMARY)
        .filter_map(|field| {
            let value = match &field.value {
                Value::Ascii(values) => values
                    .first()
                    .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())?,
                _ => field.display_value().to_string(),
            };
            if value.is_empty() {
                None
            } else {
                Some((field.tag.to_string(), value))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::iptc::tests::app13_segment;
    use image::{DynamicImage, ImageFormat, RgbImage};

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    #[test]
    fn test_detect_mime_type() {
        assert_eq!(
            detect_mime_type(&encode(4, 3, ImageFormat::Png)).as_deref(),
            Some("image/png")
        );
        assert_eq!(
            detect_mime_type(&encode(4, 3, ImageFormat::Jpeg)).as_deref(),
            Some("image/jpeg")
        );
        assert_eq!(detect_mime_type(b"not an image"), None);
    }

    #[test]
    fn test_read_dimensions() {
        let metadata = EmbeddedMetadataReader::new().read(&encode(60, 45, ImageFormat::Png));
        assert_eq!(metadata.width, Some(60));
        assert_eq!(metadata.height, Some(45));
        assert_eq!(metadata.byline, None);
    }

    #[test]
    fn test_read_iptc_from_jpeg() {
        let jpeg = encode(16, 8, ImageFormat::Jpeg);
        let mut data = jpeg[..2].to_vec();
        data.extend_from_slice(&app13_segment(&[
            (80, "Atex"),
            (120, "OLYMPUS DIGITAL CAMERA"),
            (105, "Harbour"),
            (101, "Italy"),
            (92, "Genova"),
        ]));
        data.extend_from_slice(&jpeg[2..]);

        let metadata = EmbeddedMetadataReader::new().read(&data);
        assert_eq!(metadata.width, Some(16));
        assert_eq!(metadata.height, Some(8));
        assert_eq!(metadata.byline.as_deref(), Some("Atex"));
        assert_eq!(metadata.caption.as_deref(), Some("OLYMPUS DIGITAL CAMERA"));
        assert_eq!(metadata.description.as_deref(), Some("OLYMPUS DIGITAL CAMERA"));
        assert_eq!(metadata.headline.as_deref(), Some("Harbour"));
        assert_eq!(metadata.location.as_deref(), Some("Italy;Genova"));
        assert!(metadata.tags.contains_key(IPTC_DIRECTORY));
    }

    #[test]
    fn test_garbage_yields_empty_metadata() {
        let metadata = EmbeddedMetadataReader::new().read(b"garbage");
        assert_eq!(metadata, ImageMetadata::default());
    }
}
