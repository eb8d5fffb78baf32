//! Image metadata: embedded IPTC/EXIF, the remote extraction service and
//! the combination of both used when publishing attachments.

pub mod dates;
pub mod embedded;
mod iptc;
pub mod service;

pub use dates::normalize_date;
pub use embedded::{detect_mime_type, EmbeddedMetadataReader};
pub use service::MetadataServiceClient;

use crate::config::MetadataServiceConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

pub const IPTC_DIRECTORY: &str = "IPTC";
pub const EXIF_DIRECTORY: &str = "Exif IFD0";
const EXIF_SUB_DIRECTORY: &str = "Exif SubIFD";

/// Descriptive and technical values of one image, plus the raw tag
/// directories they were derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub byline: Option<String>,
    pub caption: Option<String>,
    pub description: Option<String>,
    pub headline: Option<String>,
    pub credit: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub copyright: Option<String>,
    pub location: Option<String>,
    pub date_created: Option<String>,
    pub tags: BTreeMap<String, BTreeMap<String, String>>,
}

impl ImageMetadata {
    /// Derives the descriptive fields from IPTC first, EXIF second.
    pub fn from_tags(
        width: Option<u32>,
        height: Option<u32>,
        tags: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Self {
        let iptc = |name: &str| {
            tags.get(IPTC_DIRECTORY)
                .and_then(|directory| directory.get(name))
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let exif = |names: &[&str]| {
            [EXIF_DIRECTORY, EXIF_SUB_DIRECTORY]
                .iter()
                .filter_map(|directory| tags.get(*directory))
                .flat_map(|directory| names.iter().filter_map(move |name| directory.get(*name)))
                .map(|value| value.trim())
                .find(|value| !value.is_empty())
                .map(str::to_string)
        };

        let image_description = exif(&["ImageDescription", "Image Description"]);
        let caption = iptc("Caption/Abstract").or_else(|| image_description.clone());
        let location = [
            iptc("Country/Primary Location Name"),
            iptc("Sub-location"),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(";");
        let date_created = iptc("Date Created")
            .or_else(|| exif(&["DateTimeOriginal", "Date/Time Original"]))
            .and_then(|date| normalize_date(&date));
        let byline = iptc("By-line").or_else(|| exif(&["Artist"]));
        let copyright = iptc("Copyright Notice").or_else(|| exif(&["Copyright"]));
        let headline = iptc("Headline");
        let credit = iptc("Credit");
        let keywords = iptc("Keywords");
        let category = iptc("Category");
        let source = iptc("Source");

        ImageMetadata {
            width,
            height,
            byline,
            description: caption.clone(),
            caption,
            headline,
            credit,
            keywords,
            category,
            source,
            copyright,
            location: if location.is_empty() {
                None
            } else {
                Some(location)
            },
            date_created,
            tags,
        }
    }

    /// Overlays every descriptive value present in `other`, and its tag
    /// directories. Dimensions are left alone.
    pub fn merge_descriptive(&mut self, other: ImageMetadata) {
        fn overlay(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }

        overlay(&mut self.byline, other.byline);
        overlay(&mut self.caption, other.caption);
        overlay(&mut self.description, other.description);
        overlay(&mut self.headline, other.headline);
        overlay(&mut self.credit, other.credit);
        overlay(&mut self.keywords, other.keywords);
        overlay(&mut self.category, other.category);
        overlay(&mut self.source, other.source);
        overlay(&mut self.copyright, other.copyright);
        overlay(&mut self.location, other.location);
        overlay(&mut self.date_created, other.date_created);
        self.tags.extend(other.tags);
    }
}

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, data: &[u8], mime_type: &str) -> Option<ImageMetadata>;
}

/// Embedded metadata, overridden by the extraction service when one is
/// configured. With a service, image dimensions only ever come from it.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadataExtraction {
    embedded: EmbeddedMetadataReader,
    service: Option<MetadataServiceClient>,
}

impl ImageMetadataExtraction {
    pub fn new(service: Option<MetadataServiceClient>) -> Self {
        Self {
            embedded: EmbeddedMetadataReader::new(),
            service,
        }
    }

    pub fn from_config(config: Option<&MetadataServiceConfig>) -> Result<Self, reqwest::Error> {
        let service = match config {
            Some(config) => {
                log::info!("Using image metadata service at {}", config.url);
                Some(MetadataServiceClient::from_config(config)?)
            }
            None => None,
        };
        Ok(Self::new(service))
    }
}

#[async_trait]
impl MetadataExtractor for ImageMetadataExtraction {
    async fn extract(&self, data: &[u8], mime_type: &str) -> Option<ImageMetadata> {
        let mut metadata = self.embedded.read(data);

        if let Some(service) = &self.service {
            match service.fetch(data, mime_type).await {
                Some(remote) => {
                    metadata.width = remote.width;
                    metadata.height = remote.height;
                    metadata.merge_descriptive(remote);
                }
                None => {
                    log::warn!("No metadata from the extraction service, dimensions unknown");
                    metadata.width = None;
                    metadata.height = None;
                }
            }
        }

        Some(metadata)
    }
}
