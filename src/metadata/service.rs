use super::{ImageMetadata, MetadataExtractor};
use crate::config::MetadataServiceConfig;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceResponse {
    image_width: Option<u32>,
    image_height: Option<u32>,
    #[serde(default)]
    tags: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl ServiceResponse {
    fn into_metadata(self) -> ImageMetadata {
        let tags = self
            .tags
            .into_iter()
            .map(|(directory, values)| {
                let values = values
                    .into_iter()
                    .map(|(name, value)| {
                        let value = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (name, value)
                    })
                    .collect();
                (directory, values)
            })
            .collect();
        ImageMetadata::from_tags(self.image_width, self.image_height, tags)
    }
}

/// Client for the remote image metadata extraction service.
#[derive(Debug, Clone)]
pub struct MetadataServiceClient {
    client: Client,
    url: String,
}

impl MetadataServiceClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mail-importer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn from_config(config: &MetadataServiceConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.url, Duration::from_secs(config.timeout_seconds))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts the image and maps the JSON answer. Every failure is logged
    /// and reported as `None`.
    pub async fn fetch(&self, data: &[u8], mime_type: &str) -> Option<ImageMetadata> {
        log::debug!("Calling {} with mime type {}", self.url, mime_type);
        let started = Instant::now();

        let response = match self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, mime_type)
            .header(ACCEPT, "application/json")
            .body(data.to_vec())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::error!("Error calling image metadata service {}: {}", self.url, e);
                return None;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::error!("Cannot read image metadata service response: {}", e);
                return None;
            }
        };

        if !status.is_success() {
            log::error!("Image metadata service returned {}: {}", status, body);
            return None;
        }
        log::debug!(
            "Image metadata service answered in {}ms: {}",
            started.elapsed().as_millis(),
            body
        );

        match serde_json::from_str::<ServiceResponse>(&body) {
            Ok(parsed) => Some(parsed.into_metadata()),
            Err(e) => {
                log::error!("Cannot parse image metadata service response {}: {}", e, body);
                None
            }
        }
    }
}

#[async_trait]
impl MetadataExtractor for MetadataServiceClient {
    async fn extract(&self, data: &[u8], mime_type: &str) -> Option<ImageMetadata> {
        self.fetch(data, mime_type).await
    }
}
