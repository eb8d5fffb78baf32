//! Turns a parsed mail into image and article content.

use crate::cms::{
    Aspect, ContentId, ContentRepository, ContentWrite, FileStore, Subject, FILES_ASPECT,
    IMAGE_INFO_ASPECT, INSERTION_INFO_ASPECT, METADATA_INFO_ASPECT, SCHEME_TMP,
};
use crate::config::RouteConfig;
use crate::error::{PublishError, RepositoryError};
use crate::fields::{populate, BeanRegistry, FieldValue, FieldValueBag};
use crate::mail::{Attachment, MailRecord};
use crate::metadata::{detect_mime_type, ImageMetadata, MetadataExtractor};
use crate::name_pattern;
use crate::text::word_count;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ids created by one publish call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishOutcome {
    /// `None` when the article was held back by the word count gate.
    pub article: Option<ContentId>,
    /// Image ids, most recently created first.
    pub images: Vec<ContentId>,
}

impl PublishOutcome {
    /// Every created id: images first, then the article.
    pub fn ids(&self) -> Vec<ContentId> {
        self.images
            .iter()
            .cloned()
            .chain(self.article.clone())
            .collect()
    }
}

/// State of a single publish call.
struct PublishContext<'a> {
    route: &'a RouteConfig,
    subject: Subject,
    security_parent: Option<ContentId>,
    insert_parent: Option<ContentId>,
}

impl PublishContext<'_> {
    fn insertion_info(&self) -> Aspect {
        Aspect::InsertionInfo {
            security_parent: self.security_parent.clone(),
            insert_parent: self.insert_parent.clone(),
        }
    }
}

pub struct ContentPublisher {
    repository: Arc<dyn ContentRepository>,
    files: Arc<dyn FileStore>,
    metadata: Arc<dyn MetadataExtractor>,
    registry: BeanRegistry,
}

impl ContentPublisher {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        files: Arc<dyn FileStore>,
        metadata: Arc<dyn MetadataExtractor>,
    ) -> Self {
        Self {
            repository,
            files,
            metadata,
            registry: BeanRegistry::new(),
        }
    }

    pub fn with_registry(mut self, registry: BeanRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Creates one image per accepted attachment and then the article
    /// referencing them. Images already written are kept when the article
    /// is held back or a later write fails.
    pub async fn publish(
        &self,
        mail: &MailRecord,
        route: Option<&RouteConfig>,
    ) -> Result<PublishOutcome, PublishError> {
        let route = route.ok_or(PublishError::MissingRoute)?;
        let context = self.context(route).await?;
        log::info!(
            "Publishing mail '{}' from {} on {} as principal {}",
            mail.subject,
            mail.from,
            route,
            context.subject.principal_id
        );

        let aspect = route.article_aspect.as_str();
        let mut article = populate(&self.registry, &article_values(mail, route), route, aspect)?;

        let mut images = Vec::new();
        for (filename, attachment) in mail.attachments.iter() {
            if !route.is_accepted_image(filename) {
                log::debug!("Attachment {} is not an accepted image, ignoring it", filename);
                continue;
            }
            let id = self.create_image(&context, mail, filename, attachment).await?;
            images.insert(0, id);
        }

        if route.min_words >= 0 {
            let body = article
                .get_field(route.mapped_field(aspect, "body"))
                .and_then(FieldValue::as_text)
                .unwrap_or_default();
            let words = word_count(&body);
            if (words as i64) < route.min_words {
                log::warn!(
                    "Article '{}' has {} words, {} requires at least {}: not publishing it",
                    mail.subject,
                    words,
                    route,
                    route.min_words
                );
                return Ok(PublishOutcome {
                    article: None,
                    images,
                });
            }
        }

        if let Err(e) = article.set_field("images", FieldValue::ContentIds(images.clone())) {
            log::warn!("Cannot attach images to {}: {}", aspect, e);
        }

        let write = ContentWrite::new(aspect, article.values().clone())
            .with_aspect(
                METADATA_INFO_ASPECT,
                Aspect::metadata_info(&route.taxonomy_id, &route.article_partition),
            )
            .with_aspect(INSERTION_INFO_ASPECT, context.insertion_info());
        let id = self.write(&context, write).await?;
        log::info!("Inserted article '{}' with content id {}", mail.subject, id);

        Ok(PublishOutcome {
            article: Some(id),
            images,
        })
    }

    async fn context<'a>(&self, route: &'a RouteConfig) -> Result<PublishContext<'a>, PublishError> {
        let subject = if route.principal_id.is_empty() {
            Subject::default()
        } else {
            Subject::new(route.principal_id.as_str())
        };
        let security_parent = self.resolve(route.desk_level.as_deref(), &subject).await?;
        let insert_parent = self.resolve(route.web_page.as_deref(), &subject).await?;

        Ok(PublishContext {
            route,
            subject,
            security_parent,
            insert_parent,
        })
    }

    async fn resolve(
        &self,
        external_id: Option<&str>,
        subject: &Subject,
    ) -> Result<Option<ContentId>, RepositoryError> {
        let Some(external_id) = external_id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };

        let id = self.repository.resolve(external_id, subject).await?;
        if id.is_none() {
            log::warn!("Cannot resolve external id '{}'", external_id);
        }
        Ok(id)
    }

    async fn create_image(
        &self,
        context: &PublishContext<'_>,
        mail: &MailRecord,
        filename: &str,
        attachment: &Attachment,
    ) -> Result<ContentId, PublishError> {
        let route = context.route;
        let mime_type = detect_mime_type(&attachment.content)
            .unwrap_or_else(|| attachment.content_type.clone());

        let metadata = self
            .metadata
            .extract(&attachment.content, &mime_type)
            .await
            .unwrap_or_default();
        let info = self
            .files
            .upload_file(
                SCHEME_TMP,
                None,
                filename,
                &attachment.content,
                &mime_type,
                &context.subject,
            )
            .await?;
        log::debug!("Uploaded {} ({}) to {}", filename, mime_type, info.uri);

        let values = image_values(mail, route, filename, &metadata);
        let bean = populate(&self.registry, &values, route, &route.image_aspect)?;

        let write = ContentWrite::new(route.image_aspect.as_str(), bean.values().clone())
            .with_aspect(FILES_ASPECT, Aspect::files(&info))
            .with_aspect(
                IMAGE_INFO_ASPECT,
                Aspect::ImageInfo {
                    width: metadata.width.map(i64::from),
                    height: metadata.height.map(i64::from),
                    file_path: info.original_path.clone(),
                },
            )
            .with_aspect(INSERTION_INFO_ASPECT, context.insertion_info())
            .with_aspect(
                METADATA_INFO_ASPECT,
                Aspect::metadata_info(&route.taxonomy_id, &route.image_partition),
            );
        let id = self.write(context, write).await?;
        log::info!("Inserted image {} with content id {}", filename, id);
        Ok(id)
    }

    async fn write(
        &self,
        context: &PublishContext<'_>,
        write: ContentWrite,
    ) -> Result<ContentId, PublishError> {
        let name = write.name();
        let content_type = write.content_type.clone();

        let result = self.repository.create(write, &context.subject).await?;
        if !result.status.is_ok() {
            log::error!(
                "Error importing {} '{}' on {}: {}",
                content_type,
                name,
                context.route,
                result.status
            );
            return Err(PublishError::WriteRejected {
                name,
                status: result.status.to_string(),
            });
        }
        Ok(result.id)
    }
}

fn article_values(mail: &MailRecord, route: &RouteConfig) -> FieldValueBag {
    let mut values = FieldValueBag::new();
    if !route.article_name_pattern.is_empty() {
        let name = name_pattern::expand(&route.article_name_pattern, mail, &BTreeMap::new());
        values.insert("name", FieldValue::text(name));
    }
    values.insert("body", FieldValue::text(mail.body.as_str()));
    values.insert("headline", FieldValue::text(mail.subject.as_str()));
    values.insert("lead", FieldValue::text(mail.lead.as_str()));
    values.insert_text("section", route.section.as_deref());
    values.insert_text("source", route.source.as_deref());
    values
}

fn image_values(
    mail: &MailRecord,
    route: &RouteConfig,
    filename: &str,
    metadata: &ImageMetadata,
) -> FieldValueBag {
    let section = route.section.clone().or_else(|| metadata.category.clone());
    let source = route.source.clone().or_else(|| metadata.source.clone());

    let mut extra = BTreeMap::new();
    extra.insert("filename".to_string(), filename.to_string());
    let named = [
        ("width", metadata.width.map(|w| w.to_string())),
        ("height", metadata.height.map(|h| h.to_string())),
        ("description", metadata.description.clone()),
        ("section", section.clone()),
        ("byline", metadata.byline.clone()),
    ];
    for (key, value) in named {
        if let Some(value) = value {
            extra.insert(key.to_string(), value);
        }
    }

    let mut values = FieldValueBag::new();
    let name = name_pattern::expand(&route.attachment_name_pattern, mail, &extra);
    values.insert("name", FieldValue::text(name));
    values.insert_text("byline", metadata.byline.as_deref());
    values.insert_text("description", metadata.description.as_deref());
    values.insert_text("caption", metadata.caption.as_deref());
    values.insert_text("headline", metadata.headline.as_deref());
    values.insert_text("credit", metadata.credit.as_deref());
    values.insert_text("keywords", metadata.keywords.as_deref());
    values.insert_text("copyright", metadata.copyright.as_deref());
    values.insert_text("location", metadata.location.as_deref());
    values.insert_text("dateCreated", metadata.date_created.as_deref());
    values.insert_text("section", section.as_deref());
    values.insert_text("source", source.as_deref());
    if let Some(width) = metadata.width {
        values.insert("width", FieldValue::Integer(i64::from(width)));
    }
    if let Some(height) = metadata.height {
        values.insert("height", FieldValue::Integer(i64::from(height)));
    }
    values
}
