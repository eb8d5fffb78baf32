//! Content repository model and collaborator traits.

use crate::config::SYSTEM_PRINCIPAL;
use crate::error::RepositoryError;
use crate::fields::FieldValueBag;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const FILES_ASPECT: &str = "atex.Files";
pub const IMAGE_INFO_ASPECT: &str = "atex.Image";
pub const INSERTION_INFO_ASPECT: &str = "p.InsertionInfo";
pub const METADATA_INFO_ASPECT: &str = "atex.Metadata";
pub const PARTITION_DIMENSION: &str = "dimension.partition";
pub const SCHEME_TMP: &str = "tmp";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        ContentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The principal every write of a publish call is performed as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    pub principal_id: String,
}

impl Subject {
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
        }
    }
}

impl Default for Subject {
    fn default() -> Self {
        Subject::new(SYSTEM_PRINCIPAL)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReference {
    pub file_path: String,
    pub file_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimension {
    pub id: String,
    pub entities: Vec<Entity>,
}

impl Dimension {
    pub fn partition(partition: &str) -> Self {
        Dimension {
            id: PARTITION_DIMENSION.to_string(),
            entities: vec![Entity {
                id: partition.to_string(),
                name: partition.to_string(),
            }],
        }
    }
}

/// Secondary aspects attached to a content write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aspect {
    Files {
        files: BTreeMap<String, FileReference>,
    },
    ImageInfo {
        width: Option<i64>,
        height: Option<i64>,
        file_path: String,
    },
    InsertionInfo {
        security_parent: Option<ContentId>,
        insert_parent: Option<ContentId>,
    },
    MetadataInfo {
        taxonomy_ids: BTreeSet<String>,
        dimensions: Vec<Dimension>,
    },
}

impl Aspect {
    pub fn files(info: &FileInfo) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            info.original_path.clone(),
            FileReference {
                file_path: info.original_path.clone(),
                file_uri: info.uri.clone(),
            },
        );
        Aspect::Files { files }
    }

    /// Taxonomy metadata; the partition dimension is only added when a
    /// partition is configured.
    pub fn metadata_info(taxonomy_id: &str, partition: &str) -> Self {
        let mut taxonomy_ids = BTreeSet::new();
        taxonomy_ids.insert(taxonomy_id.to_string());
        let dimensions = if partition.is_empty() {
            Vec::new()
        } else {
            vec![Dimension::partition(partition)]
        };
        Aspect::MetadataInfo {
            taxonomy_ids,
            dimensions,
        }
    }
}

/// A create request: content type, main aspect values and secondary aspects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentWrite {
    pub content_type: String,
    pub main: FieldValueBag,
    pub aspects: BTreeMap<String, Aspect>,
}

impl ContentWrite {
    pub fn new(content_type: impl Into<String>, main: FieldValueBag) -> Self {
        Self {
            content_type: content_type.into(),
            main,
            aspects: BTreeMap::new(),
        }
    }

    pub fn with_aspect(mut self, name: &str, aspect: Aspect) -> Self {
        self.aspects.insert(name.to_string(), aspect);
        self
    }

    pub fn aspect(&self, name: &str) -> Option<&Aspect> {
        self.aspects.get(name)
    }

    /// Display name used in log messages.
    pub fn name(&self) -> String {
        self.main.get_text("name").unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WriteStatus {
    Ok,
    Created,
    Rejected { code: u16, message: String },
}

impl WriteStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, WriteStatus::Ok | WriteStatus::Created)
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStatus::Ok => f.write_str("OK"),
            WriteStatus::Created => f.write_str("CREATED"),
            WriteStatus::Rejected { code, message } => write!(f, "{} {}", code, message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentResult {
    pub status: WriteStatus,
    pub id: ContentId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    pub original_path: String,
    pub uri: String,
}

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Looks up the content id registered under an external id.
    async fn resolve(
        &self,
        external_id: &str,
        subject: &Subject,
    ) -> Result<Option<ContentId>, RepositoryError>;

    async fn create(
        &self,
        write: ContentWrite,
        subject: &Subject,
    ) -> Result<ContentResult, RepositoryError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload_file(
        &self,
        scheme: &str,
        parent: Option<&ContentId>,
        filename: &str,
        data: &[u8],
        mime_type: &str,
        subject: &Subject,
    ) -> Result<FileInfo, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_info_partition() {
        match Aspect::metadata_info("PolopolyPost.d", "") {
            Aspect::MetadataInfo {
                taxonomy_ids,
                dimensions,
            } => {
                assert!(taxonomy_ids.contains("PolopolyPost.d"));
                assert!(dimensions.is_empty());
            }
            other => panic!("unexpected aspect {:?}", other),
        }

        match Aspect::metadata_info("PolopolyPost.d", "print") {
            Aspect::MetadataInfo { dimensions, .. } => {
                assert_eq!(dimensions.len(), 1);
                assert_eq!(dimensions[0].id, "dimension.partition");
                assert_eq!(dimensions[0].entities[0].id, "print");
                assert_eq!(dimensions[0].entities[0].name, "print");
            }
            other => panic!("unexpected aspect {:?}", other),
        }
    }

    #[test]
    fn test_files_aspect() {
        let info = FileInfo {
            original_path: "photo.jpg".to_string(),
            uri: "tmp://1/photo.jpg".to_string(),
        };

        match Aspect::files(&info) {
            Aspect::Files { files } => {
                assert_eq!(files["photo.jpg"].file_uri, "tmp://1/photo.jpg");
            }
            other => panic!("unexpected aspect {:?}", other),
        }
    }

    #[test]
    fn test_default_subject() {
        assert_eq!(Subject::default().principal_id, "98");
        assert!(WriteStatus::Created.is_ok());
        assert!(!WriteStatus::Rejected {
            code: 500,
            message: "boom".to_string()
        }
        .is_ok());
    }
}
