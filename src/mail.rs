use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::ops::Index;

/// A parsed e-mail, ready to be published.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MailRecord {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub lead: String,
    pub body: String,
    pub attachments: Attachments,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub content_type: String,
    #[serde(serialize_with = "serialize_base64")]
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            content,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image")
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Attachments by filename, in the order they appear in the message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    entries: Vec<(String, Attachment)>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repeated filename replaces the earlier attachment in place.
    pub fn insert(&mut self, filename: impl Into<String>, attachment: Attachment) {
        let filename = filename.into();
        match self.entries.iter_mut().find(|(name, _)| *name == filename) {
            Some(entry) => entry.1 = attachment,
            None => self.entries.push((filename, attachment)),
        }
    }

    pub fn get(&self, filename: &str) -> Option<&Attachment> {
        self.entries
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, attachment)| attachment)
    }

    pub fn contains_key(&self, filename: &str) -> bool {
        self.get(filename).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attachment)> {
        self.entries
            .iter()
            .map(|(name, attachment)| (name.as_str(), attachment))
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Index<&str> for Attachments {
    type Output = Attachment;

    fn index(&self, filename: &str) -> &Attachment {
        match self.get(filename) {
            Some(attachment) => attachment,
            None => panic!("no attachment named {filename}"),
        }
    }
}

impl Serialize for Attachments {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, attachment) in &self.entries {
            map.serialize_entry(name, attachment)?;
        }
        map.end()
    }
}

impl MailRecord {
    /// Looks up a record property by the name used in name patterns.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "subject" => Some(&self.subject),
            "from" => Some(&self.from),
            "to" => Some(&self.to),
            "lead" => Some(&self.lead),
            "body" => Some(&self.body),
            _ => None,
        }
    }
}

fn serialize_base64<S>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use base64::{engine::general_purpose, Engine as _};
    serializer.serialize_str(&general_purpose::STANDARD.encode(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup() {
        let mail = MailRecord {
            subject: "S".to_string(),
            from: "f@x.com".to_string(),
            ..Default::default()
        };

        assert_eq!(mail.field("subject"), Some("S"));
        assert_eq!(mail.field("from"), Some("f@x.com"));
        assert_eq!(mail.field("lead"), Some(""));
        assert_eq!(mail.field("filename"), None);
    }

    #[test]
    fn test_attachment_serializes_as_base64() {
        let attachment = Attachment::new("image/png", vec![1, 2, 3]);
        let json = serde_json::to_value(&attachment).unwrap();

        assert_eq!(json["content_type"], "image/png");
        assert_eq!(json["content"], "AQID");
        assert!(attachment.is_image());
    }

    #[test]
    fn test_attachments_keep_message_order() {
        let mut attachments = Attachments::new();
        attachments.insert("zeta.jpg", Attachment::new("image/jpeg", vec![1]));
        attachments.insert("alpha.jpg", Attachment::new("image/jpeg", vec![2]));
        attachments.insert("zeta.jpg", Attachment::new("image/jpeg", vec![3]));

        assert_eq!(attachments.len(), 2);
        assert_eq!(
            attachments.filenames().collect::<Vec<_>>(),
            vec!["zeta.jpg", "alpha.jpg"]
        );
        assert_eq!(attachments["zeta.jpg"].content, vec![3]);
        assert!(!attachments.contains_key("beta.jpg"));

        let json = serde_json::to_string(&attachments).unwrap();
        assert!(json.find("zeta.jpg").unwrap() < json.find("alpha.jpg").unwrap());
    }
}
