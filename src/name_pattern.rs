use crate::mail::MailRecord;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// Expands `${key}` placeholders from the mail record first and `extra`
/// second. Unknown placeholders are left as written.
pub fn expand(pattern: &str, mail: &MailRecord, extra: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(pattern, |caps: &Captures| {
            let key = caps[1].trim();
            match mail.field(key).or_else(|| extra.get(key).map(String::as_str)) {
                Some(value) => value.to_string(),
                None => {
                    log::debug!("No value for placeholder '{}' in name pattern", key);
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> MailRecord {
        MailRecord {
            subject: "This is the subject".to_string(),
            from: "mnova@atex.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_expand_mail_fields() {
        assert_eq!(
            expand("Email_${from}_${subject}", &mail(), &BTreeMap::new()),
            "Email_mnova@atex.com_This is the subject"
        );
    }

    #[test]
    fn test_expand_extra_values() {
        let mut extra = BTreeMap::new();
        extra.insert("filename".to_string(), "photo.jpg".to_string());

        assert_eq!(
            expand("Attachment_${from}_${filename}", &mail(), &extra),
            "Attachment_mnova@atex.com_photo.jpg"
        );
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        assert_eq!(
            expand("${unknown}-${subject}", &mail(), &BTreeMap::new()),
            "${unknown}-This is the subject"
        );
        assert_eq!(expand("plain", &mail(), &BTreeMap::new()), "plain");
    }
}
