//! Content beans and the default-then-rename population rules.
//!
//! A bean is a bag of typed fields belonging to one aspect (content type).
//! Which fields exist, and with which kind, is declared by a [`BeanSchema`];
//! the [`BeanRegistry`] maps aspect names to schemas.

use crate::cms::ContentId;
use crate::config::{ImporterConfig, RouteConfig, DEFAULT_ARTICLE_ASPECT, DEFAULT_IMAGE_ASPECT};
use crate::error::FieldError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    StructuredText,
    Integer,
    ContentIds,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Text => "text",
            FieldKind::StructuredText => "structured text",
            FieldKind::Integer => "integer",
            FieldKind::ContentIds => "content id list",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    StructuredText(String),
    Integer(i64),
    ContentIds(Vec<ContentId>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// String form of scalar values; `None` for content id lists.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(text) | FieldValue::StructuredText(text) => Some(text.clone()),
            FieldValue::Integer(value) => Some(value.to_string()),
            FieldValue::ContentIds(_) => None,
        }
    }

    /// Converts the value to the declared kind of its destination field.
    pub fn coerce(self, field: &str, kind: FieldKind) -> Result<FieldValue, FieldError> {
        let coercion_error = |value: &FieldValue| FieldError::Coercion {
            field: field.to_string(),
            value: value.to_string(),
            kind: kind.to_string(),
        };

        match (kind, self) {
            (FieldKind::Text, FieldValue::Text(text))
            | (FieldKind::Text, FieldValue::StructuredText(text)) => Ok(FieldValue::Text(text)),
            (FieldKind::StructuredText, FieldValue::Text(text))
            | (FieldKind::StructuredText, FieldValue::StructuredText(text)) => {
                Ok(FieldValue::StructuredText(text))
            }
            (FieldKind::Text, FieldValue::Integer(value)) => Ok(FieldValue::Text(value.to_string())),
            (FieldKind::StructuredText, FieldValue::Integer(value)) => {
                Ok(FieldValue::StructuredText(value.to_string()))
            }
            (FieldKind::Integer, FieldValue::Integer(value)) => Ok(FieldValue::Integer(value)),
            (FieldKind::Integer, value @ FieldValue::Text(_))
            | (FieldKind::Integer, value @ FieldValue::StructuredText(_)) => {
                let parsed = value
                    .as_text()
                    .and_then(|text| text.trim().parse::<i64>().ok());
                parsed
                    .map(FieldValue::Integer)
                    .ok_or_else(|| coercion_error(&value))
            }
            (FieldKind::ContentIds, FieldValue::ContentIds(ids)) => Ok(FieldValue::ContentIds(ids)),
            (_, value) => Err(coercion_error(&value)),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::ContentIds(ids) => {
                let ids: Vec<&str> = ids.iter().map(ContentId::as_str).collect();
                write!(f, "[{}]", ids.join(", "))
            }
            other => f.write_str(&other.as_text().unwrap_or_default()),
        }
    }
}

/// Insertion-ordered field values. Re-inserting a name replaces the value
/// in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldValueBag {
    entries: Vec<(String, FieldValue)>,
}

impl FieldValueBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Inserts a text value when one is present.
    pub fn insert_text(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.insert(name, FieldValue::text(value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FieldValueBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Field access for a content type's main aspect.
pub trait ContentBean: fmt::Debug + Send + Sync {
    fn aspect_name(&self) -> &str;

    fn field_kind(&self, name: &str) -> Option<FieldKind>;

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError>;

    fn get_field(&self, name: &str) -> Option<&FieldValue>;

    fn values(&self) -> &FieldValueBag;
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeanSchema {
    aspect: String,
    fields: BTreeMap<String, FieldKind>,
}

impl BeanSchema {
    pub fn new(aspect: impl Into<String>) -> Self {
        Self {
            aspect: aspect.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.insert(name.to_string(), kind);
        self
    }

    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }

    pub fn article() -> Self {
        BeanSchema::new(DEFAULT_ARTICLE_ASPECT)
            .field("name", FieldKind::Text)
            .field("headline", FieldKind::StructuredText)
            .field("lead", FieldKind::StructuredText)
            .field("body", FieldKind::StructuredText)
            .field("section", FieldKind::Text)
            .field("source", FieldKind::Text)
            .field("byline", FieldKind::Text)
            .field("images", FieldKind::ContentIds)
            .field("inputTemplate", FieldKind::Text)
            .field("objectType", FieldKind::Text)
    }

    pub fn image() -> Self {
        BeanSchema::new(DEFAULT_IMAGE_ASPECT)
            .field("name", FieldKind::Text)
            .field("byline", FieldKind::Text)
            .field("description", FieldKind::Text)
            .field("caption", FieldKind::Text)
            .field("headline", FieldKind::Text)
            .field("credit", FieldKind::Text)
            .field("keywords", FieldKind::Text)
            .field("copyright", FieldKind::Text)
            .field("location", FieldKind::Text)
            .field("dateCreated", FieldKind::Text)
            .field("section", FieldKind::Text)
            .field("source", FieldKind::Text)
            .field("width", FieldKind::Integer)
            .field("height", FieldKind::Integer)
            .field("inputTemplate", FieldKind::Text)
            .field("objectType", FieldKind::Text)
    }
}

/// A bean backed by a declared schema.
#[derive(Debug, Clone)]
pub struct SchemaBean {
    schema: Arc<BeanSchema>,
    values: FieldValueBag,
}

impl SchemaBean {
    pub fn new(schema: Arc<BeanSchema>) -> Self {
        Self {
            schema,
            values: FieldValueBag::new(),
        }
    }
}

impl ContentBean for SchemaBean {
    fn aspect_name(&self) -> &str {
        self.schema.aspect()
    }

    fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.schema.kind_of(name)
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError> {
        let kind = self
            .field_kind(name)
            .ok_or_else(|| FieldError::UnknownField {
                aspect: self.schema.aspect().to_string(),
                field: name.to_string(),
            })?;
        let value = value.coerce(name, kind)?;
        self.values.insert(name, value);
        Ok(())
    }

    fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    fn values(&self) -> &FieldValueBag {
        &self.values
    }
}

/// Bean schemas keyed by aspect name.
#[derive(Debug, Clone)]
pub struct BeanRegistry {
    schemas: HashMap<String, Arc<BeanSchema>>,
}

impl Default for BeanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanRegistry {
    /// Registry with the built-in article and image schemas.
    pub fn new() -> Self {
        let mut registry = BeanRegistry {
            schemas: HashMap::new(),
        };
        registry.register(BeanSchema::article());
        registry.register(BeanSchema::image());
        registry
    }

    /// Built-in schemas plus those declared under `schemas` in the
    /// configuration. A declaration replaces a built-in of the same name.
    pub fn from_config(config: &ImporterConfig) -> Self {
        let mut registry = Self::new();
        for (aspect, fields) in &config.schemas {
            let schema = fields
                .iter()
                .fold(BeanSchema::new(aspect.as_str()), |schema, (name, kind)| {
                    schema.field(name, *kind)
                });
            registry.register(schema);
        }
        registry
    }

    pub fn register(&mut self, schema: BeanSchema) {
        self.schemas
            .insert(schema.aspect().to_string(), Arc::new(schema));
    }

    pub fn contains(&self, aspect: &str) -> bool {
        self.schemas.contains_key(aspect)
    }

    pub fn create(&self, aspect: &str) -> Result<Box<dyn ContentBean>, FieldError> {
        let schema = self
            .schemas
            .get(aspect)
            .ok_or_else(|| FieldError::UnknownAspect(aspect.to_string()))?;
        Ok(Box::new(SchemaBean::new(Arc::clone(schema))))
    }
}

/// Builds the bean for `aspect` from computed values.
///
/// Non-empty route defaults for the aspect overwrite computed values, then
/// every value is written under its mapped name (or its own name when no
/// mapping exists). Fields the schema does not know, and values that cannot
/// be converted, are logged and skipped.
pub fn populate(
    registry: &BeanRegistry,
    computed: &FieldValueBag,
    route: &RouteConfig,
    aspect: &str,
) -> Result<Box<dyn ContentBean>, FieldError> {
    let mut bean = registry.create(aspect)?;

    let mut values = computed.clone();
    if let Some(defaults) = route.fields_defaults.get(aspect) {
        for (name, value) in defaults {
            if !value.is_empty() {
                values.insert(name.as_str(), FieldValue::text(value.as_str()));
            }
        }
    }

    for (name, value) in values.iter() {
        let target = route.mapped_field(aspect, name);
        if let Err(e) = bean.set_field(target, value.clone()) {
            log::warn!("Skipping field '{}' on {}: {}", name, aspect, e);
        }
    }

    Ok(bean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_with(aspect: &str, defaults: &[(&str, &str)], mappings: &[(&str, &str)]) -> RouteConfig {
        let mut route = RouteConfig::default();
        route.fields_defaults.insert(
            aspect.to_string(),
            defaults
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        route.fields_mappings.insert(
            aspect.to_string(),
            mappings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        route
    }

    fn computed() -> FieldValueBag {
        let mut bag = FieldValueBag::new();
        bag.insert("name", FieldValue::text("Email_f@x.com_S"));
        bag.insert("headline", FieldValue::text("S"));
        bag.insert("section", FieldValue::text("FromMail"));
        bag
    }

    #[test]
    fn test_bag_keeps_order_and_replaces_in_place() {
        let mut bag = FieldValueBag::new();
        bag.insert("a", FieldValue::text("1"));
        bag.insert("b", FieldValue::text("2"));
        bag.insert("a", FieldValue::text("3"));

        let keys: Vec<&str> = bag.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(bag.get_text("a").as_deref(), Some("3"));
    }

    #[test]
    fn test_defaults_override_computed_values() {
        let route = route_with(DEFAULT_ARTICLE_ASPECT, &[("section", "aSection"), ("source", "")], &[]);
        let bean = populate(&BeanRegistry::new(), &computed(), &route, DEFAULT_ARTICLE_ASPECT).unwrap();

        assert_eq!(bean.get_field("section"), Some(&FieldValue::text("aSection")));
        // empty defaults are ignored
        assert!(bean.get_field("source").is_none());
    }

    #[test]
    fn test_defaults_add_missing_fields() {
        let route = route_with(
            DEFAULT_ARTICLE_ASPECT,
            &[("inputTemplate", "p.Article"), ("objectType", "article")],
            &[],
        );
        let bean = populate(&BeanRegistry::new(), &computed(), &route, DEFAULT_ARTICLE_ASPECT).unwrap();

        assert_eq!(bean.get_field("inputTemplate"), Some(&FieldValue::text("p.Article")));
        assert_eq!(bean.get_field("objectType"), Some(&FieldValue::text("article")));
    }

    #[test]
    fn test_mapping_writes_under_target_name_only() {
        let mut values = FieldValueBag::new();
        values.insert("headline", FieldValue::text("This is the subject"));
        values.insert("srcInputTemplate", FieldValue::text("p.Article"));
        let route = route_with(
            DEFAULT_ARTICLE_ASPECT,
            &[],
            &[("headline", "name"), ("srcInputTemplate", "inputTemplate")],
        );
        let bean = populate(&BeanRegistry::new(), &values, &route, DEFAULT_ARTICLE_ASPECT).unwrap();

        assert_eq!(bean.get_field("name"), Some(&FieldValue::text("This is the subject")));
        assert_eq!(bean.get_field("inputTemplate"), Some(&FieldValue::text("p.Article")));
        assert!(bean.get_field("headline").is_none());
    }

    #[test]
    fn test_later_writes_win() {
        // headline is renamed to name and overwrites the computed name
        let route = route_with(DEFAULT_ARTICLE_ASPECT, &[], &[("headline", "name")]);
        let bean = populate(&BeanRegistry::new(), &computed(), &route, DEFAULT_ARTICLE_ASPECT).unwrap();

        assert_eq!(bean.get_field("name"), Some(&FieldValue::text("S")));
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        let mut values = computed();
        values.insert("nonexistent", FieldValue::text("x"));
        let bean = populate(&BeanRegistry::new(), &values, &RouteConfig::default(), DEFAULT_ARTICLE_ASPECT)
            .unwrap();

        assert!(bean.get_field("nonexistent").is_none());
        assert_eq!(bean.values().len(), 3);
    }

    #[test]
    fn test_structured_text_and_integer_coercion() {
        let mut values = FieldValueBag::new();
        values.insert("width", FieldValue::text("600"));
        values.insert("height", FieldValue::text("not a number"));
        let route = RouteConfig::default();
        let image = populate(&BeanRegistry::new(), &values, &route, DEFAULT_IMAGE_ASPECT).unwrap();

        assert_eq!(image.get_field("width"), Some(&FieldValue::Integer(600)));
        assert!(image.get_field("height").is_none());

        let article = populate(&BeanRegistry::new(), &computed(), &route, DEFAULT_ARTICLE_ASPECT).unwrap();
        assert_eq!(
            article.get_field("headline"),
            Some(&FieldValue::StructuredText("S".to_string()))
        );
        assert_eq!(article.field_kind("headline"), Some(FieldKind::StructuredText));
    }

    #[test]
    fn test_unknown_aspect_is_an_error() {
        let result = populate(&BeanRegistry::new(), &computed(), &RouteConfig::default(), "no.such.aspect");

        assert_eq!(
            result.unwrap_err(),
            FieldError::UnknownAspect("no.such.aspect".to_string())
        );
    }

    #[test]
    fn test_registry_from_config() {
        let mut config = ImporterConfig::default();
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), FieldKind::StructuredText);
        config.schemas.insert("custom.story".to_string(), fields);
        let registry = BeanRegistry::from_config(&config);

        assert!(registry.contains(DEFAULT_ARTICLE_ASPECT));
        let mut bean = registry.create("custom.story").unwrap();
        bean.set_field("title", FieldValue::text("T")).unwrap();
        assert_eq!(bean.aspect_name(), "custom.story");
        assert!(bean.set_field("body", FieldValue::text("B")).is_err());
    }
}
