pub mod cms;
pub mod config;
pub mod dump;
pub mod error;
pub mod fields;
pub mod mail;
pub mod memory;
pub mod metadata;
pub mod name_pattern;
pub mod parser;
pub mod processor;
pub mod publisher;
pub mod text;

pub use config::{ImporterConfig, RouteConfig};
pub use error::{FieldError, ParseError, ProcessError, PublishError, RepositoryError};
pub use mail::{Attachment, Attachments, MailRecord};
pub use parser::{MailParser, MimeMailParser};
pub use processor::MailProcessor;
pub use publisher::{ContentPublisher, PublishOutcome};
