use thiserror::Error;

/// Failure to turn raw message bytes into a [`crate::mail::MailRecord`].
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown e-mail message format received")]
    UnrecognizedFormat,
}

/// Errors raised by repository and file store collaborators.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository backend error: {0}")]
    Backend(String),
    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while populating a content bean.
#[derive(Debug, Error, PartialEq)]
pub enum FieldError {
    #[error("no content type registered for aspect '{0}'")]
    UnknownAspect(String),
    #[error("aspect '{aspect}' has no field '{field}'")]
    UnknownField { aspect: String, field: String },
    #[error("cannot store value '{value}' in {kind} field '{field}'")]
    Coercion {
        field: String,
        value: String,
        kind: String,
    },
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no route configuration available for this message")]
    MissingRoute,
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("failed to publish contents: {0}")]
    Repository(#[from] RepositoryError),
    #[error("repository rejected '{name}' with status {status}")]
    WriteRejected { name: String, status: String },
}

/// Errors for the parse, archive and publish pipeline of a single message.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}
