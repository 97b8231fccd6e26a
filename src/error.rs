use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required parameter `{0}` is missing or blank")]
    Blank(&'static str),
    #[error("no archive file name given, use -f <file>")]
    MissingUploadFile,
    #[error("unsupported inventory format `{0}`, expected CSV or JSON")]
    UnsupportedFormat(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
    #[error("{operation} response is missing `{field}`")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
    #[error("the vault client has already been released")]
    Closed,
}

impl ServiceError {
    pub fn request(operation: &'static str, reason: impl std::fmt::Display) -> Self {
        ServiceError::Request {
            operation,
            message: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("poll interval must be greater than zero minutes")]
    InvalidInterval,
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("job {job_id} did not complete within {waited:?}")]
    PollTimedOut { job_id: String, waited: Duration },
    #[error("failed reading job output: {0}")]
    Stream(#[from] aws_smithy_types::byte_stream::error::Error),
    #[error("failed writing job output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("cannot read archive {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("archive transfer failed: {0}")]
    Transfer(#[from] ServiceError),
}
