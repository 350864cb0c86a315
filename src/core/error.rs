use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Record '{0}' not found in collection '{1}'")]
    NotFound(String, String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Child record '{0}' is write-once")]
    ImmutableRecord(String),

    #[error("Document store is closed")]
    StoreClosed,
}

pub type Result<T> = std::result::Result<T, CaptureError>;

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
