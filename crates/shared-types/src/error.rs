//! Value parsing errors for the shared data model

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedTypeError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("unsupported value: {0}")]
    Unsupported(String),
}
