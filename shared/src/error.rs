//! Validation errors for loosely typed command payloads.

use thiserror::Error;

/// Errors raised while validating raw command payloads and documents
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("payload is not a json object")]
    PayloadNotObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
