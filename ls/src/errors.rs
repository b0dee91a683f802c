/*! Errors produced by the language server.

Problems found in the source code (syntax errors, compiler errors, duplicate
rules) are never reported through these types; they are data and end up as
diagnostics. The types in this module represent failures of a specific
request, which are returned to the client as a [`ResponseError`].
 */

use async_lsp::lsp_types::Url;
use async_lsp::{ErrorCode, ResponseError};
use thiserror::Error;

/// Error returned by a request handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The new name for a rename operation was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The workspace changed while the request was being computed. The
    /// client can retry the request.
    #[error("symbol index changed while the request was in progress")]
    StaleSnapshot,

    /// The request refers to a document that is not known by the server.
    #[error("unknown document `{0}`")]
    UnknownDocument(Url),

    /// Some unexpected condition, like a malformed schema.
    #[error("internal error: {0}")]
    InternalFault(String),
}

/// Reasons why a new name is rejected by a rename operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{name}` is not a valid {kind} identifier")]
    InvalidIdentifier { name: String, kind: &'static str },

    #[error("a rule named `{0}` already exists")]
    RuleExists(String),

    #[error("pattern `{0}` already exists in this rule")]
    PatternExists(String),

    #[error("`{0}` can't be renamed")]
    NotRenameable(String),
}

/// Error returned by a [`crate::collaborators::RuleCompiler`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The compiler is not installed or can't be started.
    #[error("rule compiler is not available")]
    Unavailable,

    #[error("rule compiler failed: {0}")]
    Failed(String),
}

/// The bundled module schema couldn't be loaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed module schema: {0}")]
pub struct SchemaError(pub String);

impl From<SchemaError> for RequestError {
    fn from(err: SchemaError) -> Self {
        RequestError::InternalFault(err.to_string())
    }
}

impl From<RequestError> for ResponseError {
    fn from(err: RequestError) -> Self {
        let code = match &err {
            RequestError::Validation(_) => ErrorCode::INVALID_PARAMS,
            RequestError::StaleSnapshot => ErrorCode::CONTENT_MODIFIED,
            RequestError::UnknownDocument(_) => ErrorCode::INVALID_PARAMS,
            RequestError::InternalFault(_) => ErrorCode::INTERNAL_ERROR,
        };
        ResponseError::new(code, err.to_string())
    }
}
