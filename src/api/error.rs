use actix_web::{error::JsonPayloadError, http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;

/// Client mistakes; all map to 400.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("session_id is required")]
    MissingSessionId,
    #[error("context must be an array of messages")]
    MissingContext,
    #[error("context must contain at least the new user message")]
    EmptyContext,
    #[error("the last context entry must come from the user")]
    LastEntryNotFromUser,
    #[error("topic must not be blank")]
    BlankTopic,
    #[error("Malformed request body: {0}")]
    Payload(String),
}

impl ResponseError for RequestError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Request(e) => e.status_code(),
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

/// Turns JSON extractor failures (bad syntax, `context` not an array, ...) into the
/// same 400 body the handlers produce.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    RequestError::Payload(err.to_string()).into()
}
