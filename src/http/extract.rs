//! Extractors that report rejections through the relay error envelope.
//!
//! Axum's own `Json` and `Query` rejections answer with plain text; these
//! wrappers turn them into [`RelayError`] so every failure has the same shape.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::{RelayError, ValidationCode};

/// JSON body that is parsed and then validated.
///
/// A body over the size limit is rejected with `PAYLOAD_TOO_LARGE`; one that
/// is not JSON, or does not fit `T`, with `INVALID_JSON`. Field validation failures go through
/// `From<ValidationErrors>`.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                RelayError::validation(
                    ValidationCode::PayloadTooLarge,
                    "Request body is too large",
                )
            } else {
                RelayError::validation(
                    ValidationCode::InvalidJson,
                    format!("Invalid JSON body: {}", rejection.body_text()),
                )
            }
        })?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Query string that is parsed and then validated.
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                RelayError::validation(
                    ValidationCode::MissingField,
                    format!("Invalid query parameters: {}", rejection.body_text()),
                )
            })?;

        value.validate()?;
        Ok(ValidatedQuery(value))
    }
}
