use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
};
use serde::de::DeserializeOwned;

use crate::error::OpsError;

/// `Json<T>` whose rejections use the crate's error envelope. Bodies over the
/// configured limit become 413.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = OpsError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> OpsError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return OpsError::PayloadTooLarge;
    }
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            OpsError::Validation("expected `Content-Type: application/json`".into())
        }
        other => OpsError::Validation(other.body_text()),
    }
}

/// `Query<T>` with the same error envelope.
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = OpsError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| ValidQuery(value))
            .map_err(|rejection: QueryRejection| OpsError::Validation(rejection.body_text()))
    }
}

/// Errors while reading a multipart body; hitting the body limit is 413.
pub fn multipart_error(err: MultipartError) -> OpsError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        OpsError::PayloadTooLarge
    } else {
        OpsError::Validation(err.body_text())
    }
}
