//! Mapping from use-case results to HTTP responses.

use axum::response::{IntoResponse, Response};
use axum::Json;
use backbone_core::{AppStatus, UseCaseResult};
use http::StatusCode;
use serde::Serialize;

/// Fixed application-status to HTTP-status table.
#[must_use]
pub const fn http_status(status: AppStatus) -> StatusCode {
    match status {
        AppStatus::Success | AppStatus::Updated => StatusCode::OK,
        AppStatus::Created => StatusCode::CREATED,
        AppStatus::PartialContent => StatusCode::PARTIAL_CONTENT,
        AppStatus::InvalidInput => StatusCode::BAD_REQUEST,
        AppStatus::Unauthorized => StatusCode::UNAUTHORIZED,
        AppStatus::NotFound => StatusCode::NOT_FOUND,
        AppStatus::Conflict => StatusCode::CONFLICT,
        AppStatus::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        AppStatus::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        AppStatus::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        AppStatus::ProviderError => StatusCode::BAD_GATEWAY,
    }
}

#[derive(Debug, Serialize)]
struct DataBody<T> {
    data: T,
    details: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    details: String,
}

/// Axum response wrapper for a [`UseCaseResult`].
///
/// - success with data: `{"data": .., "details": ..}`
/// - failure: `{"details": <error message>}`
/// - success without data: empty body
/// - non-terminal result: 500
#[derive(Debug)]
pub struct ApiResponse<T>(pub UseCaseResult<T>);

impl<T> From<UseCaseResult<T>> for ApiResponse<T> {
    fn from(result: UseCaseResult<T>) -> Self {
        Self(result)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let result = self.0;
        let Some(status) = result.status() else {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    details: "use case produced no result".to_string(),
                }),
            )
                .into_response();
        };
        let code = http_status(status);

        if let Some(err) = result.error() {
            return (
                code,
                Json(ErrorBody {
                    details: err.message.clone(),
                }),
            )
                .into_response();
        }

        let details = result.details().map(str::to_owned);
        match result.into_data() {
            Some(data) => (code, Json(DataBody { data, details })).into_response(),
            None => code.into_response(),
        }
    }
}
