use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use verdict_core::Error;

/// Newtype so engine errors can flow straight out of handlers with `?`.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = &self.0;
        let (status, message) = match err {
            Error::InvalidInput(_) | Error::InvalidSchema(_) | Error::InvalidExpression(_) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }

            Error::TenantNotFound { .. } | Error::RuleNotFound { .. } => {
                (StatusCode::NOT_FOUND, err.to_string())
            }

            Error::RuleAlreadyExists { .. } => (StatusCode::CONFLICT, err.to_string()),

            Error::Evaluation(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),

            // infrastructure details stay out of responses
            Error::Store { .. } | Error::Database(_) | Error::Internal(_) => {
                tracing::error!("request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }

            Error::Serialization(_) | Error::Config(_) => {
                tracing::error!("request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": err.kind()
            }
        }));

        (status, body).into_response()
    }
}

/// Map request-DTO validation failures onto the invalid-input kind.
pub fn validation_error(err: validator::ValidationErrors) -> ApiError {
    ApiError(Error::InvalidInput(err.to_string()))
}
