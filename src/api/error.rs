//! Error responses.

use crate::error::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

/// A service error rendered as the structured JSON error body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status for the error's exit-code category.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.0.exit_code() {
            3 => StatusCode::NOT_FOUND,
            4 | 6 => StatusCode::BAD_REQUEST,
            5 => StatusCode::CONFLICT,
            10 => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "API request failed");
        }
        (status, Json(self.0.to_structured_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_by_category() {
        assert_eq!(
            ApiError(Error::PaymentNotFound { id: "x".into() }).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(Error::DuplicateOrNumber {
                or_number: "00001".into(),
                payment_id: "pay_1".into()
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError(Error::RequiredField("reason")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(Error::PermissionDenied {
                actor: "bob".into(),
                action: "void".into()
            })
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError(Error::Other("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
