use axum::Json;
use axum::response::{IntoResponse, Response};
use tracing::error;

use gomodel_common::{ErrorKind, GatewayError};

/// Response-side wrapper: serializes the client-facing envelope with the
/// kind's HTTP status. Internal errors never leak their cause text.
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        if err.kind == ErrorKind::Internal {
            error!(message = %err.message, "internal error");
            return ApiError(GatewayError::internal());
        }
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0.status, Json(self.0.envelope())).into_response()
    }
}
