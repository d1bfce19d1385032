use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

pub const UNAUTHORIZED_DETAIL: &str = "Unauthorized";
pub const NOT_FOUND_DETAIL: &str = "Not found";
pub const METHOD_NOT_ALLOWED_DETAIL: &str = "Method not allowed";
pub const INTERNAL_ERROR_DETAIL: &str = "Internal server error";

pub type ApiErrorTuple = (StatusCode, Json<ApiErrorBody>);

/// Failure classes the gateway can produce on its own. Backend failures are
/// relayed verbatim and never pass through here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Unauthorized,
    InvalidRequest,
    NotFound,
    MethodNotAllowed,
    Internal,
}

impl GatewayErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Internal => "internal_error",
        }
    }

    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body shape shared with the task backend, so browser code sees one error
/// format no matter which side produced it.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub detail: String,
}

pub fn error_response(kind: GatewayErrorKind, detail: impl Into<String>) -> ApiErrorTuple {
    (
        kind.default_status(),
        Json(ApiErrorBody {
            detail: detail.into(),
        }),
    )
}

pub fn unauthorized_error() -> ApiErrorTuple {
    error_response(GatewayErrorKind::Unauthorized, UNAUTHORIZED_DETAIL)
}

pub fn validation_error(message: &str) -> ApiErrorTuple {
    error_response(GatewayErrorKind::InvalidRequest, message)
}

pub fn not_found_error() -> ApiErrorTuple {
    error_response(GatewayErrorKind::NotFound, NOT_FOUND_DETAIL)
}

pub fn method_not_allowed_error() -> ApiErrorTuple {
    error_response(GatewayErrorKind::MethodNotAllowed, METHOD_NOT_ALLOWED_DETAIL)
}

pub fn internal_error() -> ApiErrorTuple {
    error_response(GatewayErrorKind::Internal, INTERNAL_ERROR_DETAIL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_unique() {
        let kinds = [
            GatewayErrorKind::Unauthorized,
            GatewayErrorKind::InvalidRequest,
            GatewayErrorKind::NotFound,
            GatewayErrorKind::MethodNotAllowed,
            GatewayErrorKind::Internal,
        ];
        let mut tags = std::collections::HashSet::new();
        for kind in kinds {
            assert!(
                tags.insert(kind.as_str()),
                "duplicate gateway error tag: {}",
                kind.as_str()
            );
        }
    }

    #[test]
    fn kind_statuses_match_contract() {
        assert_eq!(
            GatewayErrorKind::Unauthorized.default_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayErrorKind::InvalidRequest.default_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayErrorKind::NotFound.default_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayErrorKind::MethodNotAllowed.default_status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            GatewayErrorKind::Internal.default_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_error_maps_to_expected_shape() {
        let (status, payload) = unauthorized_error();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body = serde_json::to_value(payload.0).expect("serialize payload");
        assert_eq!(body["detail"], "Unauthorized");
        assert_eq!(body.as_object().map(serde_json::Map::len), Some(1));
    }

    #[test]
    fn validation_error_keeps_caller_message() {
        let (status, payload) = validation_error("Title is required");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = serde_json::to_value(payload.0).expect("serialize payload");
        assert_eq!(body["detail"], "Title is required");
    }
}
