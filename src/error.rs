use async_graphql::ErrorExtensions;
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bson::Uuid;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the review service.
///
/// Validation variants are raised before any write of a scope. Store variants can
/// originate inside a scope, in which case every write of that scope is rolled back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    #[error("Authentication is required.")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} with UUID: `{id}` not found.")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Rating `{0}` is not within 1-5 stars.")]
    InvalidRating(i64),

    #[error("Review status `{0}` is neither `visible` nor `hidden`.")]
    InvalidStatus(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(
        "User of UUID: `{user_id}` has already reviewed product of UUID: `{product_id}` for order of UUID: `{order_id}`."
    )]
    DuplicateReview {
        user_id: Uuid,
        product_id: Uuid,
        order_id: Uuid,
    },

    #[error("Transaction conflicted with a concurrent write.")]
    TransactionConflict,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ReviewError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    /// Stable machine readable code, shared by the REST and GraphQL surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidRating(_) => "INVALID_RATING",
            Self::InvalidStatus(_) => "INVALID_STATUS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateReview { .. } => "DUPLICATE_REVIEW",
            Self::TransactionConflict => "TRANSACTION_CONFLICT",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRating(_)
            | Self::InvalidStatus(_)
            | Self::Validation(_)
            | Self::DuplicateReview { .. } => StatusCode::BAD_REQUEST,
            Self::TransactionConflict => StatusCode::CONFLICT,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.code(), "message": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<JsonRejection> for ReviewError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ReviewError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ReviewError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl ErrorExtensions for ReviewError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_http_statuses() {
        let id = Uuid::new();
        assert_eq!(ReviewError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ReviewError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ReviewError::not_found("Review", id).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ReviewError::InvalidRating(6).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ReviewError::DuplicateReview {
                user_id: id,
                product_id: id,
                order_id: id
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ReviewError::TransactionConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ReviewError::StoreUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn graphql_extension_carries_code() {
        let error = ReviewError::InvalidStatus("pending".into()).extend();
        let code = error
            .extensions
            .as_ref()
            .and_then(|extensions| extensions.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("INVALID_STATUS")));
    }
}
