use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::database::StoreError;

pub enum ApiError {
    MissingActor,
    InvalidHashtag(String),
    EmptyPost,
    Database(StoreError),
    ViewNotFound,
    InvalidView(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::MissingActor => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "message": "x-actor-id header is required" })),
            )
                .into_response(),
            Self::InvalidHashtag(tag) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": format!("{tag:?} is not a valid hashtag") })),
            )
                .into_response(),
            Self::EmptyPost => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": "post content must not be empty" })),
            )
                .into_response(),
            Self::Database(err) => {
                tracing::error!(err = ?err);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::ViewNotFound => StatusCode::NOT_FOUND.into_response(),
            Self::InvalidView(view) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "message": format!("{view:?} is not a valid view id") })),
            )
                .into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Database(err)
    }
}
