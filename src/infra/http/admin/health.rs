use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
