use crate::error::ApiError;
use crate::server::AppState;
use axum::Extension;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::routing::get;
use bytes::Bytes;
use countries_core::Error as CoreError;
use std::io::ErrorKind;
use std::sync::Arc;

#[tracing::instrument(level = "debug", skip_all)]
pub fn router() -> axum::Router {
    axum::Router::new().route("/countries/image", get(get_image))
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn get_image(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response<Body>, ApiError> {
    let path = state.render.image_path();
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => Bytes::from(b),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(ApiError::ImageNotFound),
        Err(e) => return Err(CoreError::backend("read summary image", e).into()),
    };

    let mut resp = Response::new(Body::from(bytes));
    *resp.status_mut() = StatusCode::OK;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("image/png"),
    );
    resp.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    Ok(resp)
}
