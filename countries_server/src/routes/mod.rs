use axum::Router;
use axum::routing::get;

pub mod countries;
pub mod image;
pub mod status;

#[tracing::instrument(level = "debug", skip_all)]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(status::get_health))
        .route("/status", get(status::get_status))
        .merge(image::router())
        .merge(countries::router())
}
