pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{facade::Facade, ingest::IngestService};
use handlers::ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub facade: Facade,
    pub ingest: IngestService,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/api", post(handlers::dispatch))
        .route("/samples", post(handlers::ingest_sample))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
