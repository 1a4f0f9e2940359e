//! Router construction

use axum::{
    extract::DefaultBodyLimit,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::api::handlers;
use crate::error::{panic_message, AppError};
use crate::AppState;

/// Build the service router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/generate", post(handlers::generate))
        .route("/sam/segment", post(handlers::segment))
        .route("/inpaint", post(handlers::inpaint))
        .route("/clip/classify", post(handlers::classify));

    if let Some(store) = &state.store {
        router = router.nest_service("/images", ServeDir::new(store.storage_path()));
    }

    router
        .layer(DefaultBodyLimit::max(state.settings.server.max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .with_state(state)
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    AppError::Internal(format!("handler panicked: {}", panic_message(&*payload))).into_response()
}
