use axum::{
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>(request_timeout: Duration) -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // System models
        .route("/applications", get(handlers::list_tags::<S>))
        .route(
            "/applications/:tag",
            post(handlers::update_application::<S>).get(handlers::get_application::<S>),
        )
        .route("/applications/:tag/base", get(handlers::get_base_application::<S>))
        .route("/applications/:tag/delta", get(handlers::get_application_delta::<S>))
        .route("/applications/:tag/timestamp", put(handlers::retime_application::<S>))
        // Annotations
        .route(
            "/annotations/:tag",
            post(handlers::update_annotation::<S>).get(handlers::get_annotation::<S>),
        )
        .route("/annotations/:tag/base", get(handlers::get_base_annotation::<S>))
        .route("/annotations/:tag/broken", get(handlers::get_annotation_broken::<S>))
        .layer(ServiceBuilder::new().layer(TimeoutLayer::new(request_timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::AnnotationStorageManager;
    use crate::seed;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn seeded_router() -> Router {
        let manager = Arc::new(AnnotationStorageManager::new(MemoryStore::new()));
        seed::load_seed_data(&*manager).await.unwrap();
        create_router::<MemoryStore>(Duration::from_secs(5)).with_state(manager)
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = seeded_router()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_not_found() {
        let response = seeded_router()
            .await
            .oneshot(Request::get("/annotations/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_annotation_without_model_is_precondition_failure() {
        let body = serde_json::to_vec(&seed::first_annotation()).unwrap();
        let response = seeded_router()
            .await
            .oneshot(
                Request::post("/annotations/unknown")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }
}
