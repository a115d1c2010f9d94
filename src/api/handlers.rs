use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::logic::{AnnotationStorageManager, ManagerError};
use crate::model::{Annotation, Application, ChangeReport, IgnoredChangeTypes, Timestamp, ValidityReport};
use crate::store::traits::Store;

pub type AppState<S> = Arc<AnnotationStorageManager<S>>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Where the client can continue, e.g. the base annotation of a broken tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            redirect: None,
        }
    }

    pub fn with_redirect(message: &str, redirect: String) -> Self {
        Self {
            error: message.to_string(),
            redirect: Some(redirect),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeltaQuery {
    pub since: Timestamp,
}

#[derive(Debug, Deserialize)]
pub struct AtQuery {
    /// Read the snapshot in effect at this time instead of the latest one
    pub at: Option<Timestamp>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetimeRequest {
    pub old: Timestamp,
    pub new: Timestamp,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BrokenResponse {
    pub tag: String,
    pub broken: bool,
}

fn manager_error(err: ManagerError) -> ApiError {
    let status = match &err {
        ManagerError::NoApplicationModel(_) => StatusCode::NOT_FOUND,
        ManagerError::StaleApplication { .. } => StatusCode::CONFLICT,
        ManagerError::DuplicateIds { .. } | ManagerError::InvalidRetime { .. } => StatusCode::BAD_REQUEST,
        ManagerError::Storage(e) => {
            log::error!("Storage failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, Json(ErrorResponse::new(&err.to_string())))
}

fn not_found(message: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new(&message)))
}

pub async fn list_tags<S: Store>(
    State(manager): State<AppState<S>>,
) -> Result<Json<ListResponse<String>>, ApiError> {
    let tags = manager.tags().await.map_err(manager_error)?;
    Ok(Json(ListResponse {
        total: tags.len(),
        items: tags,
    }))
}

/// Stores a new system model; `ignore-*` query flags extend the configured ignores.
pub async fn update_application<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
    Query(ignored): Query<IgnoredChangeTypes>,
    RequestJson(application): RequestJson<Application>,
) -> Result<Json<ValidityReport>, ApiError> {
    let report = manager
        .apply_application_update(&tag, application, &ignored)
        .await
        .map_err(manager_error)?;

    Ok(Json(report))
}

pub async fn get_application<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
) -> Result<Json<Application>, ApiError> {
    manager
        .latest_application(&tag)
        .await
        .map_err(manager_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("No system model for tag '{}'", tag)))
}

pub async fn get_base_application<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
) -> Result<Json<Application>, ApiError> {
    manager
        .base_application(&tag)
        .await
        .map_err(manager_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("No base system model for tag '{}'", tag)))
}

pub async fn get_application_delta<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
    Query(query): Query<DeltaQuery>,
    Query(ignored): Query<IgnoredChangeTypes>,
) -> Result<Json<ChangeReport>, ApiError> {
    let report = manager
        .delta_since(&tag, query.since, &ignored)
        .await
        .map_err(manager_error)?;

    Ok(Json(report))
}

pub async fn retime_application<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
    RequestJson(request): RequestJson<RetimeRequest>,
) -> Result<StatusCode, ApiError> {
    manager
        .retime_application_snapshot(&tag, request.old, request.new)
        .await
        .map_err(manager_error)?;

    Ok(StatusCode::NO_CONTENT)
}

/// 201 with the report when stored, 409 with the report when the annotation is broken.
pub async fn update_annotation<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
    RequestJson(annotation): RequestJson<Annotation>,
) -> Result<(StatusCode, Json<ValidityReport>), ApiError> {
    let report = manager
        .apply_annotation_update(&tag, annotation)
        .await
        .map_err(|err| match err {
            ManagerError::NoApplicationModel(_) => (
                StatusCode::PRECONDITION_FAILED,
                Json(ErrorResponse::new(&err.to_string())),
            ),
            other => manager_error(other),
        })?;

    let status = if report.is_breaking() {
        StatusCode::CONFLICT
    } else {
        StatusCode::CREATED
    };

    Ok((status, Json(report)))
}

/// The current annotation; a broken tag answers 423 and points to its base annotation.
pub async fn get_annotation<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
    Query(query): Query<AtQuery>,
) -> Result<Json<Annotation>, ApiError> {
    let (broken, annotation) = match query.at {
        Some(at) => (
            manager.is_broken_at(&tag, at).await.map_err(manager_error)?,
            manager.annotation_at(&tag, at).await.map_err(manager_error)?,
        ),
        None => (
            manager.is_broken(&tag).await.map_err(manager_error)?,
            manager.latest_annotation(&tag).await.map_err(manager_error)?,
        ),
    };

    if broken {
        return Err((
            StatusCode::LOCKED,
            Json(ErrorResponse::with_redirect(
                "The annotation is broken and needs to be fixed manually",
                format!("/annotations/{}/base", tag),
            )),
        ));
    }

    annotation
        .map(Json)
        .ok_or_else(|| not_found(format!("No annotation for tag '{}'", tag)))
}

pub async fn get_base_annotation<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
) -> Result<Json<Annotation>, ApiError> {
    manager
        .base_annotation(&tag)
        .await
        .map_err(manager_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("No base annotation for tag '{}'", tag)))
}

pub async fn get_annotation_broken<S: Store>(
    State(manager): State<AppState<S>>,
    Path(tag): Path<String>,
    Query(query): Query<AtQuery>,
) -> Result<Json<BrokenResponse>, ApiError> {
    let broken = match query.at {
        Some(at) => manager.is_broken_at(&tag, at).await,
        None => manager.is_broken(&tag).await,
    }
    .map_err(manager_error)?;

    Ok(Json(BrokenResponse { tag, broken }))
}
