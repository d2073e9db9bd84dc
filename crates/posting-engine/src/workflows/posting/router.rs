use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::auto_post::AutoPostRequest;
use super::domain::{PostingFilter, PostingId, PostingRequest, PostingUpdate, SessionId};
use super::repository::{PostingRepository, ReferenceData};
use super::service::{PostingService, PostingServiceError};
use super::validation::PostingViolation;

type SharedService<R, D> = Arc<PostingService<R, D>>;

/// Body accepted by the bulk and multi endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingBatch {
    pub postings: Vec<PostingRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationView {
    pub valid: bool,
    pub violations: Vec<PostingViolation>,
}

/// Router builder exposing posting, batch, and reporting endpoints.
pub fn posting_router<R, D>(service: SharedService<R, D>) -> Router
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    Router::new()
        .route(
            "/api/v1/sessions/:session_id/postings",
            post(create_handler::<R, D>).get(list_handler::<R, D>),
        )
        .route(
            "/api/v1/sessions/:session_id/postings/validate",
            post(validate_handler::<R, D>),
        )
        .route(
            "/api/v1/sessions/:session_id/postings/bulk",
            post(bulk_handler::<R, D>),
        )
        .route(
            "/api/v1/sessions/:session_id/postings/multi",
            post(multi_handler::<R, D>),
        )
        .route(
            "/api/v1/sessions/:session_id/postings/auto",
            post(auto_handler::<R, D>),
        )
        .route(
            "/api/v1/sessions/:session_id/postings/statistics",
            get(statistics_handler::<R, D>),
        )
        .route(
            "/api/v1/sessions/:session_id/allowances/summary",
            get(summary_handler::<R, D>),
        )
        .route(
            "/api/v1/postings/:posting_id",
            get(get_handler::<R, D>).patch(update_handler::<R, D>),
        )
        .route(
            "/api/v1/postings/:posting_id/cancel",
            post(cancel_handler::<R, D>),
        )
        .route(
            "/api/v1/postings/:posting_id/propagate",
            post(propagate_handler::<R, D>),
        )
        .with_state(service)
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, PostingServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: PostingServiceError) -> Response {
    let status = err.status_code();
    let payload = match &err {
        PostingServiceError::Validation(violations) => json!({
            "error": "posting rejected",
            "violations": violations,
        }),
        PostingServiceError::Conflict(slot) => json!({
            "error": err.to_string(),
            "slot": slot,
        }),
        other => json!({
            "error": other.to_string(),
        }),
    };
    (status, Json(payload)).into_response()
}

pub(crate) async fn create_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
    Json(request): Json<PostingRequest>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    respond(StatusCode::CREATED, service.create_posting(&session, request))
}

pub(crate) async fn validate_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
    Json(request): Json<PostingRequest>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    let result = service
        .validate_posting(&session, &request)
        .map(|violations| ValidationView {
            valid: violations.is_empty(),
            violations,
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn bulk_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
    Json(batch): Json<PostingBatch>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    respond(
        StatusCode::OK,
        service.bulk_create_postings(&session, batch.postings),
    )
}

pub(crate) async fn multi_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
    Json(batch): Json<PostingBatch>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    respond(
        StatusCode::OK,
        service.create_multi_postings(&session, batch.postings),
    )
}

pub(crate) async fn auto_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
    Json(request): Json<AutoPostRequest>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    respond(StatusCode::OK, service.auto_assign(&session, request))
}

pub(crate) async fn list_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
    Query(filter): Query<PostingFilter>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    respond(StatusCode::OK, service.list_postings(&session, &filter))
}

pub(crate) async fn statistics_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    respond(StatusCode::OK, service.posting_statistics(&session))
}

pub(crate) async fn summary_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(session_id): Path<String>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    let session = SessionId(session_id);
    respond(StatusCode::OK, service.summarize_allowances(&session))
}

pub(crate) async fn get_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(posting_id): Path<u64>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    respond(StatusCode::OK, service.get_posting(PostingId(posting_id)))
}

pub(crate) async fn update_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(posting_id): Path<u64>,
    Json(update): Json<PostingUpdate>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    respond(
        StatusCode::OK,
        service.update_posting(PostingId(posting_id), update),
    )
}

pub(crate) async fn cancel_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(posting_id): Path<u64>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    respond(StatusCode::OK, service.cancel_posting(PostingId(posting_id)))
}

pub(crate) async fn propagate_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(posting_id): Path<u64>,
) -> Response
where
    R: PostingRepository + 'static,
    D: ReferenceData + 'static,
{
    respond(
        StatusCode::OK,
        service.propagate_merged_groups(PostingId(posting_id)),
    )
}
