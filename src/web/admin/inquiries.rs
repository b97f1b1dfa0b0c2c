//! Inquiry triage: listing, answering and closing.

use axum::extract::{Path, State};
use axum::response::Json;
use axum_extra::extract::Query;
use serde::Deserialize;
use tracing::{info, instrument};
use ts_rs::TS;

use crate::data::inquiries::{self, Inquiry, InquiryListResponse, TransitionOutcome};
use crate::data::models::InquiryStatus;
use crate::state::AppState;
use crate::web::auth::extractors::AdminUser;
use crate::web::error::{ApiError, db_error};

const MAX_ANSWER_CHARS: usize = 5000;

#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminInquiryParams {
    #[serde(default)]
    pub status: Option<InquiryStatus>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub page: Option<i64>,
    #[serde(default)]
    #[ts(type = "number | null")]
    pub per_page: Option<i64>,
}

/// `GET /api/admin/inquiries?status=`
#[instrument(skip_all)]
pub async fn list(
    AdminUser(_user): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<AdminInquiryParams>,
) -> Result<Json<InquiryListResponse>, ApiError> {
    let response = inquiries::list_inquiries(&state.db_pool, None, params.status, params.page, params.per_page)
        .await
        .map_err(|e| db_error("List inquiries", e))?;
    Ok(Json(response))
}

fn settle(outcome: TransitionOutcome, id: i32) -> Result<Json<Inquiry>, ApiError> {
    match outcome {
        TransitionOutcome::Done(inquiry) => Ok(Json(inquiry)),
        TransitionOutcome::NotFound => Err(ApiError::not_found(format!("Inquiry {id} not found"))),
        TransitionOutcome::AlreadyClosed => Err(ApiError::conflict("Inquiry is already closed")),
    }
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AnswerBody {
    pub answer: String,
}

/// `POST /api/admin/inquiries/{id}/answer`. Re-answering replaces the previous answer.
#[instrument(skip_all, fields(inquiry_id = id))]
pub async fn answer(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<AnswerBody>,
) -> Result<Json<Inquiry>, ApiError> {
    let text = body.answer.trim();
    if text.is_empty() || text.chars().count() > MAX_ANSWER_CHARS {
        return Err(ApiError::bad_request(format!(
            "answer must be 1 to {MAX_ANSWER_CHARS} characters"
        )));
    }
    let outcome = inquiries::answer_inquiry(&state.db_pool, id, admin.id, text)
        .await
        .map_err(|e| db_error("Answer inquiry", e))?;
    if matches!(outcome, TransitionOutcome::Done(_)) {
        info!(admin_id = admin.id, inquiry_id = id, "inquiry answered");
    }
    settle(outcome, id)
}

/// `POST /api/admin/inquiries/{id}/close`
#[instrument(skip_all, fields(inquiry_id = id))]
pub async fn close(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Inquiry>, ApiError> {
    let outcome = inquiries::close_inquiry(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Close inquiry", e))?;
    if matches!(outcome, TransitionOutcome::Done(_)) {
        info!(admin_id = admin.id, inquiry_id = id, "inquiry closed");
    }
    settle(outcome, id)
}
