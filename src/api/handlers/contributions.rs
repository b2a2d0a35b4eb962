//! Contribution ingestion from the payment gateway.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::auth::AuthClaims;
use crate::api::dto::{ContributionRequest, ContributionResponse};
use crate::app_state::AppState;
use crate::domain::MemberId;
use crate::error::{ErrorResponse, LedgerError};

/// `POST /contributions` — Credit a confirmed payment as points.
///
/// Webhook deliveries are at-least-once: replaying the same
/// `external_reference` returns the original entry with `200 OK` instead
/// of crediting twice.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `gateway` or `admin`
/// role, [`LedgerError::InvalidRequest`] on a non-positive amount or an
/// empty reference, and [`LedgerError::MemberNotFound`] for unknown
/// members.
#[utoipa::path(
    post,
    path = "/api/v1/contributions",
    tag = "Contributions",
    summary = "Record a confirmed contribution",
    description = "Converts a confirmed payment into a positive ledger entry. Idempotent per `external_reference`: a replay answers 200 with the original entry, a first delivery answers 201.",
    request_body = ContributionRequest,
    responses(
        (status = 201, description = "Contribution credited", body = ContributionResponse),
        (status = 200, description = "Reference already credited", body = ContributionResponse),
        (status = 400, description = "Invalid amount or reference", body = ErrorResponse),
        (status = 403, description = "Gateway or admin role required", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn record_contribution(
    State(state): State<AppState>,
    claims: AuthClaims,
    Json(req): Json<ContributionRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    if !(claims.has_role("gateway") || claims.is_admin()) {
        return Err(LedgerError::Forbidden("contribution ingestion"));
    }

    let outcome = state
        .ledger
        .record_contribution(
            MemberId::from_uuid(req.member_id),
            req.amount,
            &req.external_reference,
        )
        .await?;

    let status = if outcome.already_recorded {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(ContributionResponse {
            entry: outcome.entry,
            new_points: outcome.new_points,
            already_recorded: outcome.already_recorded,
        }),
    ))
}

/// Contribution routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/contributions", post(record_contribution))
}
