//! Member lifecycle and read-model handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::AuthClaims;
use crate::api::dto::{
    LedgerHistoryResponse, MemberListParams, MemberListResponse, PaginationMeta, PaginationParams,
    RegisterMemberRequest, UpdateMemberRequest,
};
use crate::app_state::AppState;
use crate::domain::{Allocation, Balance, Member, MemberId, MemberSummary};
use crate::error::{ErrorResponse, LedgerError};

/// `POST /members` — Register the authenticated identity as a member.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidRequest`] on a missing identity header,
/// an empty display name or a negative monthly target, and
/// [`LedgerError::MemberAlreadyRegistered`] when the identity already has
/// a ledger.
#[utoipa::path(
    post,
    path = "/api/v1/members",
    tag = "Members",
    summary = "Register a member",
    description = "Creates a ledger for the identity in `X-Member-Id`. The profile carries a display name, an optional monthly contribution target, and an optional referral code.",
    request_body = RegisterMemberRequest,
    responses(
        (status = 201, description = "Member registered", body = Member),
        (status = 400, description = "Missing identity or invalid profile", body = ErrorResponse),
        (status = 409, description = "Identity already registered", body = ErrorResponse),
    )
)]
pub async fn register_member(
    State(state): State<AppState>,
    claims: AuthClaims,
    Json(req): Json<RegisterMemberRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let member_id = claims.member()?;
    let member = state
        .ledger
        .register_member(
            member_id,
            &req.display_name,
            req.monthly_target,
            req.referral_code,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// `GET /members` — List member summaries with pagination.
///
/// # Errors
///
/// Returns [`LedgerError`] on internal failures.
#[utoipa::path(
    get,
    path = "/api/v1/members",
    tag = "Members",
    summary = "List members",
    description = "Returns paginated member summaries in join order. `active_only=true` omits deactivated members.",
    params(MemberListParams),
    responses(
        (status = 200, description = "Paginated member list", body = MemberListResponse),
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    Query(params): Query<MemberListParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let pagination = params.pagination().clamped();
    let summaries = state.ledger.list_members(params.active_only).await;

    let total = summaries.len();
    let data: Vec<MemberSummary> = summaries
        .into_iter()
        .skip(pagination.offset())
        .take(pagination.per_page as usize)
        .collect();

    Ok(Json(MemberListResponse {
        data,
        pagination: PaginationMeta::from_params(&pagination, total),
    }))
}

/// `GET /members/{id}` — Member profile plus derived balance.
///
/// # Errors
///
/// Returns [`LedgerError::MemberNotFound`] for unknown ids and
/// [`LedgerError::Consistency`] when the ledger fold fails.
#[utoipa::path(
    get,
    path = "/api/v1/members/{id}",
    tag = "Members",
    summary = "Get member summary",
    description = "Returns the member profile together with the folded balance, held slots, and freeze state.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
    ),
    responses(
        (status = 200, description = "Member summary", body = MemberSummary),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn get_member(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let summary = state.ledger.member_summary(MemberId::from_uuid(id)).await?;
    Ok(Json(summary))
}

/// `PUT /members/{id}` — Update the mutable parts of a profile.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] unless the caller is the member or
/// an admin, and [`LedgerError::InvalidRequest`] on invalid fields.
#[utoipa::path(
    put,
    path = "/api/v1/members/{id}",
    tag = "Members",
    summary = "Update member profile",
    description = "Changes the display name and/or monthly target. Members may update their own profile; admins may update anyone's.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
    ),
    request_body = UpdateMemberRequest,
    responses(
        (status = 200, description = "Updated member", body = Member),
        (status = 403, description = "Not the member or an admin", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn update_member(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let member_id = MemberId::from_uuid(id);
    claims.require_self_or_admin(member_id, "profile update")?;
    let member = state
        .ledger
        .update_profile(member_id, req.display_name, req.monthly_target)
        .await?;
    Ok(Json(member))
}

/// `DELETE /members/{id}` — Deactivate a member.
///
/// The ledger history is retained; any held slots are force-released so
/// event capacity frees up.
///
/// # Errors
///
/// Returns [`LedgerError::Forbidden`] without the `admin` role and
/// [`LedgerError::MemberNotFound`] for unknown ids.
#[utoipa::path(
    delete,
    path = "/api/v1/members/{id}",
    tag = "Members",
    summary = "Deactivate a member",
    description = "Marks the member inactive and force-releases any held slots. Deactivation is idempotent and never deletes ledger history.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
    ),
    responses(
        (status = 204, description = "Member deactivated"),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn deactivate_member(
    State(state): State<AppState>,
    claims: AuthClaims,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    claims.require_admin("member deactivation")?;
    let member_id = MemberId::from_uuid(id);
    state.ledger.deactivate_member(member_id).await?;
    state.coordinator.release_all_for_member(member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /members/{id}/balance` — Folded balance and derived slots.
///
/// # Errors
///
/// Returns [`LedgerError::MemberNotFound`] for unknown ids and
/// [`LedgerError::Consistency`] when the fold fails.
#[utoipa::path(
    get,
    path = "/api/v1/members/{id}/balance",
    tag = "Members",
    summary = "Get member balance",
    description = "Folds the member's ledger and returns the points total with the whole slots it covers.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
    ),
    responses(
        (status = 200, description = "Current balance", body = Balance),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let balance = state.projector.balance_of(MemberId::from_uuid(id)).await?;
    Ok(Json(balance))
}

/// `GET /members/{id}/ledger` — Paginated statement in append order.
///
/// # Errors
///
/// Returns [`LedgerError::MemberNotFound`] for unknown ids.
#[utoipa::path(
    get,
    path = "/api/v1/members/{id}/ledger",
    tag = "Members",
    summary = "Get ledger statement",
    description = "Returns the member's ledger entries in append order, paginated.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Ledger statement page", body = LedgerHistoryResponse),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn get_ledger(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let params = params.clamped();
    let (data, total) = state
        .projector
        .ledger_entries(
            MemberId::from_uuid(id),
            params.offset(),
            params.per_page as usize,
        )
        .await?;

    Ok(Json(LedgerHistoryResponse {
        data,
        pagination: PaginationMeta::from_params(&params, total),
    }))
}

/// `GET /members/{id}/allocations` — All of a member's allocations.
///
/// # Errors
///
/// Returns [`LedgerError::MemberNotFound`] for unknown ids.
#[utoipa::path(
    get,
    path = "/api/v1/members/{id}/allocations",
    tag = "Members",
    summary = "List member allocations",
    description = "Returns the member's allocations across all events, newest first, including released and fulfilled ones.",
    params(
        ("id" = uuid::Uuid, Path, description = "Member UUID"),
    ),
    responses(
        (status = 200, description = "Member allocations", body = [Allocation]),
        (status = 404, description = "Member not found", body = ErrorResponse),
    )
)]
pub async fn get_member_allocations(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, LedgerError> {
    let allocations = state
        .coordinator
        .member_allocations(MemberId::from_uuid(id))
        .await?;
    Ok(Json(allocations))
}

/// Member routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/members", post(register_member).get(list_members))
        .route(
            "/members/{id}",
            get(get_member).put(update_member).delete(deactivate_member),
        )
        .route("/members/{id}/balance", get(get_balance))
        .route("/members/{id}/ledger", get(get_ledger))
        .route("/members/{id}/allocations", get(get_member_allocations))
}
