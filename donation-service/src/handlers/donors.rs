//! Donor list and detail endpoints. Both sit behind `require_edit_posts`.

use crate::dtos::{DonorListResponse, DonorResponse, ListDonorsQuery};
use crate::middleware::UserContext;
use crate::services::DonorListFilter;
use crate::startup::AppState;
use crate::utils::DateRange;
use axum::extract::{Path, Query, State};
use axum::Json;
use service_core::error::AppError;

const DEFAULT_PER_PAGE: u32 = 30;
const MAX_PER_PAGE: u32 = 100;

pub async fn list_donors(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<ListDonorsQuery>,
) -> Result<Json<DonorListResponse>, AppError> {
    let range = DateRange::parse(query.start.as_deref(), query.end.as_deref())?;

    let filter = DonorListFilter {
        start: range.start,
        end: range.end,
        page: query.page.unwrap_or(1).max(1),
        per_page: query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE),
    };

    let (donors, total) = state.donors.list(&filter).await?;

    tracing::debug!(
        user_id = %user.user_id,
        returned = donors.len(),
        total,
        "Listed donors"
    );

    Ok(Json(DonorListResponse {
        donors: donors.into_iter().map(DonorResponse::from).collect(),
        total,
        page: filter.page,
        per_page: filter.per_page,
    }))
}

pub async fn get_donor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DonorResponse>, AppError> {
    let donor = state
        .donors
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Donor {} not found", id)))?;

    Ok(Json(donor.into()))
}
