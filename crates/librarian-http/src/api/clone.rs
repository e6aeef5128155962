//! The `clone/*` endpoints: the peer-to-peer mirror of the upload protocol
//! (`SPEC_FULL.md` §4.4), plus the transfer-status advance/fail endpoints a
//! source peer drives on the destination's record of a clone.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use librarian_client::{
    CloneAckResponse, CloneBatchStageRequest, CloneBatchStageResponse, CloneCompleteRequest,
    CloneStageRequest, CloneStageResponseItem, CloneTransferIdPair,
};
use librarian_core::error::{LibrarianError, Result as CoreResult};
use librarian_core::types::{AsyncTransferManager, TransferStatus, UserRole};
use tracing::{debug, warn};

use crate::auth::{identity, require_role};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

enum StageOutcome {
    Accepted(CloneStageResponseItem),
    Conflict,
    TooEarly,
    NotAcceptable,
}

async fn stage_one(state: &AppState, req: &CloneStageRequest) -> CoreResult<StageOutcome> {
    if state.db.get_file(&req.destination_location).await?.is_some() {
        return Ok(StageOutcome::Conflict);
    }

    if let Some(existing) = state
        .db
        .find_ongoing_incoming_transfer_by_destination(&req.upload_checksum, &req.destination_location)
        .await?
    {
        if existing.status == TransferStatus::Ongoing {
            return Ok(StageOutcome::TooEarly);
        }

        if let Some(store_id) = existing.store_id {
            if let Some(store_row) = state.db.get_store(store_id).await? {
                if let Ok(store) = state.store(&store_row.name) {
                    if let Some(staging_path) = &existing.staging_path {
                        store.unstage(std::path::Path::new(staging_path)).await.ok();
                    }
                }
            }
        }
        state
            .db
            .set_incoming_transfer_status(existing.id, existing.status, TransferStatus::Failed)
            .await
            .ok();
        return Ok(StageOutcome::NotAcceptable);
    }

    let stores = state.db.list_stores().await?;
    let mut chosen = None;
    for store_row in stores {
        if !store_row.ingestable || !store_row.enabled {
            continue;
        }
        let Ok(manager) = state.store(&store_row.name) else { continue };
        if !manager.available() {
            continue;
        }
        let Ok(free) = manager.free_space() else { continue };
        if free >= req.upload_size {
            chosen = Some((store_row, manager));
            break;
        }
    }

    let Some((store_row, manager)) = chosen else {
        return Err(LibrarianError::StoreFull(format!(
            "no store can admit clone of '{}'",
            req.destination_location
        )));
    };

    let (staging_relative, _absolute) = manager.stage(req.upload_size, &req.upload_name).await?;

    let transfer = state
        .db
        .create_incoming_transfer(
            &req.source_name,
            &req.source_name,
            &req.destination_location,
            req.upload_size,
            &req.upload_checksum,
            None,
        )
        .await?;
    state
        .db
        .set_incoming_transfer_staging(transfer.id, store_row.id, &staging_relative.to_string_lossy())
        .await?;
    state
        .db
        .set_incoming_transfer_store_path(transfer.id, &req.destination_location)
        .await?;
    state
        .db
        .set_incoming_transfer_source_transfer_id(transfer.id, req.source_transfer_id)
        .await?;

    let mut providers = HashMap::new();
    providers.insert("local".to_string(), AsyncTransferManager::Local { completed: Vec::new() });

    Ok(StageOutcome::Accepted(CloneStageResponseItem {
        staging_location: staging_relative.to_string_lossy().to_string(),
        destination_transfer_id: transfer.id,
        async_transfer_providers: providers,
    }))
}

pub async fn stage(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<(StatusCode, Json<CloneStageResponseItem>)> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::ReadAppend)?;
    let axum::extract::Json(req): axum::extract::Json<CloneStageRequest> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| ApiError::bad_request("invalid request body"))?;

    debug!(destination = %req.destination_location, source = %req.source_name, "clone/stage");

    match stage_one(&state, &req).await? {
        StageOutcome::Accepted(item) => Ok((StatusCode::CREATED, Json(item))),
        StageOutcome::Conflict => Err(ApiError::conflict(format!(
            "a file named '{}' already exists",
            req.destination_location
        ))
        .with_source_transfer_id(req.source_transfer_id)),
        StageOutcome::TooEarly => Err(ApiError::too_early(
            "a clone for this (checksum, destination) is already ongoing",
        )
        .with_source_transfer_id(req.source_transfer_id)),
        StageOutcome::NotAcceptable => Err(ApiError::not_acceptable(
            "a stale staged transfer for this (checksum, destination) was failed; retry",
        )
        .with_source_transfer_id(req.source_transfer_id)),
    }
}

pub async fn batch_stage(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<(StatusCode, Json<CloneBatchStageResponse>)> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::ReadAppend)?;
    let axum::extract::Json(req): axum::extract::Json<CloneBatchStageRequest> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| ApiError::bad_request("invalid request body"))?;

    debug!(count = req.uploads.len(), "clone/batch_stage");

    let mut accepted = HashMap::new();
    let mut worst: Option<StatusCode> = None;

    for upload in &req.uploads {
        match stage_one(&state, upload).await {
            Ok(StageOutcome::Accepted(item)) => {
                accepted.insert(upload.source_transfer_id, item);
            }
            Ok(StageOutcome::TooEarly) => worst = dominant(worst, StatusCode::TOO_EARLY),
            Ok(StageOutcome::Conflict) => worst = dominant(worst, StatusCode::CONFLICT),
            Ok(StageOutcome::NotAcceptable) => worst = dominant(worst, StatusCode::NOT_ACCEPTABLE),
            Err(err) => {
                warn!(source_transfer_id = upload.source_transfer_id, error = %err, "clone/batch_stage: item failed");
                worst = dominant(worst, StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    if accepted.is_empty() {
        let status = worst.unwrap_or(StatusCode::BAD_REQUEST);
        return Err(ApiError::new(
            status,
            "no upload in this batch could be staged",
            "reconcile each source_transfer_id against the destination and retry individually",
        ));
    }

    Ok((StatusCode::CREATED, Json(CloneBatchStageResponse { uploads: accepted })))
}

/// `425 > 409 > 406` precedence; a later, lower-priority outcome never
/// overrides an earlier, higher-priority one.
fn dominant(current: Option<StatusCode>, candidate: StatusCode) -> Option<StatusCode> {
    fn rank(status: StatusCode) -> u8 {
        match status {
            StatusCode::TOO_EARLY => 3,
            StatusCode::CONFLICT => 2,
            StatusCode::NOT_ACCEPTABLE => 1,
            _ => 0,
        }
    }

    match current {
        Some(existing) if rank(existing) >= rank(candidate) => Some(existing),
        _ => Some(candidate),
    }
}

pub async fn ongoing(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<Json<CloneAckResponse>> {
    advance(state, request, TransferStatus::Initiated, TransferStatus::Ongoing).await
}

pub async fn staged(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<Json<CloneAckResponse>> {
    advance(state, request, TransferStatus::Ongoing, TransferStatus::Staged).await
}

async fn advance(
    state: AppState,
    request: axum::extract::Request,
    expected_from: TransferStatus,
    to: TransferStatus,
) -> ApiResult<Json<CloneAckResponse>> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::Callback)?;
    let axum::extract::Json(req): axum::extract::Json<CloneTransferIdPair> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| ApiError::bad_request("invalid request body"))?;

    debug!(destination_transfer_id = req.destination_transfer_id, ?to, "clone transfer advance");

    let transfer = state
        .db
        .get_incoming_transfer(req.destination_transfer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown destination transfer"))?;

    if transfer.status != expected_from {
        return Err(ApiError::not_acceptable(format!(
            "transfer is {}, not {expected_from}",
            transfer.status
        ))
        .with_source_transfer_id(req.source_transfer_id)
        .with_destination_transfer_id(req.destination_transfer_id));
    }

    state
        .db
        .set_incoming_transfer_status(transfer.id, transfer.status, to)
        .await?;

    Ok(Json(CloneAckResponse { success: true }))
}

pub async fn complete(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<Json<CloneAckResponse>> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::Callback)?;
    let axum::extract::Json(req): axum::extract::Json<CloneCompleteRequest> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| ApiError::bad_request("invalid request body"))?;

    debug!(source_transfer_id = req.source_transfer_id, "clone/complete");

    let peer_name = caller.name().to_string();
    let transfer = state
        .db
        .get_outgoing_transfer(req.source_transfer_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("no such outgoing transfer"))?;

    if transfer.destination != peer_name && !caller.role().satisfies(UserRole::Admin) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "caller is not the destination of this transfer",
            "call clone/complete as the registered destination peer",
        ));
    }

    if !matches!(transfer.status, TransferStatus::Ongoing | TransferStatus::Staged) {
        return Err(ApiError::not_acceptable(format!(
            "transfer is {}, not ongoing or staged",
            transfer.status
        ))
        .with_source_transfer_id(req.source_transfer_id)
        .with_destination_transfer_id(req.destination_transfer_id));
    }

    state
        .db
        .set_outgoing_transfer_status(transfer.id, transfer.status, TransferStatus::Completed)
        .await?;
    if state
        .db
        .find_remote_instance(&transfer.file_name, &transfer.destination, req.remote_store_id)
        .await?
        .is_none()
    {
        state
            .db
            .create_remote_instance(&transfer.file_name, &transfer.destination, req.remote_store_id, &state.config.site_name)
            .await?;
    }

    Ok(Json(CloneAckResponse { success: true }))
}

pub async fn fail(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<Json<CloneAckResponse>> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::ReadAppend)?;
    let axum::extract::Json(req): axum::extract::Json<CloneTransferIdPair> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| ApiError::bad_request("invalid request body"))?;

    debug!(destination_transfer_id = req.destination_transfer_id, "clone/fail");

    let transfer = state
        .db
        .get_incoming_transfer(req.destination_transfer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown destination transfer"))?;

    let authorized = caller.role().satisfies(UserRole::Admin)
        || caller.name() == transfer.source
        || caller.name() == transfer.uploader;
    if !authorized {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "caller is not the uploader of this transfer",
            "call clone/fail as the uploading peer or an administrator",
        ));
    }

    if let Some(store_id) = transfer.store_id {
        if let Some(store_row) = state.db.get_store(store_id).await? {
            if let Ok(store) = state.store(&store_row.name) {
                if let Some(staging_path) = &transfer.staging_path {
                    store.unstage(std::path::Path::new(staging_path)).await.ok();
                }
            }
        }
    }

    state
        .db
        .set_incoming_transfer_status(transfer.id, transfer.status, TransferStatus::Failed)
        .await?;

    Ok(Json(CloneAckResponse { success: true }))
}
