//! `upload/stage` and `upload/commit`: the client-driven staged upload
//! protocol (`SPEC_FULL.md` §4.3). The commit-time ingest procedure mirrors
//! `librarian-background`'s `ReceiveClone::ingest_one`, which runs the same
//! steps for the clone side once bytes have landed in staging.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use librarian_core::types::{AsyncTransferManager, DeletionPolicy, File, TransferStatus, UserRole};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::auth::{identity, require_role};
use crate::error::{ApiError, ApiResult};
use crate::models::{UploadCommitRequest, UploadStageRequest, UploadStageResponse};
use crate::AppState;

pub async fn stage(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<(StatusCode, Json<UploadStageResponse>)> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::ReadAppend)?;
    let axum::extract::Json(req): axum::extract::Json<UploadStageRequest> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| ApiError::bad_request("invalid request body"))?;

    debug!(destination = %req.destination_location, "upload/stage");

    if req.upload_size <= 0 {
        return Err(ApiError::bad_request("upload_size must be positive"));
    }
    if req.upload_size > state.config.maximal_upload_size_bytes {
        return Err(ApiError::payload_too_large("upload_size exceeds the configured maximum"));
    }
    if state.db.get_file(&req.destination_location).await?.is_some() {
        return Err(ApiError::conflict(format!(
            "a file named '{}' already exists",
            req.destination_location
        )));
    }

    if let Some(existing) = state
        .db
        .find_ongoing_incoming_transfer_by_destination(&req.upload_checksum, &req.destination_location)
        .await?
    {
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
        return Err(ApiError::payload_too_large("no store can admit this upload"));
    };

    let (staging_relative, _staging_absolute) = manager.stage(req.upload_size, &req.upload_name).await?;

    let transfer = state
        .db
        .create_incoming_transfer(
            "client",
            &req.uploader,
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

    let mut transfer_providers = HashMap::new();
    transfer_providers.insert(
        "local".to_string(),
        AsyncTransferManager::Local { completed: Vec::new() },
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadStageResponse {
            store_name: store_row.name,
            staging_name: req.upload_name.clone(),
            staging_location: staging_relative.to_string_lossy().to_string(),
            upload_name: req.upload_name,
            destination_location: req.destination_location,
            transfer_providers,
            transfer_id: transfer.id,
        }),
    ))
}

pub async fn commit(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<StatusCode> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::ReadAppend)?;
    let axum::extract::Json(req): axum::extract::Json<UploadCommitRequest> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| ApiError::bad_request("invalid request body"))?;

    debug!(transfer_id = req.transfer_id, provider = %req.transfer_provider, "upload/commit");

    let transfer = state
        .db
        .get_incoming_transfer(req.transfer_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("transfer {} not found", req.transfer_id)))?;

    let store_id = transfer
        .store_id
        .ok_or_else(|| ApiError::bad_request("transfer has no store assigned"))?;
    let staging_path = transfer
        .staging_path
        .clone()
        .ok_or_else(|| ApiError::bad_request("transfer has no staged bytes"))?;
    let store_row = state
        .db
        .get_store(store_id)
        .await?
        .ok_or_else(|| ApiError::not_found("store for transfer no longer exists"))?;
    let store = state.store(&store_row.name)?;

    state
        .db
        .set_incoming_transfer_status(transfer.id, transfer.status, TransferStatus::Staged)
        .await?;

    let staging_relative = std::path::Path::new(&staging_path);
    let staging_absolute = store.resolve_path_staging(staging_relative)?;
    let info = match store.path_info(&staging_absolute, transfer.transfer_checksum.algorithm).await {
        Ok(info) => info,
        Err(err) => {
            store.unstage(staging_relative).await.ok();
            state
                .db
                .set_incoming_transfer_status(transfer.id, TransferStatus::Staged, TransferStatus::Failed)
                .await
                .ok();
            warn!(transfer_id = transfer.id, error = %err, "upload/commit: staged bytes missing");
            return Err(ApiError::not_found("staged bytes are missing"));
        }
    };

    if info.checksum != transfer.transfer_checksum || info.size != transfer.transfer_size {
        store.unstage(staging_relative).await.ok();
        state
            .db
            .set_incoming_transfer_status(transfer.id, TransferStatus::Staged, TransferStatus::Failed)
            .await
            .ok();
        return Err(ApiError::not_acceptable("checksum or size mismatch on commit"));
    }

    let store_path = std::path::Path::new(&transfer.upload_name);
    if let Err(err) = store.reserve(&transfer.upload_name) {
        store.unstage(staging_relative).await.ok();
        state
            .db
            .set_incoming_transfer_status(transfer.id, TransferStatus::Staged, TransferStatus::Failed)
            .await
            .ok();
        return Err(ApiError::conflict(err.to_string()));
    }

    let ingest = async {
        store.commit(staging_relative, store_path).await?;

        let file = File {
            name: transfer.upload_name.clone(),
            size: transfer.transfer_size,
            checksum: transfer.transfer_checksum.clone(),
            uploader: transfer.uploader.clone(),
            source: transfer.source.clone(),
            create_time: chrono::Utc::now(),
        };
        state
            .db
            .complete_ingest(
                &file,
                store_id,
                &transfer.upload_name,
                DeletionPolicy::Allowed,
                transfer.id,
                TransferStatus::Staged,
                TransferStatus::Completed,
            )
            .await?;

        Ok::<(), librarian_core::error::LibrarianError>(())
    }
    .await;

    if let Err(err) = ingest {
        store.unstage(staging_relative).await.ok();
        state
            .db
            .set_incoming_transfer_status(transfer.id, TransferStatus::Staged, TransferStatus::Failed)
            .await
            .ok();
        warn!(transfer_id = transfer.id, error = %err, "upload/commit: ingest failed");
        return Err(err.into());
    }

    Ok(StatusCode::OK)
}
