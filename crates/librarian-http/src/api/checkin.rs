//! `checkin/status` and `checkin/update`: the symmetric status-reconciliation
//! surface the transfer hypervisors poll (`SPEC_FULL.md` §4.6, §6). Unlike
//! `clone/*`, a single call here can ask about transfers where the callee is
//! either the source (`OutgoingTransfer`) or the destination
//! (`IncomingTransfer`) of the clone, since the same two peers act as both
//! over time.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use librarian_client::{CheckinStatusRequest, CheckinStatusResponse, CheckinUpdateRequest, CheckinUpdateResponse};
use librarian_core::types::{TransferStatus, UserRole};
use tracing::debug;

use crate::auth::{identity, require_role};
use crate::error::ApiResult;
use crate::AppState;

pub async fn status(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<Json<CheckinStatusResponse>> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::Callback)?;
    let axum::extract::Json(req): axum::extract::Json<CheckinStatusRequest> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| crate::error::ApiError::bad_request("invalid request body"))?;

    debug!(
        source_count = req.source_transfer_ids.len(),
        destination_count = req.destination_transfer_ids.len(),
        "checkin/status"
    );

    let mut source_transfer_status = HashMap::new();
    for id in &req.source_transfer_ids {
        let status = match state.db.get_outgoing_transfer(*id).await? {
            Some(transfer) if caller.role().satisfies(UserRole::Admin) || transfer.destination == caller.name() => {
                Some(transfer.status)
            }
            _ => None,
        };
        source_transfer_status.insert(*id, status);
    }

    let mut destination_transfer_status = HashMap::new();
    for id in &req.destination_transfer_ids {
        let status = match state.db.get_incoming_transfer(*id).await? {
            Some(transfer) if caller.role().satisfies(UserRole::Admin) || transfer.source == caller.name() => {
                Some(transfer.status)
            }
            _ => None,
        };
        destination_transfer_status.insert(*id, status);
    }

    Ok(Json(CheckinStatusResponse {
        source_transfer_status,
        destination_transfer_status,
    }))
}

pub async fn update(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> ApiResult<Json<CheckinUpdateResponse>> {
    let caller = identity(&request)?;
    require_role(&caller, UserRole::Callback)?;
    let axum::extract::Json(req): axum::extract::Json<CheckinUpdateRequest> =
        axum::extract::Json::from_request(request, &state)
            .await
            .map_err(|_| crate::error::ApiError::bad_request("invalid request body"))?;

    debug!(
        source_count = req.source_transfer_updates.len(),
        destination_count = req.destination_transfer_updates.len(),
        "checkin/update"
    );

    let mut modified_source_transfer_ids = Vec::new();
    let mut unmodified_source_transfer_ids = Vec::new();
    let mut modified_destination_transfer_ids = Vec::new();
    let mut unmodified_destination_transfer_ids = Vec::new();
    let mut reasons = HashMap::new();

    for (&id, &to) in &req.source_transfer_updates {
        match apply_outgoing(&state, &caller, id, to).await {
            Ok(()) => modified_source_transfer_ids.push(id),
            Err(reason) => {
                unmodified_source_transfer_ids.push(id);
                reasons.insert(id, reason);
            }
        }
    }

    for (&id, &to) in &req.destination_transfer_updates {
        match apply_incoming(&state, &caller, id, to).await {
            Ok(()) => modified_destination_transfer_ids.push(id),
            Err(reason) => {
                unmodified_destination_transfer_ids.push(id);
                reasons.insert(id, reason);
            }
        }
    }

    Ok(Json(CheckinUpdateResponse {
        modified_source_transfer_ids,
        modified_destination_transfer_ids,
        unmodified_source_transfer_ids,
        unmodified_destination_transfer_ids,
        reasons,
    }))
}

/// `checkin/update` never admits a COMPLETED target; that state is reached
/// only by server-side logic that has itself observed durable bytes or a
/// peer acknowledgement (`upload/commit`, `clone/complete`).
fn allowed_update(from: TransferStatus, to: TransferStatus) -> bool {
    to != TransferStatus::Completed && from.can_transition_to(to)
}

async fn apply_outgoing(
    state: &AppState,
    caller: &crate::auth::Identity,
    id: i64,
    to: TransferStatus,
) -> Result<(), String> {
    let transfer = state
        .db
        .get_outgoing_transfer(id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "unknown outgoing transfer".to_string())?;

    if !caller.role().satisfies(UserRole::Admin) && transfer.destination != caller.name() {
        return Err("caller is not the destination of this transfer".to_string());
    }
    if !allowed_update(transfer.status, to) {
        return Err(format!("{} -> {to} is not an allowed update", transfer.status));
    }

    state
        .db
        .set_outgoing_transfer_status(id, transfer.status, to)
        .await
        .map_err(|e| e.to_string())
}

async fn apply_incoming(
    state: &AppState,
    caller: &crate::auth::Identity,
    id: i64,
    to: TransferStatus,
) -> Result<(), String> {
    let transfer = state
        .db
        .get_incoming_transfer(id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "unknown incoming transfer".to_string())?;

    if !caller.role().satisfies(UserRole::Admin) && transfer.source != caller.name() {
        return Err("caller is not the source of this transfer".to_string());
    }
    if !allowed_update(transfer.status, to) {
        return Err(format!("{} -> {to} is not an allowed update", transfer.status));
    }

    state
        .db
        .set_incoming_transfer_status(id, transfer.status, to)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_target_is_never_allowed() {
        assert!(!allowed_update(TransferStatus::Staged, TransferStatus::Completed));
        assert!(!allowed_update(TransferStatus::Ongoing, TransferStatus::Completed));
    }

    #[test]
    fn forward_lattice_transitions_are_allowed() {
        assert!(allowed_update(TransferStatus::Initiated, TransferStatus::Ongoing));
        assert!(allowed_update(TransferStatus::Ongoing, TransferStatus::Staged));
    }

    #[test]
    fn terminal_to_anything_is_rejected() {
        assert!(!allowed_update(TransferStatus::Failed, TransferStatus::Ongoing));
        assert!(!allowed_update(TransferStatus::Cancelled, TransferStatus::Staged));
    }
}
