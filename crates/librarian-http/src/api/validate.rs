use axum::extract::State;
use axum::Json;
use librarian_client::{ValidateFileRequest, ValidateFileResponseItem};
use tracing::{debug, warn};

use crate::error::ApiResult;
use crate::AppState;

pub async fn validate_file(
    State(state): State<AppState>,
    Json(req): Json<ValidateFileRequest>,
) -> ApiResult<Json<Vec<ValidateFileResponseItem>>> {
    debug!(file_name = %req.file_name, "validate/file");

    let mut items = Vec::new();

    for instance in state.db.instances_for_file(&req.file_name).await? {
        let Some(store_row) = state.db.get_store(instance.store_id).await? else {
            continue;
        };
        let Ok(store) = state.store(&store_row.name) else {
            continue;
        };

        let original = state.db.get_file(&req.file_name).await?;
        let Some(original) = original else { continue };

        let path = std::path::Path::new(&instance.path);
        let current = match store.resolve_path_store(path) {
            Ok(absolute) => store.path_info(&absolute, original.checksum.algorithm).await,
            Err(err) => Err(err),
        };

        match current {
            Ok(info) => items.push(ValidateFileResponseItem {
                librarian: state.config.site_name.clone(),
                store: store_row.name.clone(),
                instance_id: instance.id,
                original_checksum: original.checksum.clone(),
                original_size: original.size,
                current_checksum: Some(info.checksum.clone()),
                current_size: Some(info.size),
                computed_same_checksum: info.checksum == original.checksum && info.size == original.size,
            }),
            Err(err) => {
                warn!(instance = instance.id, error = %err, "validate/file: could not inspect instance");
                items.push(ValidateFileResponseItem {
                    librarian: state.config.site_name.clone(),
                    store: store_row.name.clone(),
                    instance_id: instance.id,
                    original_checksum: original.checksum.clone(),
                    original_size: original.size,
                    current_checksum: None,
                    current_size: None,
                    computed_same_checksum: false,
                });
            }
        }
    }

    for remote in state.db.remote_instances_for_file(&req.file_name).await? {
        let Some(librarian) = state.db.get_librarian_by_name(&remote.librarian_name).await? else {
            continue;
        };
        let Ok(client) = state.client_for(&librarian) else {
            continue;
        };
        match client.validate_file(&req).await {
            Ok(delegated) => items.extend(delegated),
            Err(err) => warn!(peer = %librarian.name, error = %err, "validate/file: peer delegation failed"),
        }
    }

    Ok(Json(items))
}
