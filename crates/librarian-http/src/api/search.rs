use axum::extract::State;
use axum::Json;
use librarian_client::{SearchFileInstance, SearchFileRemoteInstance, SearchFileRequest, SearchFileResponseItem};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub async fn search_file(
    State(state): State<AppState>,
    Json(req): Json<SearchFileRequest>,
) -> ApiResult<Json<Vec<SearchFileResponseItem>>> {
    debug!(name = ?req.name, "search/file");

    let limit = req
        .max_results
        .map(|n| n as i64)
        .unwrap_or(state.config.max_search_results as i64)
        .min(state.config.max_search_results as i64);

    let files = state
        .db
        .search_files_advanced(
            req.name.as_deref(),
            req.create_time_window,
            req.uploader.as_deref(),
            req.source.as_deref(),
            limit,
        )
        .await?;

    let mut items = Vec::with_capacity(files.len());
    for file in files {
        let mut instances = Vec::new();
        for instance in state.db.instances_for_file(&file.name).await? {
            let store_name = state
                .db
                .get_store(instance.store_id)
                .await?
                .map(|s| s.name)
                .unwrap_or_else(|| format!("store#{}", instance.store_id));
            instances.push(SearchFileInstance {
                id: instance.id,
                store: store_name,
                path: instance.path,
                available: instance.available,
            });
        }

        let remote_instances = state
            .db
            .remote_instances_for_file(&file.name)
            .await?
            .into_iter()
            .map(|ri| SearchFileRemoteInstance {
                librarian: ri.librarian_name,
                store_id: ri.remote_store_id,
                copy_time: ri.copy_time,
            })
            .collect();

        items.push(SearchFileResponseItem {
            name: file.name,
            create_time: file.create_time,
            size: file.size,
            checksum: file.checksum,
            uploader: file.uploader,
            source: file.source,
            instances,
            remote_instances,
        });
    }

    if items.is_empty() {
        return Err(ApiError::not_found("no files matched the search"));
    }

    Ok(Json(items))
}
