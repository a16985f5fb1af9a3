//! Operation API endpoints

use api_types::operation::{Entry, OperationGet, OperationNew, OperationResponse, OperationView};
use axum::{
    Json,
    extract::{Query, State},
};
use serde_json::{Map, Value};

use crate::{ServerError, server::ServerState};

/// Maps a wire metadata object onto the engine's typed form.
///
/// The `operation` key names the balance bucket; a missing or non-string
/// value is passed through as empty so the planner reports the validation
/// error instead of the transport layer guessing.
fn to_engine_metadata(mut map: Map<String, Value>) -> engine::OperationMetadata {
    let operation = match map.remove("operation") {
        Some(Value::String(operation)) => operation,
        _ => String::new(),
    };
    engine::OperationMetadata {
        operation,
        extra: map,
    }
}

fn to_engine_operation(payload: OperationNew) -> engine::Operation {
    engine::Operation {
        op_type: payload.op_type,
        memo: payload.memo,
        metadata: payload.metadata.map(to_engine_metadata),
        entries: payload
            .entries
            .into_iter()
            .map(|entry| engine::Entry::new(entry.book_id, entry.asset_id, entry.value))
            .collect(),
    }
}

fn view(stored: engine::StoredOperation) -> OperationView {
    OperationView {
        id: stored.id,
        op_type: stored.op_type,
        memo: stored.memo,
        metadata: stored
            .metadata
            .and_then(|metadata| serde_json::to_value(metadata).ok()),
        entries: stored
            .entries
            .into_iter()
            .map(|entry| Entry {
                book_id: entry.book_id,
                asset_id: entry.asset_id,
                value: entry.value,
            })
            .collect(),
        created_at: stored.created_at,
    }
}

pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<OperationNew>,
) -> Result<Json<OperationResponse>, ServerError> {
    let operation = to_engine_operation(payload);
    let stored = state.engine.post_operation(&operation).await?;

    Ok(Json(OperationResponse {
        operation: view(stored),
    }))
}

pub async fn get_by_memo(
    State(state): State<ServerState>,
    Query(query): Query<OperationGet>,
) -> Result<Json<OperationResponse>, ServerError> {
    let memo = query
        .memo
        .filter(|memo| !memo.is_empty())
        .ok_or_else(|| ServerError::Generic("memo is not provided".to_string()))?;

    match state.engine.get_operation(&memo, None).await? {
        Some(stored) => Ok(Json(OperationResponse {
            operation: view(stored),
        })),
        None => Err(ServerError::NotFound("operation not exists".to_string())),
    }
}
