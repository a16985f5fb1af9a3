//! Book API endpoints

use api_types::{
    balance::{BalanceGet, BalanceView, BalancesResponse},
    book::{BookGet, BookResponse, BookUpsert, BookUpsertResponse, BookView},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{ServerError, server::ServerState};

fn view(book: engine::Book) -> BookView {
    BookView {
        id: book.id,
        name: book.name,
        metadata: book.metadata,
        created_at: book.created_at,
        updated_at: book.updated_at,
    }
}

fn balance_view(balance: engine::BookBalance) -> BalanceView {
    BalanceView {
        book_id: balance.book_id,
        asset_id: balance.asset_id,
        operation_type: balance.operation_type,
        balance: balance.balance,
    }
}

pub async fn upsert(
    State(state): State<ServerState>,
    Json(payload): Json<BookUpsert>,
) -> Result<Json<BookUpsertResponse>, ServerError> {
    let (book, write) = state
        .engine
        .create_or_update_book(&payload.name, payload.metadata)
        .await?;

    Ok(Json(BookUpsertResponse {
        book: view(book),
        message: format!("{} successful", write.as_str()),
    }))
}

pub async fn get(
    State(state): State<ServerState>,
    Path(book_id): Path<String>,
    Query(query): Query<BookGet>,
) -> Result<Json<BookResponse>, ServerError> {
    let with_balance = query.balance.unwrap_or(false);

    match state.engine.get_book(&book_id, with_balance).await? {
        Some((book, balances)) => Ok(Json(BookResponse {
            book: view(book),
            balances: balances.map(|rows| rows.into_iter().map(balance_view).collect()),
        })),
        None => Err(ServerError::NotFound("book not exists".to_string())),
    }
}

pub async fn get_balance(
    State(state): State<ServerState>,
    Path(book_id): Path<String>,
    Query(query): Query<BalanceGet>,
) -> Result<Json<BalancesResponse>, ServerError> {
    let balances = state
        .engine
        .get_balance(
            &book_id,
            query.asset_id.as_deref(),
            query.operation_type.as_deref(),
            None,
        )
        .await?;

    Ok(Json(BalancesResponse {
        balances: balances.into_iter().map(balance_view).collect(),
    }))
}
