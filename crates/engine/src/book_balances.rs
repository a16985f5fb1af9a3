//! The module contains the book balance rows and the machinery that mutates
//! them.
//!
//! A balance row is the derived running total per (book, asset,
//! operation-type). Rows are only ever written through the upsert plans
//! compiled here: one atomic update-or-insert statement per entry, executed
//! in the deterministic order fixed by [`sort_entries`] so concurrent
//! operations acquire row locks in the same global sequence.
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{DbBackend, Statement, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine, entries::Entry};

/// Sentinel operation type for the aggregate bucket of a (book, asset) pair
/// across all real operation types. Writes to it are owned by the engine.
pub const OVERALL_OPERATION: &str = "OVERALL";

/// Clearing books, tracked outside the bulk balance path.
pub(crate) const CLEARING_BOOK_IDS: [&str; 2] = ["1", "-1"];

/// A balance row as served to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookBalance {
    pub book_id: String,
    pub asset_id: String,
    pub operation_type: String,
    pub balance: Decimal,
}

/// Book ids excluded from per-entry balance tracking.
///
/// Parsed once from the comma-delimited `EXCLUDED_BALANCE_BOOK_IDS` setting.
/// Membership is exact: excluding "10" does not exclude "1".
#[derive(Clone, Debug, Default)]
pub struct ExcludedBooks(HashSet<String>);

impl ExcludedBooks {
    pub fn from_csv(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, book_id: &str) -> bool {
        self.0.contains(book_id)
    }
}

/// Orders entries ascending by (book_id, asset_id), stably.
///
/// Two operations touching overlapping balance rows must acquire the
/// underlying row locks in one global order, otherwise the storage engine
/// can deadlock them against each other. Only the engine-owned copy is
/// reordered; entries are never dropped or altered.
pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        a.book_id
            .cmp(&b.book_id)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
}

fn validated_operation_type(operation_type: &str) -> ResultEngine<&str> {
    let trimmed = operation_type.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(
            "operation is not present inside metadata: book balance rows are keyed by it"
                .to_string(),
        ));
    }
    Ok(trimmed)
}

/// Compiles one atomic update-or-insert statement per surviving entry.
///
/// Entries whose book id is in `excluded` contribute no statement. Values
/// are parsed here, so a malformed amount fails the whole plan before
/// anything executes.
pub(crate) fn plan_entry_upserts(
    backend: DbBackend,
    entries: &[Entry],
    operation_type: &str,
    excluded: &ExcludedBooks,
    now: DateTime<Utc>,
) -> ResultEngine<Vec<Statement>> {
    let operation_type = validated_operation_type(operation_type)?;

    let mut plan = Vec::with_capacity(entries.len());
    for entry in entries {
        if excluded.contains(&entry.book_id) {
            continue;
        }
        let value = entry.decimal_value()?;
        plan.push(upsert_statement(backend, entry, operation_type, value, now));
    }
    Ok(plan)
}

/// One statement that updates the row for the exact key if it exists and
/// inserts it otherwise, never decomposed into a read followed by a write.
///
/// Postgres hosts the update inside a CTE and gates the insert on the update
/// returning nothing; SQLite and MySQL cannot host DML in a CTE, so they
/// compile their native single-statement conflict clauses. All three shapes
/// keep two concurrent writers of the same key from both inserting.
fn upsert_statement(
    backend: DbBackend,
    entry: &Entry,
    operation_type: &str,
    value: Decimal,
    now: DateTime<Utc>,
) -> Statement {
    match backend {
        DbBackend::Postgres => Statement::from_sql_and_values(
            backend,
            "WITH upsert AS ( \
                UPDATE book_balances \
                SET balance = book_balances.balance + $1, updated_at = $2 \
                WHERE asset_id = $3 AND book_id = $4 AND operation_type = $5 \
                RETURNING * \
            ) \
            INSERT INTO book_balances \
                (book_id, asset_id, operation_type, balance, created_at, updated_at) \
            SELECT $6, $7, $8, $9, $10, $11 \
            WHERE NOT EXISTS (SELECT * FROM upsert)",
            [
                value.into(),
                now.into(),
                entry.asset_id.clone().into(),
                entry.book_id.clone().into(),
                operation_type.into(),
                entry.book_id.clone().into(),
                entry.asset_id.clone().into(),
                operation_type.into(),
                value.into(),
                now.into(),
                now.into(),
            ],
        ),
        DbBackend::Sqlite => Statement::from_sql_and_values(
            backend,
            "INSERT INTO book_balances \
                (book_id, asset_id, operation_type, balance, created_at, updated_at) \
            VALUES (?, ?, ?, ?, ?, ?) \
            ON CONFLICT (book_id, asset_id, operation_type) \
            DO UPDATE SET balance = balance + excluded.balance, \
                updated_at = excluded.updated_at",
            [
                entry.book_id.clone().into(),
                entry.asset_id.clone().into(),
                operation_type.into(),
                value.into(),
                now.into(),
                now.into(),
            ],
        ),
        DbBackend::MySql => Statement::from_sql_and_values(
            backend,
            "INSERT INTO book_balances \
                (book_id, asset_id, operation_type, balance, created_at, updated_at) \
            VALUES (?, ?, ?, ?, ?, ?) \
            ON DUPLICATE KEY UPDATE balance = balance + VALUES(balance), \
                updated_at = VALUES(updated_at)",
            [
                entry.book_id.clone().into(),
                entry.asset_id.clone().into(),
                operation_type.into(),
                value.into(),
                now.into(),
                now.into(),
            ],
        ),
    }
}

/// Compiles the legacy set-based upsert covering a whole batch at once.
///
/// Entries for the clearing books are skipped, and only on this path. One
/// statement covers every surviving entry, which is weaker than the
/// per-entry plan: a key appearing twice in the same batch is folded into a
/// single conflicting row instead of applied twice. Returns `None` when no
/// entry survives.
pub(crate) fn plan_bulk_upsert(
    backend: DbBackend,
    entries: &[Entry],
    operation_type: &str,
    now: DateTime<Utc>,
) -> ResultEngine<Option<Statement>> {
    let operation_type = validated_operation_type(operation_type)?;

    let mut survivors = Vec::with_capacity(entries.len());
    for entry in entries {
        if CLEARING_BOOK_IDS.contains(&entry.book_id.as_str()) {
            continue;
        }
        let value = entry.decimal_value()?;
        survivors.push((entry, value));
    }
    if survivors.is_empty() {
        return Ok(None);
    }

    let statement = match backend {
        DbBackend::Postgres => bulk_unnest_statement(&survivors, operation_type, now),
        DbBackend::Sqlite | DbBackend::MySql => {
            bulk_values_statement(backend, &survivors, operation_type, now)
        }
    };
    Ok(Some(statement))
}

/// Postgres shape: unnest four comma-joined arrays into a data table, update
/// every matching row, and insert the batch only when nothing matched.
fn bulk_unnest_statement(
    survivors: &[(&Entry, Decimal)],
    operation_type: &str,
    now: DateTime<Utc>,
) -> Statement {
    let asset_ids = survivors
        .iter()
        .map(|(entry, _)| entry.asset_id.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let book_ids = survivors
        .iter()
        .map(|(entry, _)| entry.book_id.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let operation_types = vec![operation_type; survivors.len()].join(",");
    let values = survivors
        .iter()
        .map(|(_, value)| value.to_string())
        .collect::<Vec<_>>()
        .join(",");

    Statement::from_sql_and_values(
        DbBackend::Postgres,
        "WITH upsert AS ( \
            UPDATE book_balances \
            SET balance = book_balances.balance + data_table.value, updated_at = $1 \
            FROM ( \
                SELECT unnest(string_to_array($2, ',')) AS asset_id, \
                       unnest(string_to_array($3, ',')) AS book_id, \
                       unnest(string_to_array($4, ',')) AS operation_type, \
                       unnest(string_to_array($5, ',')::numeric[]) AS value \
            ) AS data_table \
            WHERE book_balances.asset_id = data_table.asset_id \
              AND book_balances.book_id = data_table.book_id \
              AND book_balances.operation_type = data_table.operation_type \
            RETURNING * \
        ) \
        INSERT INTO book_balances \
            (asset_id, book_id, operation_type, balance, created_at, updated_at) \
        SELECT unnest(string_to_array($6, ',')), \
               unnest(string_to_array($7, ',')), \
               unnest(string_to_array($8, ',')), \
               unnest(string_to_array($9, ',')::numeric[]), \
               $10, $11 \
        WHERE NOT EXISTS (SELECT * FROM upsert)",
        [
            now.into(),
            asset_ids.clone().into(),
            book_ids.clone().into(),
            operation_types.clone().into(),
            values.clone().into(),
            asset_ids.into(),
            book_ids.into(),
            operation_types.into(),
            values.into(),
            now.into(),
            now.into(),
        ],
    )
}

/// SQLite/MySQL shape: one multi-row insert with the native conflict clause.
fn bulk_values_statement(
    backend: DbBackend,
    survivors: &[(&Entry, Decimal)],
    operation_type: &str,
    now: DateTime<Utc>,
) -> Statement {
    let rows = survivors
        .iter()
        .map(|_| "(?, ?, ?, ?, ?, ?)")
        .collect::<Vec<_>>()
        .join(", ");
    let conflict_clause = match backend {
        DbBackend::MySql => {
            "ON DUPLICATE KEY UPDATE balance = balance + VALUES(balance), \
             updated_at = VALUES(updated_at)"
        }
        _ => {
            "ON CONFLICT (book_id, asset_id, operation_type) \
             DO UPDATE SET balance = balance + excluded.balance, \
             updated_at = excluded.updated_at"
        }
    };
    let sql = format!(
        "INSERT INTO book_balances \
            (book_id, asset_id, operation_type, balance, created_at, updated_at) \
        VALUES {rows} {conflict_clause}"
    );

    let mut params = Vec::with_capacity(survivors.len() * 6);
    for (entry, value) in survivors {
        params.push(entry.book_id.clone().into());
        params.push(entry.asset_id.clone().into());
        params.push(operation_type.into());
        params.push((*value).into());
        params.push(now.into());
        params.push(now.into());
    }
    Statement::from_sql_and_values(backend, sql, params)
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "book_balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub book_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub asset_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub operation_type: String,
    pub balance: Decimal,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for BookBalance {
    fn from(model: Model) -> Self {
        Self {
            book_id: model.book_id,
            asset_id: model.asset_id,
            operation_type: model.operation_type,
            balance: model.balance,
        }
    }
}
