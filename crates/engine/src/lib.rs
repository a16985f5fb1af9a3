use chrono::Utc;
use sea_orm::{
    ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    QueryFilter, QueryOrder, Statement, TransactionTrait, prelude::*,
};
use uuid::Uuid;

pub use book_balances::{BookBalance, ExcludedBooks, OVERALL_OPERATION};
pub use books::{Book, BookWrite};
pub use entries::Entry;
pub use error::EngineError;
pub use operations::{Operation, OperationMetadata, StoredOperation};

mod book_balances;
mod books;
mod entries;
mod error;
mod operations;

type ResultEngine<T> = Result<T, EngineError>;

/// The ledger engine: persists double-entry operations and maintains the
/// derived book balances.
///
/// Every balance mutation goes through [`modify_balance`]: the balance table
/// has no other admitted write path. The engine holds no in-process locks
/// and never retries; mutual exclusion across concurrent operations is
/// delegated to the storage engine's row locking, and the all-or-nothing
/// guarantee to the caller-owned transaction.
///
/// [`modify_balance`]: Engine::modify_balance
#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    excluded_books: ExcludedBooks,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Applies an operation's effect on book balances inside `txn`.
    ///
    /// The operation's own bucket and the derived OVERALL bucket are
    /// processed as two independent batches: each is re-ordered on an
    /// engine-owned copy (the caller's payload is never mutated), compiled
    /// into one upsert statement per surviving entry, and executed in order.
    /// The first failing statement aborts the rest. The caller owns
    /// commit/rollback, so an error means no balance effect survives.
    pub async fn modify_balance(
        &self,
        operation: &Operation,
        txn: &DatabaseTransaction,
    ) -> ResultEngine<()> {
        let overall = operation.overall_variant()?;
        let backend = self.database.get_database_backend();

        for op in [operation.clone(), overall] {
            let operation_type = op.metadata()?.operation.clone();
            let mut entries = op.entries;
            book_balances::sort_entries(&mut entries);

            let plan = book_balances::plan_entry_upserts(
                backend,
                &entries,
                &operation_type,
                &self.excluded_books,
                Utc::now(),
            )?;
            tracing::debug!(
                memo = %op.memo,
                operation_type = %operation_type,
                statements = plan.len(),
                "applying balance batch"
            );
            self.execute_plan(txn, plan).await?;
        }
        Ok(())
    }

    /// Legacy set-based variant of [`modify_balance`].
    ///
    /// Compiles one statement for a whole batch instead of one per entry,
    /// and skips the clearing books instead of the configured exclusions.
    /// Not safe when the same (book, asset) key appears twice in one batch;
    /// the per-entry path stays the canonical one.
    ///
    /// [`modify_balance`]: Engine::modify_balance
    pub async fn modify_balance_bulk(
        &self,
        operation: &Operation,
        txn: &DatabaseTransaction,
    ) -> ResultEngine<()> {
        let overall = operation.overall_variant()?;
        let backend = self.database.get_database_backend();

        for op in [operation.clone(), overall] {
            let operation_type = op.metadata()?.operation.clone();
            let mut entries = op.entries;
            book_balances::sort_entries(&mut entries);

            if let Some(statement) =
                book_balances::plan_bulk_upsert(backend, &entries, &operation_type, Utc::now())?
            {
                self.execute_plan(txn, vec![statement]).await?;
            }
        }
        Ok(())
    }

    /// Runs a compiled plan in order, stopping on the first failure.
    async fn execute_plan(
        &self,
        txn: &DatabaseTransaction,
        plan: Vec<Statement>,
    ) -> ResultEngine<()> {
        for statement in plan {
            let sql = statement.sql.clone();
            let params = format!("{:?}", statement.values);
            tracing::debug!(sql = %sql, "executing balance statement");
            if let Err(err) = txn.execute(statement).await {
                tracing::error!(sql = %sql, params = %params, error = %err, "balance statement failed");
                return Err(EngineError::Statement { sql, source: err });
            }
        }
        Ok(())
    }

    /// Reads balance rows for a book.
    ///
    /// `asset_id` and `operation_type` are optional filters; when no
    /// operation type is given the OVERALL bucket is served, so callers
    /// asking for "the balance" get the aggregate unless they name a
    /// bucket. Zero matching rows is a normal empty result, not an error.
    /// Runs inside `txn` when given, otherwise on the ambient connection.
    pub async fn get_balance(
        &self,
        book_id: &str,
        asset_id: Option<&str>,
        operation_type: Option<&str>,
        txn: Option<&DatabaseTransaction>,
    ) -> ResultEngine<Vec<BookBalance>> {
        if book_id.trim().is_empty() {
            return Err(EngineError::Validation("book id is missing".to_string()));
        }

        let mut query =
            book_balances::Entity::find().filter(book_balances::Column::BookId.eq(book_id));
        if let Some(asset_id) = asset_id.filter(|id| !id.is_empty()) {
            query = query.filter(book_balances::Column::AssetId.eq(asset_id));
        }
        let operation_type = operation_type
            .filter(|op| !op.is_empty())
            .unwrap_or(OVERALL_OPERATION);
        query = query
            .filter(book_balances::Column::OperationType.eq(operation_type))
            .order_by_asc(book_balances::Column::AssetId);

        let models = match txn {
            Some(txn) => query.all(txn).await?,
            None => query.all(&self.database).await?,
        };
        Ok(models.into_iter().map(BookBalance::from).collect())
    }

    /// Persists an operation and applies its balance effects atomically.
    ///
    /// The operation row, its entries, and both balance buckets are written
    /// inside one transaction; any failure rolls everything back. `memo`
    /// acts as an idempotency key: replaying an already-stored memo returns
    /// the stored operation without touching balances again.
    pub async fn post_operation(&self, operation: &Operation) -> ResultEngine<StoredOperation> {
        // Refuse payloads the planner would reject before opening a
        // transaction.
        operation.metadata()?;

        let txn = self.database.begin().await?;

        if let Some(found) = self.get_operation(&operation.memo, Some(&txn)).await? {
            txn.commit().await?;
            tracing::debug!(memo = %operation.memo, "operation replayed, balances untouched");
            return Ok(found);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json = operation
            .metadata
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| EngineError::Validation(format!("metadata is not serializable: {err}")))?;

        operations::ActiveModel {
            id: ActiveValue::Set(id.clone()),
            op_type: ActiveValue::Set(operation.op_type.clone()),
            memo: ActiveValue::Set(operation.memo.clone()),
            metadata: ActiveValue::Set(metadata_json),
            created_at: ActiveValue::Set(now),
        }
        .insert(&txn)
        .await?;

        for entry in &operation.entries {
            entry.active_model(&id)?.insert(&txn).await?;
        }

        self.modify_balance(operation, &txn).await?;
        txn.commit().await?;

        Ok(StoredOperation {
            id,
            op_type: operation.op_type.clone(),
            memo: operation.memo.clone(),
            metadata: operation.metadata.clone(),
            entries: operation.entries.clone(),
            created_at: now,
        })
    }

    /// Returns the stored operation for a memo, if any.
    pub async fn get_operation(
        &self,
        memo: &str,
        txn: Option<&DatabaseTransaction>,
    ) -> ResultEngine<Option<StoredOperation>> {
        if memo.trim().is_empty() {
            return Err(EngineError::Validation("memo is missing".to_string()));
        }

        let query = operations::Entity::find().filter(operations::Column::Memo.eq(memo));
        let model = match txn {
            Some(txn) => query.one(txn).await?,
            None => query.one(&self.database).await?,
        };
        let Some(model) = model else {
            return Ok(None);
        };

        let entries_query = entries::Entity::find()
            .filter(entries::Column::OperationId.eq(model.id.clone()))
            .order_by_asc(entries::Column::Id);
        let entry_models = match txn {
            Some(txn) => entries_query.all(txn).await?,
            None => entries_query.all(&self.database).await?,
        };

        Ok(Some(StoredOperation::try_from((model, entry_models))?))
    }

    /// Creates the book if the name is unknown, otherwise replaces its
    /// metadata. Reports which of the two happened.
    pub async fn create_or_update_book(
        &self,
        name: &str,
        metadata: Option<serde_json::Value>,
    ) -> ResultEngine<(Book, BookWrite)> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("book name is missing".to_string()));
        }
        let now = Utc::now();

        let existing = books::Entity::find()
            .filter(books::Column::Name.eq(name))
            .one(&self.database)
            .await?;

        match existing {
            Some(model) => {
                let updated = books::ActiveModel {
                    id: ActiveValue::Set(model.id),
                    metadata: ActiveValue::Set(metadata),
                    updated_at: ActiveValue::Set(now),
                    ..Default::default()
                }
                .update(&self.database)
                .await?;
                Ok((Book::from(updated), BookWrite::Updated))
            }
            None => {
                let inserted = books::ActiveModel {
                    id: ActiveValue::NotSet,
                    name: ActiveValue::Set(name.to_string()),
                    metadata: ActiveValue::Set(metadata),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                }
                .insert(&self.database)
                .await?;
                Ok((Book::from(inserted), BookWrite::Created))
            }
        }
    }

    /// Returns a book by id, optionally with its OVERALL balances.
    ///
    /// An id that does not parse or match is an absent book, not an error.
    pub async fn get_book(
        &self,
        book_id: &str,
        with_balance: bool,
    ) -> ResultEngine<Option<(Book, Option<Vec<BookBalance>>)>> {
        let Ok(id) = book_id.trim().parse::<i32>() else {
            return Ok(None);
        };
        let Some(model) = books::Entity::find_by_id(id).one(&self.database).await? else {
            return Ok(None);
        };

        let balances = if with_balance {
            Some(self.get_balance(book_id.trim(), None, None, None).await?)
        } else {
            None
        };
        Ok(Some((Book::from(model), balances)))
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    excluded_books: ExcludedBooks,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Book ids to exclude from per-entry balance tracking.
    pub fn excluded_books(mut self, excluded: ExcludedBooks) -> EngineBuilder {
        self.excluded_books = excluded;
        self
    }

    /// Construct `Engine`
    pub fn build(self) -> Engine {
        Engine {
            database: self.database,
            excluded_books: self.excluded_books,
        }
    }
}
