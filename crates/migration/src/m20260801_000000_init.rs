//! Initial schema migration - creates all tables from scratch.
//!
//! It creates the complete schema for ledgerd:
//!
//! - `books`: named account groupings with free-form metadata
//! - `operations`: double-entry operations, retrievable by memo
//! - `entries`: individual signed movements per operation
//! - `book_balances`: derived running balance per (book, asset,
//!   operation-type)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Books {
    Table,
    Id,
    Name,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Operations {
    Table,
    Id,
    OpType,
    Memo,
    Metadata,
    CreatedAt,
}

#[derive(Iden)]
enum Entries {
    Table,
    Id,
    OperationId,
    BookId,
    AssetId,
    Value,
}

#[derive(Iden)]
enum BookBalances {
    Table,
    BookId,
    AssetId,
    OperationType,
    Balance,
    CreatedAt,
    UpdatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Books
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Books::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Books::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Books::Name).string().not_null())
                    .col(ColumnDef::new(Books::Metadata).json())
                    .col(ColumnDef::new(Books::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Books::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-books-name-unique")
                    .table(Books::Table)
                    .col(Books::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Operations
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Operations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Operations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Operations::OpType).string().not_null())
                    .col(ColumnDef::new(Operations::Memo).string().not_null())
                    .col(ColumnDef::new(Operations::Metadata).json())
                    .col(
                        ColumnDef::new(Operations::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-operations-memo-unique")
                    .table(Operations::Table)
                    .col(Operations::Memo)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Entries
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Entries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Entries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Entries::OperationId).string().not_null())
                    .col(ColumnDef::new(Entries::BookId).string().not_null())
                    .col(ColumnDef::new(Entries::AssetId).string().not_null())
                    .col(
                        ColumnDef::new(Entries::Value)
                            .decimal_len(32, 8)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-entries-operation_id")
                            .from(Entries::Table, Entries::OperationId)
                            .to(Operations::Table, Operations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-entries-operation_id")
                    .table(Entries::Table)
                    .col(Entries::OperationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-entries-book_id-asset_id")
                    .table(Entries::Table)
                    .col(Entries::BookId)
                    .col(Entries::AssetId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Book balances
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BookBalances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BookBalances::BookId).string().not_null())
                    .col(ColumnDef::new(BookBalances::AssetId).string().not_null())
                    .col(
                        ColumnDef::new(BookBalances::OperationType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BookBalances::Balance)
                            .decimal_len(32, 8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BookBalances::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BookBalances::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(BookBalances::BookId)
                            .col(BookBalances::AssetId)
                            .col(BookBalances::OperationType),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-book_balances-asset_id")
                    .table(BookBalances::Table)
                    .col(BookBalances::AssetId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(BookBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Entries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Operations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Books::Table).to_owned())
            .await?;
        Ok(())
    }
}
