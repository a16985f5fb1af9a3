//! The module contains the errors the engine can surface.
//!
//! The taxonomy is small on purpose:
//!
//! - [`Validation`] for payloads the engine refuses before touching storage.
//! - [`Statement`] for a compiled balance statement that failed to execute.
//! - [`Database`] for every other storage failure, passed through.
//!
//! [`Validation`]: EngineError::Validation
//! [`Statement`]: EngineError::Statement
//! [`Database`]: EngineError::Database
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing metadata, missing operation type, missing book id, or an
    /// entry value that does not parse as a decimal. Surfaced before any
    /// statement executes.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A compiled balance statement failed. Carries the statement SQL so the
    /// failure can be tied back to the entry that produced it.
    #[error("balance statement failed: {sql}")]
    Statement {
        sql: String,
        #[source]
        source: DbErr,
    },
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (
                Self::Statement {
                    sql: a_sql,
                    source: a_src,
                },
                Self::Statement {
                    sql: b_sql,
                    source: b_src,
                },
            ) => a_sql == b_sql && a_src.to_string() == b_src.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
