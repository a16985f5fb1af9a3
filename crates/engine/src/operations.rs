//! The module contains the operation payload and its persisted form.
//!
//! An operation is the unit the caller submits: a memo, a metadata block
//! naming the balance bucket, and the double-entry list. The engine consumes
//! it read-only; derived variants (the OVERALL twin) are new values.
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EngineError, ResultEngine, book_balances::OVERALL_OPERATION, entries::Entry};

/// Metadata attached to an operation.
///
/// `operation` names the balance bucket the entries aggregate under (for
/// example "BLOCK"). Everything else is carried opaquely and stored as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationMetadata {
    pub operation: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OperationMetadata {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            extra: Map::new(),
        }
    }
}

/// A double-entry operation as received from callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op_type: String,
    pub memo: String,
    pub metadata: Option<OperationMetadata>,
    pub entries: Vec<Entry>,
}

impl Operation {
    /// Returns the metadata block, or the validation error every balance
    /// path reports when it is absent.
    pub fn metadata(&self) -> ResultEngine<&OperationMetadata> {
        self.metadata.as_ref().ok_or_else(|| {
            EngineError::Validation(
                "metadata is not present: book balance rows are keyed by metadata.operation"
                    .to_string(),
            )
        })
    }

    /// Derives the OVERALL twin of this operation: identical entries, with
    /// the metadata operation forced to the sentinel bucket. The receiver is
    /// left untouched.
    pub fn overall_variant(&self) -> ResultEngine<Operation> {
        let mut metadata = self.metadata()?.clone();
        metadata.operation = OVERALL_OPERATION.to_string();
        Ok(Operation {
            metadata: Some(metadata),
            ..self.clone()
        })
    }
}

/// An operation as stored, with its assigned id and creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredOperation {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: String,
    pub memo: String,
    pub metadata: Option<OperationMetadata>,
    pub entries: Vec<Entry>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "operations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub op_type: String,
    pub memo: String,
    pub metadata: Option<Json>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::entries::Entity")]
    Entries,
}

impl Related<super::entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<(Model, Vec<super::entries::Model>)> for StoredOperation {
    type Error = EngineError;

    fn try_from((model, entries): (Model, Vec<super::entries::Model>)) -> ResultEngine<Self> {
        let metadata = model
            .metadata
            .map(serde_json::from_value::<OperationMetadata>)
            .transpose()
            .map_err(|err| {
                EngineError::Validation(format!(
                    "stored metadata for operation {} is malformed: {err}",
                    model.id
                ))
            })?;

        Ok(Self {
            id: model.id,
            op_type: model.op_type,
            memo: model.memo,
            metadata,
            entries: entries.into_iter().map(Entry::from).collect(),
            created_at: model.created_at,
        })
    }
}
