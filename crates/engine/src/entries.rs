//! The module contains the `Entry` type: one signed value movement against a
//! (book, asset) pair inside an operation.
use rust_decimal::Decimal;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// A single signed movement.
///
/// `value` is kept in its wire form, a signed decimal encoded as text, and is
/// parsed exactly once at the planning/persistence boundary. A malformed
/// amount becomes a validation error there, never a truncated balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub book_id: String,
    pub asset_id: String,
    pub value: String,
}

impl Entry {
    pub fn new(
        book_id: impl Into<String>,
        asset_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            book_id: book_id.into(),
            asset_id: asset_id.into(),
            value: value.into(),
        }
    }

    /// Parses the wire value into a [`Decimal`].
    pub fn decimal_value(&self) -> ResultEngine<Decimal> {
        self.value.trim().parse::<Decimal>().map_err(|_| {
            EngineError::Validation(format!(
                "entry value {:?} for book {} is not a decimal",
                self.value, self.book_id
            ))
        })
    }

    /// Builds the row to persist under `operation_id`, parsing the value.
    pub(crate) fn active_model(&self, operation_id: &str) -> ResultEngine<ActiveModel> {
        Ok(ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            operation_id: ActiveValue::Set(operation_id.to_string()),
            book_id: ActiveValue::Set(self.book_id.clone()),
            asset_id: ActiveValue::Set(self.asset_id.clone()),
            value: ActiveValue::Set(self.decimal_value()?),
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub operation_id: String,
    pub book_id: String,
    pub asset_id: String,
    pub value: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::operations::Entity",
        from = "Column::OperationId",
        to = "super::operations::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Operations,
}

impl Related<super::operations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Operations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Entry {
    fn from(model: Model) -> Self {
        Self {
            book_id: model.book_id,
            asset_id: model.asset_id,
            value: model.value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_value_parses_signed_text() {
        assert_eq!(
            Entry::new("3", "btc", "-1").decimal_value().unwrap(),
            Decimal::from(-1)
        );
        assert_eq!(
            Entry::new("4", "btc", " 10.50 ").decimal_value().unwrap(),
            "10.50".parse::<Decimal>().unwrap()
        );
    }

    #[test]
    fn decimal_value_rejects_garbage() {
        let err = Entry::new("3", "btc", "one").decimal_value().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
