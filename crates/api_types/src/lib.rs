use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod operation {
    use super::*;

    /// One signed movement against a (book, asset) pair.
    ///
    /// `value` is a signed decimal encoded as text; the engine parses it and
    /// rejects anything that is not a decimal.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct Entry {
        pub book_id: String,
        pub asset_id: String,
        pub value: String,
    }

    /// Request body for posting an operation.
    ///
    /// `metadata` is free-form except for the `operation` key, which names
    /// the balance bucket the entries aggregate under.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct OperationNew {
        #[serde(rename = "type")]
        pub op_type: String,
        pub memo: String,
        pub metadata: Option<Map<String, Value>>,
        pub entries: Vec<Entry>,
    }

    /// Query string for fetching an operation.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct OperationGet {
        pub memo: Option<String>,
    }

    /// A stored operation.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct OperationView {
        pub id: String,
        #[serde(rename = "type")]
        pub op_type: String,
        pub memo: String,
        pub metadata: Option<Value>,
        pub entries: Vec<Entry>,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct OperationResponse {
        pub operation: OperationView,
    }
}

pub mod book {
    use super::*;

    /// Request body for creating or updating a book by name.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct BookUpsert {
        pub name: String,
        pub metadata: Option<Value>,
    }

    /// Query string for fetching a book.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct BookGet {
        pub balance: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BookView {
        pub id: i32,
        pub name: String,
        pub metadata: Option<Value>,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    /// Response for the create-or-update endpoint; `message` reports which
    /// of the two writes happened.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct BookUpsertResponse {
        pub book: BookView,
        pub message: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BookResponse {
        pub book: BookView,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub balances: Option<Vec<super::balance::BalanceView>>,
    }
}

pub mod balance {
    use super::*;

    /// Query string for reading balances; omitting `operation_type` serves
    /// the OVERALL aggregate.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct BalanceGet {
        pub asset_id: Option<String>,
        pub operation_type: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BalanceView {
        pub book_id: String,
        pub asset_id: String,
        pub operation_type: String,
        pub balance: Decimal,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BalancesResponse {
        pub balances: Vec<BalanceView>,
    }
}
