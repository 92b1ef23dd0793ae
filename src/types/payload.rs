use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// `{ success, data: T }`
    Wrapped,
    /// `{ success, data: { data: T, pagination } }`
    Paginated,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub total: Option<u64>,
    pub total_pages: Option<u64>,
}

/// A response body after envelope normalization. Reconciliation only ever sees `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub shape: PayloadShape,
    pub body: serde_json::Value,
    pub pagination: Option<Pagination>,
}

impl Payload {
    pub fn wrapped(body: serde_json::Value) -> Self {
        Self {
            shape: PayloadShape::Wrapped,
            body,
            pagination: None,
        }
    }

    pub fn unrecognized() -> Self {
        Self {
            shape: PayloadShape::Unrecognized,
            body: serde_json::Value::Null,
            pagination: None,
        }
    }
}
