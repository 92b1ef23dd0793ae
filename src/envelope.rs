use serde_json::{Map, Value};

use crate::coerce;
use crate::types::payload::{Pagination, Payload, PayloadShape};

/// The response envelopes the backend is known to use.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Wrapped {
        data: Value,
    },
    Paginated {
        data: Value,
        pagination: Pagination,
    },
    /// `success: false`. The fetch itself worked but the backend refused it.
    Rejected {
        message: String,
    },
    Unrecognized,
}

impl Envelope {
    pub fn classify(raw: Value) -> Self {
        let Value::Object(mut obj) = raw else {
            return Envelope::Unrecognized;
        };
        let Some(success) = obj.get("success").and_then(Value::as_bool) else {
            return Envelope::Unrecognized;
        };
        if !success {
            return Envelope::Rejected {
                message: rejection_message(&obj),
            };
        }
        let Some(data) = obj.remove("data") else {
            return Envelope::Unrecognized;
        };
        match data {
            Value::Object(mut inner) if inner.contains_key("data") && inner.contains_key("pagination") => {
                let pagination = parse_pagination(inner.get("pagination"));
                let data = inner.remove("data").unwrap_or(Value::Null);
                Envelope::Paginated { data, pagination }
            }
            data => Envelope::Wrapped { data },
        }
    }

    pub fn into_payload(self) -> Result<Payload, String> {
        match self {
            Envelope::Wrapped { data } => Ok(Payload::wrapped(data)),
            Envelope::Paginated { data, pagination } => Ok(Payload {
                shape: PayloadShape::Paginated,
                body: data,
                pagination: Some(pagination),
            }),
            Envelope::Rejected { message } => Err(message),
            Envelope::Unrecognized => Ok(Payload::unrecognized()),
        }
    }
}

/// Normalize a raw response. Only a `success: false` envelope is an error;
/// unknown shapes become an empty payload that every lookup misses.
pub fn normalize(raw: Value) -> Result<Payload, String> {
    Envelope::classify(raw).into_payload()
}

fn rejection_message(obj: &Map<String, Value>) -> String {
    let candidates = [
        obj.get("message"),
        obj.get("error").and_then(|e| e.get("message")),
        obj.get("error"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| "request reported failure".to_string())
}

fn parse_pagination(raw: Option<&Value>) -> Pagination {
    let field = |camel: &str, snake: &str| -> Option<u64> {
        let raw = raw?;
        let value = raw.get(camel).or_else(|| raw.get(snake));
        coerce::parse_finite(value).map(|_| coerce::to_count(value, 0))
    };
    Pagination {
        page: field("page", "page"),
        limit: field("limit", "limit"),
        total: field("total", "total"),
        total_pages: field("totalPages", "total_pages"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_wrapped_envelope() {
        let raw = json!({"success": true, "data": {"system_health": {"overall_score": 92.5}}});
        let payload = normalize(raw).unwrap();
        assert_eq!(payload.shape, PayloadShape::Wrapped);
        assert_eq!(payload.body["system_health"]["overall_score"], 92.5);
        assert!(payload.pagination.is_none());
    }

    #[test]
    fn classifies_paginated_envelope() {
        let raw = json!({
            "success": true,
            "data": {
                "data": [{"id": 1}, {"id": 2}],
                "pagination": {"page": 1, "limit": 20, "total": 42, "totalPages": 3}
            }
        });
        let payload = normalize(raw).unwrap();
        assert_eq!(payload.shape, PayloadShape::Paginated);
        assert_eq!(payload.body.as_array().unwrap().len(), 2);
        let pagination = payload.pagination.unwrap();
        assert_eq!(pagination.total, Some(42));
        assert_eq!(pagination.total_pages, Some(3));
    }

    #[test]
    fn snake_case_pagination_keys_are_accepted() {
        let raw = json!({
            "success": true,
            "data": {"data": [], "pagination": {"total": "7", "total_pages": 1}}
        });
        let pagination = normalize(raw).unwrap().pagination.unwrap();
        assert_eq!(pagination.total, Some(7));
        assert_eq!(pagination.total_pages, Some(1));
        assert_eq!(pagination.page, None);
    }

    #[test]
    fn wrapped_object_with_only_inner_data_is_not_paginated() {
        let raw = json!({"success": true, "data": {"data": {"x": 1}}});
        let payload = normalize(raw).unwrap();
        assert_eq!(payload.shape, PayloadShape::Wrapped);
        assert_eq!(payload.body["data"]["x"], 1);
    }

    #[test]
    fn success_false_is_an_error_with_backend_message() {
        let raw = json!({"success": false, "message": "Unauthorized"});
        assert_eq!(normalize(raw).unwrap_err(), "Unauthorized");

        let nested = json!({"success": false, "error": {"message": "quota exceeded"}});
        assert_eq!(normalize(nested).unwrap_err(), "quota exceeded");

        let bare = json!({"success": false});
        assert_eq!(normalize(bare).unwrap_err(), "request reported failure");
    }

    #[test]
    fn unknown_shapes_are_reconciliation_misses() {
        for raw in [
            json!([1, 2, 3]),
            json!({"items": []}),
            json!({"success": "yes", "data": {}}),
            json!({"success": true}),
            json!("ok"),
        ] {
            let payload = normalize(raw).unwrap();
            assert_eq!(payload.shape, PayloadShape::Unrecognized);
            assert!(payload.body.is_null());
        }
    }
}
