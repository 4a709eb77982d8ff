// src/receipt.rs

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single purchased line item as the model reports it.
///
/// Deserialization never fails: missing fields become `""`, numbers are
/// rendered as their decimal text, anything else degrades to `""`.
/// `harga` is decimal-looking text and is deliberately not validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    #[serde(default, deserialize_with = "de_stringlike")]
    pub nama: String,
    #[serde(default, deserialize_with = "de_stringlike")]
    pub harga: String,
}

/// An extraction result before the user has confirmed it. No identity yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    pub tanggal: String,
    pub toko: String,
    pub total: String,
    pub items: Vec<ReceiptItem>,
}

impl ReceiptDraft {
    /// How many of the three scalar fields came back non-empty.
    pub fn filled_fields(&self) -> (usize, usize) {
        let filled = [&self.tanggal, &self.toko, &self.total]
            .iter()
            .filter(|v| !v.is_empty())
            .count();
        (filled, 3)
    }
}

/// The row shape the datastore hands back, id and timestamps included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredReceipt {
    pub id: Option<String>,
    pub tanggal: String,
    pub toko: String,
    pub total: f64,
    pub items: Vec<ReceiptItem>,
    pub image_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// The insert payload for a confirmed receipt. `total` has already been
/// coerced to a number by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct NewReceipt {
    pub tanggal: String,
    pub toko: String,
    pub total: f64,
    pub items: Vec<ReceiptItem>,
    pub image_url: Option<String>,
}

/// Coerce whatever object the model produced into a fixed-shape draft.
///
/// Total and idempotent: unknown, missing, or wrongly-typed fields become
/// safe defaults instead of errors. The model's output is unreliable by
/// nature and nothing downstream should ever see its raw shape.
pub fn normalize(raw: &Value) -> ReceiptDraft {
    let field = |name: &str| {
        raw.get(name)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string()
    };

    let items = match raw.get("items").and_then(Value::as_array) {
        Some(arr) => arr
            .iter()
            .map(|el| serde_json::from_value(el.clone()).unwrap_or_default())
            .collect(),
        None => Vec::new(),
    };

    ReceiptDraft {
        tanggal: field("tanggal"),
        toko: field("toko"),
        total: field("total"),
        items,
    }
}

/// Per-field form messages. A draft failing validation never reaches the
/// network; these strings are shown next to the inputs.
#[derive(Debug, Clone, Default, PartialEq, Error)]
#[error("{}", join_messages(.tanggal, .toko, .total))]
pub struct ValidationErrors {
    pub tanggal: Option<String>,
    pub toko: Option<String>,
    pub total: Option<String>,
}

fn join_messages(
    tanggal: &Option<String>,
    toko: &Option<String>,
    total: &Option<String>,
) -> String {
    [tanggal, toko, total]
        .iter()
        .filter_map(|m| m.as_deref())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check a draft against the submission rules: date present, store name
/// non-blank, total a positive number.
pub fn validate_draft(draft: &ReceiptDraft) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if draft.tanggal.is_empty() {
        errors.tanggal = Some("Tanggal wajib diisi".to_string());
    }
    if draft.toko.trim().is_empty() {
        errors.toko = Some("Nama toko wajib diisi".to_string());
    }
    if draft.total.trim().is_empty() {
        errors.total = Some("Total belanja wajib diisi".to_string());
    } else {
        match draft.total.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => {}
            _ => errors.total = Some("Total belanja harus berupa angka positif".to_string()),
        }
    }

    if errors.tanggal.is_none() && errors.toko.is_none() && errors.total.is_none() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn stringlike(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn de_stringlike<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(de)?;
    Ok(stringlike(&v))
}

pub(crate) fn de_opt_stringlike<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(de)?;
    Ok(v.as_ref().map(stringlike))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_missing_keys() {
        let draft = normalize(&json!({}));
        assert_eq!(draft.tanggal, "");
        assert_eq!(draft.toko, "");
        assert_eq!(draft.total, "");
        assert!(draft.items.is_empty());
    }

    #[test]
    fn test_normalize_wrong_types() {
        let draft = normalize(&json!({
            "tanggal": 20251021,
            "toko": null,
            "total": ["125000"],
            "items": "not an array"
        }));
        assert_eq!(draft.tanggal, "");
        assert_eq!(draft.toko, "");
        assert_eq!(draft.total, "");
        assert!(draft.items.is_empty());
    }

    #[test]
    fn test_normalize_keeps_well_formed_fields() {
        let draft = normalize(&json!({
            "tanggal": "2025-10-21",
            "toko": "Indomaret Cibodas",
            "total": "125000",
            "items": [{"nama": "Mie Goreng", "harga": "3000"}]
        }));
        assert_eq!(draft.tanggal, "2025-10-21");
        assert_eq!(draft.toko, "Indomaret Cibodas");
        assert_eq!(draft.total, "125000");
        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.items[0].nama, "Mie Goreng");
        assert_eq!(draft.items[0].harga, "3000");
    }

    #[test]
    fn test_normalize_items_lenient_per_element() {
        let draft = normalize(&json!({
            "items": [
                {"nama": "Air Mineral", "harga": 5000},
                {"harga": "3000"},
                {"nama": {"nested": true}},
                "just a string",
                42
            ]
        }));
        // Length preserved, every element coerced to the item shape
        assert_eq!(draft.items.len(), 5);
        assert_eq!(draft.items[0].harga, "5000");
        assert_eq!(draft.items[1].nama, "");
        assert_eq!(draft.items[1].harga, "3000");
        assert_eq!(draft.items[2].nama, "");
        assert_eq!(draft.items[3], ReceiptItem::default());
        assert_eq!(draft.items[4], ReceiptItem::default());
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize(&json!({
            "tanggal": "2025-10-21",
            "total": 125000,
            "items": [{"nama": "Mie Goreng", "harga": 3000}]
        }));
        let again = normalize(&serde_json::to_value(&once).unwrap());
        assert_eq!(once, again);
    }

    #[test]
    fn test_filled_fields() {
        let draft = normalize(&json!({"tanggal": "2025-10-21", "toko": "Indomaret"}));
        assert_eq!(draft.filled_fields(), (2, 3));
    }

    #[test]
    fn test_validate_complete_draft() {
        let draft = ReceiptDraft {
            tanggal: "2025-10-21".to_string(),
            toko: "Indomaret Cibodas".to_string(),
            total: "1".to_string(),
            items: vec![],
        };
        assert!(validate_draft(&draft).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let errors = validate_draft(&ReceiptDraft::default()).unwrap_err();
        assert_eq!(errors.tanggal.as_deref(), Some("Tanggal wajib diisi"));
        assert_eq!(errors.toko.as_deref(), Some("Nama toko wajib diisi"));
        assert_eq!(errors.total.as_deref(), Some("Total belanja wajib diisi"));
    }

    #[test]
    fn test_validate_total_must_be_positive_number() {
        for bad in ["0", "-5", "abc", "NaN"] {
            let draft = ReceiptDraft {
                tanggal: "2025-10-21".to_string(),
                toko: "Indomaret".to_string(),
                total: bad.to_string(),
                items: vec![],
            };
            let errors = validate_draft(&draft).unwrap_err();
            assert_eq!(
                errors.total.as_deref(),
                Some("Total belanja harus berupa angka positif"),
                "total {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_store_name_whitespace_only() {
        let draft = ReceiptDraft {
            tanggal: "2025-10-21".to_string(),
            toko: "   ".to_string(),
            total: "125000".to_string(),
            items: vec![],
        };
        let errors = validate_draft(&draft).unwrap_err();
        assert_eq!(errors.toko.as_deref(), Some("Nama toko wajib diisi"));
        assert!(errors.tanggal.is_none());
    }

    #[test]
    fn test_stored_receipt_tolerates_sparse_rows() {
        let row: StoredReceipt = serde_json::from_str(
            r#"{"id": "7c9e1f7a", "tanggal": "2025-10-21", "toko": "Indomaret", "total": 125000}"#,
        )
        .unwrap();
        assert_eq!(row.id.as_deref(), Some("7c9e1f7a"));
        assert_eq!(row.total, 125000.0);
        assert!(row.items.is_empty());
        assert!(row.image_url.is_none());
    }
}
