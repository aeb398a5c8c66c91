// ============================================================
// Layer 3 — Result Record
// ============================================================
// One JSON object per product image, named after the image
// identifier. Inference contributes two fields:
//
//   {"sleeve_type": [0], "product_type": "top"}
//
// Other pipeline stages may already have written the same file
// with unrelated keys. Merging overwrites only the keys this
// record carries and keeps everything else.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::sleeve::SleeveType;

/// Category tag written by this stage
pub const PRODUCT_TYPE: &str = "top";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Predicted class codes, one per prediction for this item
    pub sleeve_type: Vec<u8>,

    /// Fixed category tag
    pub product_type: String,
}

impl ResultRecord {
    pub fn new(predictions: &[SleeveType]) -> Self {
        Self {
            sleeve_type:  predictions.iter().map(|p| p.code()).collect(),
            product_type: PRODUCT_TYPE.to_string(),
        }
    }

    /// The record as a bare JSON object, exactly as serde writes it.
    pub fn to_fields(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            _ => Err(serde::ser::Error::custom("result record is not a JSON object")),
        }
    }

    /// Superimpose this record onto an existing object.
    pub fn merge_into(
        &self,
        mut existing: Map<String, Value>,
    ) -> serde_json::Result<Map<String, Value>> {
        existing.extend(self.to_fields()?);
        Ok(existing)
    }
}
