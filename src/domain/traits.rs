// ============================================================
// Layer 3 — Core Traits
// ============================================================
// The inference loop only knows that predictions go "somewhere".
//
// Implementations:
//   - JsonResultStore → merges records into per-item JSON files

use anyhow::Result;

use crate::domain::result_record::ResultRecord;

// ─── PredictionSink ───────────────────────────────────────────────────────────
/// Any component that can persist a prediction for a named item.
pub trait PredictionSink {
    /// Store `record` for the item called `identifier`.
    fn write(&self, identifier: &str, record: &ResultRecord) -> Result<()>;
}
