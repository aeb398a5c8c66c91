// ============================================================
// Layer 6 — JSON Result Store
// ============================================================
// Writes one `{identifier}.json` per product into an output
// directory. When the file already exists it is read, the
// prediction fields are superimposed, and the file is rewritten
// with every other key intact.
//
// A target that is not valid JSON, or holds something other
// than an object, is an error naming the file. Nothing is
// overwritten in that case.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use crate::domain::{result_record::ResultRecord, traits::PredictionSink};

pub struct JsonResultStore {
    output_dir: PathBuf,
}

impl JsonResultStore {
    /// Creates `output_dir` if it is missing.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Cannot create output directory '{}'", output_dir.display())
        })?;
        Ok(Self { output_dir })
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.output_dir.join(format!("{identifier}.json"))
    }

    fn read_existing(path: &Path) -> Result<Map<String, Value>> {
        if !path.exists() {
            return Ok(Map::new());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Malformed JSON in '{}'", path.display()))?;

        match value {
            Value::Object(map) => Ok(map),
            other => bail!(
                "'{}' holds a JSON {} where an object was expected",
                path.display(),
                json_kind(&other)
            ),
        }
    }
}

impl PredictionSink for JsonResultStore {
    fn write(&self, identifier: &str, record: &ResultRecord) -> Result<()> {
        let path   = self.path_for(identifier);
        let merged = record.merge_into(Self::read_existing(&path)?)?;

        let json = serde_json::to_string(&Value::Object(merged))?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        tracing::debug!("Wrote prediction for '{}'", identifier);
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}
