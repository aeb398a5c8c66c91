// ============================================================
// Layer 3 — Sleeve Classes
// ============================================================
// The classifier has exactly two outputs:
//   0 → sleeve       (the garment has sleeves)
//   1 → sleeveless
//
// The numeric code is what ends up in the result JSON and what
// the class-folder index maps to in the labelled dataset.

use serde::{Deserialize, Serialize};

/// Number of logits produced by the classification head
pub const NUM_CLASSES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleeveType {
    Sleeve,
    Sleeveless,
}

impl SleeveType {
    /// All classes in label order
    pub const ALL: [SleeveType; NUM_CLASSES] = [SleeveType::Sleeve, SleeveType::Sleeveless];

    /// The integer class code (also the arg-max index)
    pub fn code(self) -> u8 {
        match self {
            SleeveType::Sleeve     => 0,
            SleeveType::Sleeveless => 1,
        }
    }

    pub fn from_code(code: usize) -> Option<Self> {
        Self::ALL.get(code).copied()
    }

    /// Folder name used for this class in the labelled dataset
    pub fn folder_name(self) -> &'static str {
        match self {
            SleeveType::Sleeve     => "sleeve",
            SleeveType::Sleeveless => "sleeveless",
        }
    }
}
