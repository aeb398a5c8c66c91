// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe what the classifier works
// with: the two sleeve classes, the per-product result record,
// and the traits other layers implement.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain structs, enums, and traits

// The two output classes and their numeric codes
pub mod sleeve;

// The per-product JSON record written by inference
pub mod result_record;

// Abstractions implemented by the infra layer
pub mod traits;
