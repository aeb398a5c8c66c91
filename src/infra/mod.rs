// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles the cross-cutting concerns that don't belong in any
// specific business layer:
//
//   checkpoint.rs   — Versioned training bundles on disk
//                     (model, optimizer, scheduler) plus the
//                     latest/milestone naming convention.
//                     Also saves/loads TrainConfig as JSON so
//                     evaluation can rebuild the same model.
//
//   result_store.rs — Per-product prediction JSON files,
//                     merged into whatever is already there.
//
//   metrics.rs      — Per-batch training loss as a CSV
//                     time series.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Training bundle saving and loading
pub mod checkpoint;

/// Prediction JSON files
pub mod result_store;

/// Training loss CSV logger
pub mod metrics;
