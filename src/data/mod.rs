// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from image files on disk all
// the way to normalised tensor batches.
//
// The pipeline flows in this order:
//
//   image folders
//       │
//       ▼
//   LabelledImageDataset /   → list files, decode + resize one
//   NamedImageDataset          image per `get`
//       │
//       ▼
//   BatchStream              → shuffles, groups full batches,
//       │                      decodes ahead on worker threads
//       ▼
//   ImageBatcher             → stacks items into tensors and
//       │                      applies ImageNet normalisation
//       ▼
//   training / evaluation / inference loops
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §16 (Fearless Concurrency)

/// Image folders as Burn datasets
pub mod dataset;

/// Prefetching, drop-last batch iterator
pub mod batch_stream;

/// Turns dataset items into tensor batches
pub mod batcher;
