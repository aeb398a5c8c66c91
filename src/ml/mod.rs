// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All of the network code lives here.
//
// What's in this layer:
//
//   init.rs       — Xavier / constant parameter initialisation
//
//   backbone.rs   — Image feature extractors behind the
//                   `Encoder` trait:
//                   • ResNet-18 trunk (512 features)
//                   • Lite CNN for CPU runs and tests
//
//   head.rs       — 3-layer MLP: features → 2 logits
//
//   model.rs      — Backbone + head, loss, arg-max prediction
//
//   scheduler.rs  — Cosine-annealing learning rate
//
//   trainer.rs    — The training loop with resumable
//                   checkpoints and milestone snapshots
//
//   evaluator.rs  — Accuracy of milestone checkpoints on a
//                   held-out split
//
//   inferencer.rs — Milestone → per-image prediction records
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Training backend: GPU with automatic differentiation
pub type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Evaluation / inference backend: no autodiff, so dropout is
/// inactive and batch-norm uses its running statistics
pub type InferBackend = burn::backend::Wgpu;

/// Parameter initialisation policy
pub mod init;

/// Feature extractors
pub mod backbone;

/// Classification head
pub mod head;

/// Full classifier
pub mod model;

/// Learning-rate schedule
pub mod scheduler;

/// Training loop with checkpointing
pub mod trainer;

/// Milestone accuracy scan
pub mod evaluator;

/// Inference engine — loads a milestone and writes predictions
pub mod inferencer;
