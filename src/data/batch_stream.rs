// ============================================================
// Layer 4 — Prefetching Batch Stream
// ============================================================
// Feeds fixed-size batches of dataset items to the main loop.
//
//   producer thread ──► rayon pool (num_workers) decodes one
//         │             batch worth of items in parallel
//         ▼
//   bounded channel (PREFETCH_DEPTH batches)
//         │
//         ▼
//   main loop: `for batch in stream { ... }`
//
// Tensors are NOT built here: items stay plain Rust values and
// the batcher turns them into tensors on the main thread.
//
// Ordering:
//   - `shuffled(.., seed)` permutes the indices with StdRng
//   - `sequential(..)` keeps dataset order
// The trailing partial batch is always dropped, so every batch
// has exactly `batch_size` items.
//
// Dropping the stream early disconnects the channel and the
// producer stops after its current batch.

use std::{
    sync::{mpsc, Arc},
    thread,
};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;

use crate::data::dataset::{DatasetError, TryDataset};

/// Batches decoded ahead of the consumer
pub const PREFETCH_DEPTH: usize = 2;

pub struct BatchStream<I> {
    receiver: mpsc::Receiver<Result<Vec<I>, DatasetError>>,
    steps:    usize,
}

impl<I: Send + 'static> BatchStream<I> {
    /// Full batches only, in the given index order.
    pub fn new<D>(dataset: Arc<D>, order: Vec<usize>, batch_size: usize, num_workers: usize) -> Self
    where
        D: TryDataset<I> + 'static,
    {
        let batch_size = batch_size.max(1);
        let steps      = order.len() / batch_size;
        let (sender, receiver) = mpsc::sync_channel(PREFETCH_DEPTH);

        thread::spawn(move || {
            let pool = match rayon::ThreadPoolBuilder::new()
                .num_threads(num_workers.max(1))
                .build()
            {
                Ok(pool) => pool,
                Err(e) => {
                    let _ = sender.send(Err(DatasetError::Workers(e.to_string())));
                    return;
                }
            };

            for chunk in order.chunks_exact(batch_size) {
                let batch: Result<Vec<I>, DatasetError> = pool.install(|| {
                    chunk.par_iter().map(|&index| dataset.try_get(index)).collect()
                });
                let failed = batch.is_err();

                // Receiver gone: the consumer stopped early
                if sender.send(batch).is_err() || failed {
                    return;
                }
            }
        });

        Self { receiver, steps }
    }

    /// A fresh permutation of the whole dataset from `seed`.
    pub fn shuffled<D>(dataset: Arc<D>, batch_size: usize, seed: u64, num_workers: usize) -> Self
    where
        D: TryDataset<I> + 'static,
    {
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        Self::new(dataset, order, batch_size, num_workers)
    }

    pub fn sequential<D>(dataset: Arc<D>, batch_size: usize, num_workers: usize) -> Self
    where
        D: TryDataset<I> + 'static,
    {
        let order = (0..dataset.len()).collect();
        Self::new(dataset, order, batch_size, num_workers)
    }
}

impl<I> BatchStream<I> {
    /// Number of batches this stream yields.
    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl<I> Iterator for BatchStream<I> {
    type Item = Result<Vec<I>, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}
