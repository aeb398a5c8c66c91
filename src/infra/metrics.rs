// ============================================================
// Layer 6 — Loss Logger
// ============================================================
// Streams every training-batch loss to a CSV file so a run can
// be plotted while it is still going.
//
// Output file: runs/{run_name}/loss.csv
//
// Example CSV output:
//   step,loss
//   0,0.701234
//   1,0.688100
//   ...
//
// The step is global across epochs:
//   step = epoch_index * steps_per_epoch + batch_index
// so a resumed run keeps appending to the same curve.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Directory that holds one sub-directory per run
pub const RUNS_DIR: &str = "runs";

/// Appends `step,loss` rows for one training run.
pub struct LossLogger {
    csv_path: PathBuf,
}

impl LossLogger {
    /// Logger for `runs/{run_name}/loss.csv`.
    pub fn for_run(run_name: &str) -> Result<Self> {
        Self::new(Path::new(RUNS_DIR).join(run_name))
    }

    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("loss.csv");

        // Resumed runs append to the existing curve
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "step,loss")?;
            tracing::debug!("Created loss CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one batch loss.
    pub fn log(&self, step: usize, loss: f64) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(f, "{step},{loss:.6}")?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// Global step for batch `batch_index` of zero-based epoch `epoch_index`.
pub fn global_step(epoch_index: usize, steps_per_epoch: usize, batch_index: usize) -> usize {
    epoch_index * steps_per_epoch + batch_index
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_counts_across_epochs() {
        assert_eq!(global_step(0, 10, 0), 0);
        assert_eq!(global_step(0, 10, 9), 9);
        // First batch of the second epoch follows the last of the first
        assert_eq!(global_step(1, 10, 0), 10);
        assert_eq!(global_step(4, 7, 3), 31);
    }

    #[test]
    fn appends_rows_after_header() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = LossLogger::new(dir.path().join("run")).unwrap();

        logger.log(0, 0.5).unwrap();
        logger.log(1, 0.25).unwrap();

        // A second logger on the same run keeps the existing rows
        let again = LossLogger::new(dir.path().join("run")).unwrap();
        again.log(2, 0.125).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text, "step,loss\n0,0.500000\n1,0.250000\n2,0.125000\n");
    }
}
