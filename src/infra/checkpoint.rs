// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores training bundles:
//
//   { epoch, state_dict, optimizer, scheduler }
//
// The three state blobs are independently versioned sections
// inside one envelope file, so evaluation can decode the model
// weights even when the optimizer or scheduler layout changed.
//
// Envelope layout:
//   [8 bytes]  magic "SLVCKPT1"
//   [8 bytes]  header length, little-endian u64
//   [N bytes]  JSON header {epoch, sections: [{name, version, len}]}
//   [...]      section payloads, in header order
//
// Model and optimizer payloads are Burn records encoded with the
// binary bytes recorder (full precision). The scheduler payload
// is the JSON of its state.
//
// File naming convention:
//   weights/
//     sleeve_clf_Adam.ckpt           ← latest, overwritten every epoch
//     sleeve_clf_Adam_5.ckpt         ← milestone after epoch 5
//     sleeve_clf_Adam_10.ckpt        ← milestone after epoch 10
//     sleeve_clf_Adam.config.json    ← training configuration
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use burn::{
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Record, Recorder},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::train_use_case::TrainConfig;
use crate::ml::scheduler::CosineAnnealingLr;

pub const MAGIC: &[u8; 8] = b"SLVCKPT1";

pub const STATE_DICT: &str = "state_dict";
pub const OPTIMIZER:  &str = "optimizer";
pub const SCHEDULER:  &str = "scheduler";

pub const STATE_DICT_VERSION: u32 = 1;
pub const OPTIMIZER_VERSION:  u32 = 1;
pub const SCHEDULER_VERSION:  u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint found at '{0}'")]
    NotFound(PathBuf),

    #[error("milestone checkpoint for epoch {epoch} not found at '{path}'")]
    MissingMilestone { epoch: usize, path: PathBuf },

    #[error("'{0}' is not a checkpoint file")]
    BadMagic(PathBuf),

    #[error("'{path}' is truncated: {what} needs {needed} bytes, {available} remain")]
    Truncated {
        path:      PathBuf,
        what:      String,
        needed:    u64,
        available: u64,
    },

    #[error("checkpoint has no '{0}' section")]
    MissingSection(String),

    #[error("checkpoint section '{section}' has version {found}, expected {expected}")]
    IncompatibleSection {
        section:  &'static str,
        found:    u32,
        expected: u32,
    },

    #[error("cannot encode or decode record: {0}")]
    Record(String),

    #[error("checkpoint header: {0}")]
    Header(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ─── Bundle ───────────────────────────────────────────────────────────────────

/// One versioned state blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub version: u32,
    pub payload: Vec<u8>,
}

impl Section {
    pub fn new(version: u32, payload: Vec<u8>) -> Self {
        Self { version, payload }
    }

    fn checked(&self, name: &'static str, expected: u32) -> Result<&[u8], CheckpointError> {
        if self.version != expected {
            return Err(CheckpointError::IncompatibleSection {
                section: name,
                found:   self.version,
                expected,
            });
        }
        Ok(&self.payload)
    }
}

/// Everything needed to resume training after `epoch` completed epochs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointBundle {
    pub epoch:      usize,
    pub state_dict: Section,
    pub optimizer:  Section,
    pub scheduler:  Section,
}

impl CheckpointBundle {
    /// Build a bundle from already-encoded model/optimizer records and
    /// the scheduler state.
    pub fn new(
        epoch:      usize,
        state_dict: Vec<u8>,
        optimizer:  Vec<u8>,
        scheduler:  &CosineAnnealingLr,
    ) -> Result<Self, CheckpointError> {
        Ok(Self {
            epoch,
            state_dict: Section::new(STATE_DICT_VERSION, state_dict),
            optimizer:  Section::new(OPTIMIZER_VERSION, optimizer),
            scheduler:  Section::new(SCHEDULER_VERSION, serde_json::to_vec(scheduler)?),
        })
    }

    /// Decode the model weights.
    pub fn model_record<B: Backend, R: Record<B>>(
        &self,
        device: &B::Device,
    ) -> Result<R, CheckpointError> {
        let bytes = self.state_dict.checked(STATE_DICT, STATE_DICT_VERSION)?;
        decode_record::<B, R>(bytes, device)
    }

    /// Decode the optimizer moments.
    pub fn optimizer_record<B: Backend, R: Record<B>>(
        &self,
        device: &B::Device,
    ) -> Result<R, CheckpointError> {
        let bytes = self.optimizer.checked(OPTIMIZER, OPTIMIZER_VERSION)?;
        decode_record::<B, R>(bytes, device)
    }

    /// Decode the learning-rate schedule.
    pub fn scheduler_state(&self) -> Result<CosineAnnealingLr, CheckpointError> {
        let bytes = self.scheduler.checked(SCHEDULER, SCHEDULER_VERSION)?;
        Ok(serde_json::from_slice(bytes)?)
    }

    fn sections(&self) -> [(&'static str, &Section); 3] {
        [
            (STATE_DICT, &self.state_dict),
            (OPTIMIZER,  &self.optimizer),
            (SCHEDULER,  &self.scheduler),
        ]
    }
}

/// Serialise any Burn record to bytes.
pub fn encode_record<B: Backend, R: Record<B>>(record: R) -> Result<Vec<u8>, CheckpointError> {
    let recorder: BinBytesRecorder<FullPrecisionSettings> = BinBytesRecorder::default();
    Recorder::<B>::record(&recorder, record, ())
        .map_err(|e| CheckpointError::Record(format!("{e:?}")))
}

/// Inverse of [`encode_record`].
pub fn decode_record<B: Backend, R: Record<B>>(
    bytes:  &[u8],
    device: &B::Device,
) -> Result<R, CheckpointError> {
    let recorder: BinBytesRecorder<FullPrecisionSettings> = BinBytesRecorder::default();
    Recorder::<B>::load(&recorder, bytes.to_vec(), device)
        .map_err(|e| CheckpointError::Record(format!("{e:?}")))
}

// ─── Envelope I/O ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    epoch:    usize,
    sections: Vec<SectionHeader>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SectionHeader {
    name:    String,
    version: u32,
    len:     u64,
}

/// Write `bundle` to `path`, replacing any existing file.
pub fn save(bundle: &CheckpointBundle, path: &Path) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let header = EnvelopeHeader {
        epoch:    bundle.epoch,
        sections: bundle
            .sections()
            .iter()
            .map(|(name, section)| SectionHeader {
                name:    name.to_string(),
                version: section.version,
                len:     section.payload.len() as u64,
            })
            .collect(),
    };
    let header_json = serde_json::to_vec(&header)?;

    // Write next to the target, then rename into place
    let tmp = temp_path(path);
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        out.write_all(MAGIC)?;
        out.write_all(&(header_json.len() as u64).to_le_bytes())?;
        out.write_all(&header_json)?;
        for (_, section) in bundle.sections() {
            out.write_all(&section.payload)?;
        }
        out.flush()?;
    }
    fs::rename(&tmp, path)?;

    tracing::debug!("Wrote checkpoint (epoch {}) to '{}'", bundle.epoch, path.display());
    Ok(())
}

/// Read a bundle. A missing file is reported as [`CheckpointError::NotFound`];
/// a length running past the end of the file as [`CheckpointError::Truncated`].
pub fn load(path: &Path) -> Result<CheckpointBundle, CheckpointError> {
    if !path.is_file() {
        return Err(CheckpointError::NotFound(path.to_path_buf()));
    }
    let file      = File::open(path)?;
    let mut left  = file.metadata()?.len();
    let mut input = BufReader::new(file);

    let mut magic = [0u8; 8];
    if input.read_exact(&mut magic).is_err() || &magic != MAGIC {
        return Err(CheckpointError::BadMagic(path.to_path_buf()));
    }
    left -= MAGIC.len() as u64;

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&read_bounded(&mut input, path, "header length", 8, &mut left)?);
    let header_len  = u64::from_le_bytes(len_bytes);
    let header_json = read_bounded(&mut input, path, "header", header_len, &mut left)?;
    let header: EnvelopeHeader = serde_json::from_slice(&header_json)?;

    // Unknown sections are read past and dropped.
    let mut sections = HashMap::new();
    for entry in header.sections {
        let what    = format!("section '{}'", entry.name);
        let payload = read_bounded(&mut input, path, &what, entry.len, &mut left)?;
        sections.insert(entry.name, Section::new(entry.version, payload));
    }
    let mut take = |name: &str| {
        sections
            .remove(name)
            .ok_or_else(|| CheckpointError::MissingSection(name.to_string()))
    };

    Ok(CheckpointBundle {
        epoch:      header.epoch,
        state_dict: take(STATE_DICT)?,
        optimizer:  take(OPTIMIZER)?,
        scheduler:  take(SCHEDULER)?,
    })
}

/// Read `len` bytes, refusing lengths larger than what is left in the file.
fn read_bounded(
    input: &mut impl Read,
    path:  &Path,
    what:  &str,
    len:   u64,
    left:  &mut u64,
) -> Result<Vec<u8>, CheckpointError> {
    if len > *left {
        return Err(CheckpointError::Truncated {
            path:      path.to_path_buf(),
            what:      what.to_string(),
            needed:    len,
            available: *left,
        });
    }
    let mut buf = Vec::with_capacity(len as usize);
    input.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(CheckpointError::Truncated {
            path:      path.to_path_buf(),
            what:      what.to_string(),
            needed:    len,
            available: buf.len() as u64,
        });
    }
    *left -= len;
    Ok(buf)
}

/// `weights/x.ckpt`, 25 → `weights/x_25.ckpt`
pub fn milestone_path(base: &Path, epoch: usize) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{epoch}.{}", ext.to_string_lossy()),
        None      => format!("{stem}_{epoch}"),
    };
    base.with_file_name(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "checkpoint".into());
    name.push(".tmp");
    path.with_file_name(name)
}

// ─── CheckpointManager ────────────────────────────────────────────────────────

/// Owns the naming of one run's checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    /// Path of the "latest" bundle; milestones are derived from it
    latest: PathBuf,
}

impl CheckpointManager {
    pub fn new(weights_path: impl Into<PathBuf>) -> Self {
        Self { latest: weights_path.into() }
    }

    pub fn latest_path(&self) -> &Path {
        &self.latest
    }

    pub fn milestone_path(&self, epoch: usize) -> PathBuf {
        milestone_path(&self.latest, epoch)
    }

    /// `Ok(None)` when training has never written a checkpoint.
    pub fn load_latest(&self) -> Result<Option<CheckpointBundle>, CheckpointError> {
        match load(&self.latest) {
            Ok(bundle)                          => Ok(Some(bundle)),
            Err(CheckpointError::NotFound(_))   => Ok(None),
            Err(e)                              => Err(e),
        }
    }

    pub fn load_milestone(&self, epoch: usize) -> Result<CheckpointBundle, CheckpointError> {
        match load(&self.milestone_path(epoch)) {
            Err(CheckpointError::NotFound(path)) => {
                Err(CheckpointError::MissingMilestone { epoch, path })
            }
            other => other,
        }
    }

    pub fn save_latest(&self, bundle: &CheckpointBundle) -> Result<(), CheckpointError> {
        save(bundle, &self.latest)
    }

    /// Save under the epoch-suffixed name and return that path.
    pub fn save_milestone(&self, bundle: &CheckpointBundle) -> Result<PathBuf, CheckpointError> {
        let path = self.milestone_path(bundle.epoch);
        save(bundle, &path)?;
        Ok(path)
    }

    /// `weights/x.ckpt` → `weights/x.config.json`
    pub fn config_path(&self) -> PathBuf {
        self.latest.with_extension("config.json")
    }

    /// Persist the training configuration so `val`/`test` can rebuild
    /// the same backbone.
    pub fn save_config(&self, cfg: &TrainConfig) -> anyhow::Result<()> {
        let path = self.config_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// `Ok(None)` when no configuration was saved for this run.
    pub fn load_config(&self) -> anyhow::Result<Option<TrainConfig>> {
        let path = self.config_path();
        if !path.is_file() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        let cfg = serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))?;
        Ok(Some(cfg))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::module::Module;

    use crate::ml::head::{ClassificationHead, ClassificationHeadConfig};

    type TestBackend = NdArray;

    fn sample_bundle(epoch: usize) -> CheckpointBundle {
        let scheduler = CosineAnnealingLr::new(1e-4, 1e-6, 50);
        CheckpointBundle::new(epoch, vec![1, 2, 3, 4], vec![9; 17], &scheduler).unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir    = tempfile::tempdir().unwrap();
        let path   = dir.path().join("weights").join("run.ckpt");
        let bundle = sample_bundle(7);

        save(&bundle, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, bundle);
        assert_eq!(loaded.scheduler_state().unwrap(), CosineAnnealingLr::new(1e-4, 1e-6, 50));
    }

    #[test]
    fn save_overwrites_existing_file() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.ckpt");

        save(&sample_bundle(1), &path).unwrap();
        save(&sample_bundle(2), &path).unwrap();

        assert_eq!(load(&path).unwrap().epoch, 2);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn milestone_path_inserts_epoch_before_extension() {
        assert_eq!(
            milestone_path(Path::new("weights/x.pkl"), 25),
            PathBuf::from("weights/x_25.pkl")
        );
        assert_eq!(
            milestone_path(Path::new("weights/sleeve_clf_Adam.ckpt"), 5),
            PathBuf::from("weights/sleeve_clf_Adam_5.ckpt")
        );
        assert_eq!(milestone_path(Path::new("model"), 10), PathBuf::from("model_10"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope.ckpt")).unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[test]
    fn missing_latest_means_fresh_start() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("run.ckpt"));
        assert!(manager.load_latest().unwrap().is_none());
    }

    #[test]
    fn missing_milestone_is_an_error() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("run.ckpt"));

        let err = manager.load_milestone(25).unwrap_err();
        match err {
            CheckpointError::MissingMilestone { epoch, path } => {
                assert_eq!(epoch, 25);
                assert_eq!(path, dir.path().join("run_25.ckpt"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn manager_writes_milestones_next_to_latest() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("run.ckpt"));

        let written = manager.save_milestone(&sample_bundle(10)).unwrap();

        assert_eq!(written, dir.path().join("run_10.ckpt"));
        assert_eq!(manager.load_milestone(10).unwrap().epoch, 10);
    }

    #[test]
    fn rejects_foreign_files() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.ckpt");
        fs::write(&path, b"definitely not a checkpoint").unwrap();

        assert!(matches!(load(&path).unwrap_err(), CheckpointError::BadMagic(_)));
    }

    #[test]
    fn oversized_header_length_is_truncation() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.ckpt");
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, CheckpointError::Truncated { needed: u64::MAX, available: 0, .. }));
    }

    #[test]
    fn cut_off_section_is_truncation() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.ckpt");
        save(&sample_bundle(4), &path).unwrap();

        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 3]).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, CheckpointError::Truncated { .. }), "got {err}");
        assert!(err.to_string().contains("scheduler"));
    }

    #[test]
    fn section_version_checked_only_on_decode() {
        let mut bundle = sample_bundle(3);
        bundle.optimizer.version = 99;

        // Scheduler still decodes; the optimizer does not.
        assert!(bundle.scheduler_state().is_ok());
        let err = bundle
            .optimizer_record::<TestBackend, <ClassificationHead<TestBackend> as Module<TestBackend>>::Record>(
                &Default::default(),
            )
            .err().expect("expected an error");
        assert!(matches!(
            err,
            CheckpointError::IncompatibleSection { section: OPTIMIZER, found: 99, expected: 1 }
        ));
    }

    #[test]
    fn model_weights_survive_the_envelope() {
        let device = Default::default();
        let head: ClassificationHead<TestBackend> =
            ClassificationHeadConfig::new(8).init(&device);

        let bytes  = encode_record::<TestBackend, _>(head.clone().into_record()).unwrap();
        let bundle = CheckpointBundle::new(
            1, bytes, Vec::new(), &CosineAnnealingLr::new(1e-4, 1e-6, 50),
        ).unwrap();

        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("head.ckpt");
        save(&bundle, &path).unwrap();

        let fresh: ClassificationHead<TestBackend> =
            ClassificationHeadConfig::new(8).init(&device);
        let record   = load(&path).unwrap().model_record::<TestBackend, _>(&device).unwrap();
        let restored = fresh.load_record(record);

        let original: Vec<f32> = head.fc1.weight.val().into_data().to_vec().unwrap();
        let restored: Vec<f32> = restored.fc1.weight.val().into_data().to_vec().unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn config_round_trips_next_to_weights() {
        let dir     = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("run.ckpt"));
        assert!(manager.load_config().unwrap().is_none());

        let cfg = TrainConfig { n_epochs: 3, ..TrainConfig::default() };
        manager.save_config(&cfg).unwrap();

        assert_eq!(manager.config_path(), dir.path().join("run.config.json"));
        assert_eq!(manager.load_config().unwrap().unwrap().n_epochs, 3);
    }
}
