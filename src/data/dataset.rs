// ============================================================
// Layer 4 — Image Datasets
// ============================================================
// Two on-disk layouts:
//
//   Labelled (train / val):
//     {data_dir}/{split}/sleeve/*.jpg        → label 0
//     {data_dir}/{split}/sleeveless/*.jpg    → label 1
//
//   Unlabelled (inference):
//     {input_dir}/*.jpg                      → identifier = file stem
//
// Only file paths are held in memory. Each `get` decodes one
// image, resizes it to image_size × image_size and returns it
// as a flat CHW f32 vector in [0, 1]. ImageNet normalisation
// happens in the batcher, once per batch.
//
// Accepted extensions: jpg, jpeg, png (case-insensitive).

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::data::dataset::{Dataset, InMemDataset};
use image::{imageops::FilterType, ImageReader};
use thiserror::Error;

use crate::domain::sleeve::SleeveType;

pub const DEFAULT_IMAGE_SIZE: usize = 224;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset directory '{0}' does not exist")]
    MissingDirectory(PathBuf),

    #[error("cannot decode image '{path}': {source}")]
    Image {
        path:   PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("item {0} is out of range")]
    OutOfRange(usize),

    #[error("cannot start loader workers: {0}")]
    Workers(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A dataset whose items can fail to load with a reason.
///
/// `Dataset::get` collapses failures to `None`; training and
/// inference use `try_get` so a bad file stops the run with its name.
pub trait TryDataset<I>: Dataset<I> {
    fn try_get(&self, index: usize) -> Result<I, DatasetError>;
}

impl<I: Clone + Send + Sync> TryDataset<I> for InMemDataset<I> {
    fn try_get(&self, index: usize) -> Result<I, DatasetError> {
        self.get(index).ok_or(DatasetError::OutOfRange(index))
    }
}

// ─── Items ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LabelledImage {
    /// CHW pixels in [0, 1], length 3 · size · size
    pub image: Vec<f32>,
    pub label: usize,
}

#[derive(Debug, Clone)]
pub struct NamedImage {
    pub image:      Vec<f32>,
    pub identifier: String,
}

/// Decode, resize and convert one image to CHW floats in [0, 1].
pub fn load_image(path: &Path, image_size: usize) -> Result<Vec<f32>, DatasetError> {
    let image_err = |source| DatasetError::Image { path: path.to_path_buf(), source };

    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(image_err)?
        .resize_exact(image_size as u32, image_size as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = image_size * image_size;
    let mut chw = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * image_size + x as usize;
        for c in 0..3 {
            chw[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }
    Ok(chw)
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::MissingDirectory(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ─── LabelledImageDataset ─────────────────────────────────────────────────────

pub struct LabelledImageDataset {
    samples:    Vec<(PathBuf, usize)>,
    image_size: usize,
}

impl LabelledImageDataset {
    pub fn new(samples: Vec<(PathBuf, usize)>, image_size: usize) -> Self {
        Self { samples, image_size }
    }

    /// Scan `{data_dir}/{split}/{class folder}` for every class.
    /// A missing class folder contributes no samples.
    pub fn from_split(data_dir: &Path, split: &str, image_size: usize) -> Result<Self, DatasetError> {
        let split_dir = data_dir.join(split);
        if !split_dir.is_dir() {
            return Err(DatasetError::MissingDirectory(split_dir));
        }

        let mut samples = Vec::new();
        for class in SleeveType::ALL {
            let class_dir = split_dir.join(class.folder_name());
            if !class_dir.is_dir() {
                tracing::warn!("No '{}' folder in '{}'", class.folder_name(), split_dir.display());
                continue;
            }
            let label = class.code() as usize;
            samples.extend(list_images(&class_dir)?.into_iter().map(|p| (p, label)));
        }

        let dataset    = Self::new(samples, image_size);
        let sleeveless = dataset.labels().filter(|&l| l == SleeveType::Sleeveless.code() as usize).count();
        tracing::info!(
            "Found {} images in '{}' ({} sleeve, {} sleeveless)",
            dataset.len(),
            split_dir.display(),
            dataset.len() - sleeveless,
            sleeveless,
        );
        Ok(dataset)
    }

    pub fn labels(&self) -> impl Iterator<Item = usize> + '_ {
        self.samples.iter().map(|(_, label)| *label)
    }
}

impl TryDataset<LabelledImage> for LabelledImageDataset {
    fn try_get(&self, index: usize) -> Result<LabelledImage, DatasetError> {
        let (path, label) = self.samples.get(index).ok_or(DatasetError::OutOfRange(index))?;
        Ok(LabelledImage { image: load_image(path, self.image_size)?, label: *label })
    }
}

impl Dataset<LabelledImage> for LabelledImageDataset {
    fn get(&self, index: usize) -> Option<LabelledImage> {
        self.try_get(index).ok()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

// ─── NamedImageDataset ────────────────────────────────────────────────────────

pub struct NamedImageDataset {
    paths:      Vec<PathBuf>,
    image_size: usize,
}

impl NamedImageDataset {
    pub fn from_dir(input_dir: &Path, image_size: usize) -> Result<Self, DatasetError> {
        let paths = list_images(input_dir)?;
        tracing::info!("Found {} images in '{}'", paths.len(), input_dir.display());
        Ok(Self { paths, image_size })
    }
}

impl TryDataset<NamedImage> for NamedImageDataset {
    fn try_get(&self, index: usize) -> Result<NamedImage, DatasetError> {
        let path = self.paths.get(index).ok_or(DatasetError::OutOfRange(index))?;
        let identifier = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(NamedImage { image: load_image(path, self.image_size)?, identifier })
    }
}

impl Dataset<NamedImage> for NamedImageDataset {
    fn get(&self, index: usize) -> Option<NamedImage> {
        self.try_get(index).ok()
    }

    fn len(&self) -> usize {
        self.paths.len()
    }
}
