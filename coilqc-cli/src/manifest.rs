//! Acquisition manifests: the sorted image list the DICOM front end exports
//!
//! ```toml
//! [[unit]]
//! date = "20240312"
//! series_time = "101530"
//! repeat = 0
//! category = "Combined"
//! slice = 0
//! path = "combined_r0_s0.png"
//! pixel_bandwidth_hz = 222.0
//! ```
//!
//! Relative image paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use serde::{Deserialize, Serialize};

use coilqc::{AcquisitionKey, AcquisitionSet, AcquisitionUnit, Image, ImageCategory};

/// One exported image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub date: String,
    pub series_time: String,
    pub repeat: u8,
    pub category: ImageCategory,
    pub slice: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<u32>,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_bandwidth_hz: Option<f64>,
}

impl ManifestEntry {
    pub fn key(&self) -> AcquisitionKey {
        AcquisitionKey {
            date: self.date.clone(),
            series_time: self.series_time.clone(),
            repeat: self.repeat,
            category: self.category,
            slice: self.slice,
            element: self.element,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "unit")]
    pub units: Vec<ManifestEntry>,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Manifest {
    pub fn from_toml_str(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut manifest: Self = toml::from_str(text).context("Malformed manifest")?;
        manifest.base_dir = base_dir.into();
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml_str(&text, base_dir)
    }

    pub fn resolve(&self, entry: &ManifestEntry) -> PathBuf {
        if entry.path.is_absolute() {
            entry.path.clone()
        } else {
            self.base_dir.join(&entry.path)
        }
    }

    /// Decode every listed image into an acquisition set
    pub fn into_acquisitions(self, progress: bool) -> Result<AcquisitionSet> {
        let pb = if progress {
            create_progress_bar(self.units.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        let mut set = AcquisitionSet::new();
        for entry in &self.units {
            let path = self.resolve(entry);
            pb.set_message(path.display().to_string());
            let image = load_image(&path)?;
            debug!("Loaded {} ({:?})", path.display(), image.dims());

            let mut unit = AcquisitionUnit::new(entry.key(), image);
            if let Some(bandwidth) = entry.pixel_bandwidth_hz {
                unit = unit.with_bandwidth(bandwidth);
            }
            set.insert(unit)?;
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(set)
    }
}

/// Read any grayscale-convertible image at 16-bit depth
pub fn load_image(path: &Path) -> Result<Image> {
    let decoded = image::open(path)
        .with_context(|| format!("Failed to decode image {}", path.display()))?;
    Ok(Image::from_luma16(&decoded.to_luma16())?)
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}
