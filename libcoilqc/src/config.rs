//! Read-only configuration injected at session start
//!
//! Covers the noise scale-factor table, per-coil segmentation defaults and the
//! registry of coils per scanner.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QcError, Result};
use crate::segmentation::ThresholdPair;

/// Receiver bandwidth assumed when an acquisition does not report one (Hz/pixel)
pub const DEFAULT_PIXEL_BANDWIDTH_HZ: f64 = 222.0;
/// Bandwidth SNR values are normalised to (Hz/pixel)
pub const REFERENCE_PIXEL_BANDWIDTH_HZ: f64 = 130.0;
/// Contraction applied to the accepted mask to get the phantom mask
pub const PHANTOM_CONTRACTION: usize = 4;
/// Contraction applied to the inverted accepted mask to get the air mask
pub const AIR_CONTRACTION: usize = 5;

/// Ratio between the measured air statistic and the true noise level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactor {
    pub sd: f64,
    pub mean: f64,
}

impl ScaleFactor {
    pub const fn new(sd: f64, mean: f64) -> Self {
        Self { sd, mean }
    }
}

const DEFAULT_SCALE_FACTORS: [(u32, ScaleFactor); 16] = [
    (1, ScaleFactor::new(0.6551, 1.2533)),
    (2, ScaleFactor::new(0.6824, 1.8800)),
    (3, ScaleFactor::new(0.6911, 2.3500)),
    (4, ScaleFactor::new(0.6953, 2.7416)),
    (6, ScaleFactor::new(0.6994, 3.3928)),
    (8, ScaleFactor::new(0.7014, 3.9380)),
    (12, ScaleFactor::new(0.7035, 4.8271)),
    (14, ScaleFactor::new(0.7040, 5.2243)),
    (15, ScaleFactor::new(0.7042, 5.4123)),
    (16, ScaleFactor::new(0.7043, 5.6128)),
    (18, ScaleFactor::new(0.7046, 5.9585)),
    (20, ScaleFactor::new(0.7049, 6.2698)),
    (28, ScaleFactor::new(0.7055, 7.4425)),
    (30, ScaleFactor::new(0.7056, 7.7083)),
    (32, ScaleFactor::new(0.7057, 7.9688)),
    (64, ScaleFactor::new(0.7064, 11.2916)),
];

/// Noise scale factors keyed by the number of elements combined into an image
///
/// Lookups are exact: element counts without a row are rejected rather than
/// interpolated. Serialized as a map keyed by the element count as a string,
/// since TOML keys are always strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, ScaleFactor>",
    into = "BTreeMap<String, ScaleFactor>"
)]
pub struct ScaleFactorTable {
    rows: BTreeMap<u32, ScaleFactor>,
}

impl TryFrom<BTreeMap<String, ScaleFactor>> for ScaleFactorTable {
    type Error = String;

    fn try_from(rows: BTreeMap<String, ScaleFactor>) -> std::result::Result<Self, Self::Error> {
        rows.into_iter()
            .map(|(key, factor)| {
                key.trim()
                    .parse::<u32>()
                    .map(|n| (n, factor))
                    .map_err(|_| format!("scale factor key {key:?} is not an element count"))
            })
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map(|rows| Self { rows })
    }
}

impl From<ScaleFactorTable> for BTreeMap<String, ScaleFactor> {
    fn from(table: ScaleFactorTable) -> Self {
        table
            .rows
            .into_iter()
            .map(|(n, factor)| (n.to_string(), factor))
            .collect()
    }
}

impl ScaleFactorTable {
    pub fn new(rows: impl IntoIterator<Item = (u32, ScaleFactor)>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    pub fn get(&self, element_count: u32) -> Result<ScaleFactor> {
        self.rows
            .get(&element_count)
            .copied()
            .ok_or(QcError::UnknownElementCount { element_count })
    }

    pub fn contains(&self, element_count: u32) -> bool {
        self.rows.contains_key(&element_count)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, ScaleFactor)> + '_ {
        self.rows.iter().map(|(&n, &f)| (n, f))
    }

    /// Replace or add a row
    #[must_use]
    pub fn with_row(mut self, element_count: u32, factor: ScaleFactor) -> Self {
        self.rows.insert(element_count, factor);
        self
    }
}

impl Default for ScaleFactorTable {
    fn default() -> Self {
        Self::new(DEFAULT_SCALE_FACTORS)
    }
}

/// Analysis-wide constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub scale_factors: ScaleFactorTable,
    pub default_bandwidth_hz: f64,
    pub reference_bandwidth_hz: f64,
    pub phantom_contraction: usize,
    pub air_contraction: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            scale_factors: ScaleFactorTable::default(),
            default_bandwidth_hz: DEFAULT_PIXEL_BANDWIDTH_HZ,
            reference_bandwidth_hz: REFERENCE_PIXEL_BANDWIDTH_HZ,
            phantom_contraction: PHANTOM_CONTRACTION,
            air_contraction: AIR_CONTRACTION,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, bw) in [
            ("default", self.default_bandwidth_hz),
            ("reference", self.reference_bandwidth_hz),
        ] {
            if !bw.is_finite() || bw <= 0.0 {
                return Err(QcError::Configuration(format!(
                    "{name} pixel bandwidth must be positive, got {bw}"
                )));
            }
        }
        for (n, factor) in self.scale_factors.iter() {
            if factor.sd <= 0.0 || factor.mean <= 0.0 {
                return Err(QcError::Configuration(format!(
                    "scale factors for {n} elements must be positive"
                )));
            }
        }
        Ok(())
    }
}

const fn default_slice_count() -> usize {
    1
}

const fn default_threshold() -> f64 {
    0.1
}

/// Expected acquisition layout and segmentation defaults for one coil
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoilConfig {
    pub element_count: u32,
    #[serde(default = "default_slice_count")]
    pub slice_count: usize,
    #[serde(default = "default_threshold")]
    pub lower_threshold: f64,
    #[serde(default = "default_threshold")]
    pub upper_threshold: f64,
}

impl CoilConfig {
    pub const fn new(element_count: u32, lower_threshold: f64, upper_threshold: f64) -> Self {
        Self {
            element_count,
            slice_count: 1,
            lower_threshold,
            upper_threshold,
        }
    }

    #[must_use]
    pub const fn with_slice_count(mut self, slice_count: usize) -> Self {
        self.slice_count = slice_count;
        self
    }

    pub const fn thresholds(&self) -> ThresholdPair {
        ThresholdPair::new(self.lower_threshold, self.upper_threshold)
    }

    /// Reject layouts and thresholds the engines cannot work with
    pub fn validate(&self, analysis: &AnalysisConfig) -> Result<()> {
        if self.element_count == 0 {
            return Err(QcError::Configuration(
                "element count must be positive".to_string(),
            ));
        }
        if self.slice_count == 0 {
            return Err(QcError::Configuration(
                "slice count must be positive".to_string(),
            ));
        }
        analysis.scale_factors.get(self.element_count)?;
        self.thresholds().validate()
    }
}

/// One scanner and its coils
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerEntry {
    pub name: String,
    #[serde(default)]
    pub coils: BTreeMap<String, CoilConfig>,
}

/// Coil configurations keyed by scanner identifier and coil name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoilRegistry {
    #[serde(default)]
    pub scanners: BTreeMap<String, ScannerEntry>,
}

impl CoilRegistry {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| QcError::ConfigParse(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| QcError::ConfigParse(e.to_string()))
    }

    /// Load a registry, picking the format from the file extension (TOML unless `.json`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }

    pub fn scanner(&self, scanner_id: &str) -> Result<&ScannerEntry> {
        self.scanners
            .get(scanner_id)
            .ok_or_else(|| QcError::Configuration(format!("unknown scanner '{scanner_id}'")))
    }

    pub fn coil(&self, scanner_id: &str, coil_name: &str) -> Result<CoilConfig> {
        let scanner = self.scanner(scanner_id)?;
        scanner.coils.get(coil_name).copied().ok_or_else(|| {
            QcError::Configuration(format!(
                "coil '{coil_name}' is not configured for scanner {} ({scanner_id})",
                scanner.name
            ))
        })
    }
}
