//! Signal-to-noise ratio estimators
//!
//! * NEMA: noise from the difference of two identically acquired images.
//! * Noise SD / noise mean: noise from the air region of a single image,
//!   corrected by the element-count dependent scale factor of the magnitude
//!   noise distribution.
//!
//! Every value is normalised to the reference receiver bandwidth and rounded
//! to two decimals when it is computed.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, ScaleFactor};
use crate::error::{QcError, Result};
use crate::raster::{Image, Mask};
use crate::segmentation::MaskKind;
use crate::stats::{masked_values, mean, round2, std_dev};

/// SNR estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SnrMethod {
    Nema,
    NoiseStd,
    NoiseAv,
}

impl SnrMethod {
    pub const ALL: [Self; 3] = [Self::Nema, Self::NoiseStd, Self::NoiseAv];
}

impl fmt::Display for SnrMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nema => "NEMA",
            Self::NoiseStd => "noise_std",
            Self::NoiseAv => "noise_av",
        })
    }
}

/// Whether a NEMA value could be computed for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NemaStatus {
    Computed,
    /// The second repeat was not acquired
    MissingRepeat,
}

/// SNR of one acquisition unit by every method
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnrResult {
    pub nema: Option<f64>,
    pub nema_status: NemaStatus,
    pub noise_std: f64,
    pub noise_av: f64,
}

impl SnrResult {
    pub const fn get(&self, method: SnrMethod) -> Option<f64> {
        match method {
            SnrMethod::Nema => self.nema,
            SnrMethod::NoiseStd => Some(self.noise_std),
            SnrMethod::NoiseAv => Some(self.noise_av),
        }
    }
}

/// Single-image SNR pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SingleImageSnr {
    pub noise_std: f64,
    pub noise_av: f64,
}

/// `sqrt(bandwidth / reference)`, falling back to the default bandwidth
pub fn bandwidth_scalar(pixel_bandwidth_hz: Option<f64>, config: &AnalysisConfig) -> f64 {
    let bandwidth = pixel_bandwidth_hz.unwrap_or_else(|| {
        debug!(
            "Pixel bandwidth unavailable, assuming {} Hz/px",
            config.default_bandwidth_hz
        );
        config.default_bandwidth_hz
    });
    (bandwidth / config.reference_bandwidth_hz).sqrt()
}

fn phantom_signal(image: &Image, phantom: &Mask) -> Result<f64> {
    image.check_mask(phantom)?;
    mean(&masked_values(image.data(), phantom)).ok_or(QcError::SegmentationDegenerate {
        slice: 0,
        mask: MaskKind::Phantom,
    })
}

fn positive(value: f64, what: &str) -> Result<f64> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(QcError::NumericDomain(format!(
            "{what} is {value}; SNR is undefined"
        )))
    }
}

/// NEMA subtraction SNR
///
/// `bandwidth_scalar * sqrt(2) * mean(first[phantom]) / std((first - second)[phantom])`.
/// Identical images leave no noise and are rejected as a numeric domain error.
pub fn nema_snr(first: &Image, second: &Image, phantom: &Mask, bandwidth_scalar: f64) -> Result<f64> {
    if first.dims() != second.dims() {
        return Err(QcError::DimensionMismatch {
            expected: first.dims(),
            found: second.dims(),
        });
    }
    let signal = phantom_signal(first, phantom)?;
    let difference = first.data() - second.data();
    let noise = std_dev(&masked_values(&difference, phantom)).unwrap_or(0.0);
    let noise = positive(noise, "difference image noise")?;
    Ok(round2(
        bandwidth_scalar * std::f64::consts::SQRT_2 * signal / noise,
    ))
}

/// Noise-SD and noise-mean SNR from one image
pub fn single_image_snr(
    image: &Image,
    phantom: &Mask,
    air: &Mask,
    scale: ScaleFactor,
    bandwidth_scalar: f64,
) -> Result<SingleImageSnr> {
    let signal = phantom_signal(image, phantom)?;
    image.check_mask(air)?;
    let noise_values = masked_values(image.data(), air);
    let (Some(air_sd), Some(air_mean)) = (std_dev(&noise_values), mean(&noise_values)) else {
        return Err(QcError::SegmentationDegenerate {
            slice: 0,
            mask: MaskKind::Air,
        });
    };

    let noise_std = positive(air_sd / scale.sd, "air noise standard deviation")?;
    let noise_av = positive(air_mean / scale.mean, "air noise mean")?;

    Ok(SingleImageSnr {
        noise_std: round2(bandwidth_scalar * signal / noise_std),
        noise_av: round2(bandwidth_scalar * signal / noise_av),
    })
}
