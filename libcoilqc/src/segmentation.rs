//! Phantom/air segmentation
//!
//! The reference image (normally the combined-element image) is smoothed,
//! seeded from two intensity thresholds and flooded with a marker-controlled
//! watershed. An operator, or any other [`Confirmer`], inspects each candidate
//! and either accepts it or asks for another attempt with new thresholds.
//! The accepted mask is then contracted into the phantom and air masks used
//! for metrology.

use std::collections::VecDeque;
use std::fmt;

use image::{Rgba, RgbaImage};
use log::{debug, info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::{QcError, Result};
use crate::filter::low_pass;
use crate::raster::{Image, Mask};
use crate::watershed::watershed;

/// Marker label for pixels that are probably air
pub const BACKGROUND_SEED: u8 = 1;
/// Marker label for pixels that are probably phantom
pub const FOREGROUND_SEED: u8 = 2;

/// Seed thresholds as fractions of the image's maximum intensity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub lower: f64,
    pub upper: f64,
}

impl ThresholdPair {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Both fractions must lie in `[0, 1)`
    ///
    /// `lower < upper` is not required; inverted pairs simply produce
    /// degenerate candidates the operator will see.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("lower", self.lower), ("upper", self.upper)] {
            if !value.is_finite() || !(0.0..1.0).contains(&value) {
                return Err(QcError::Configuration(format!(
                    "{name} threshold {value} must be a fraction in [0, 1)"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ThresholdPair {
    fn default() -> Self {
        Self::new(0.1, 0.1)
    }
}

impl fmt::Display for ThresholdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lower={} upper={}", self.lower, self.upper)
    }
}

/// Seed the watershed from the smoothed image
///
/// Pixels below `lower * max_intensity` become background seeds, then pixels
/// above `upper * max_intensity` become foreground seeds (overriding the
/// background label if the thresholds are inverted).
pub fn build_markers(
    smoothed: &Array2<f64>,
    max_intensity: f64,
    thresholds: ThresholdPair,
) -> Array2<u8> {
    let lower = thresholds.lower * max_intensity;
    let upper = thresholds.upper * max_intensity;
    smoothed.mapv(|v| {
        if v > upper {
            FOREGROUND_SEED
        } else if v < lower {
            BACKGROUND_SEED
        } else {
            0
        }
    })
}

/// Run one seeding + flooding pass and keep the foreground label
pub fn segment_candidate(
    smoothed: &Array2<f64>,
    max_intensity: f64,
    thresholds: ThresholdPair,
) -> Mask {
    let markers = build_markers(smoothed, max_intensity, thresholds);
    let labels = watershed(smoothed, &markers);
    Mask::new(labels.mapv(|l| l == FOREGROUND_SEED))
}

/// What the confirmer sees for each attempt
#[derive(Debug, Clone)]
pub struct MaskPreview {
    /// 1-based attempt counter
    pub attempt: usize,
    pub thresholds: ThresholdPair,
    pub candidate: Mask,
    /// Smoothed image in grayscale with the candidate tinted on top
    pub overlay: RgbaImage,
}

impl MaskPreview {
    pub fn foreground_pixels(&self) -> usize {
        self.candidate.count()
    }
}

/// Operator verdict on a candidate mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Accept,
    Retry(ThresholdPair),
}

/// Accept/retry channel for candidate masks
///
/// Implementations may block on a human; the engine calls them synchronously
/// and loops until one returns [`Decision::Accept`] or an error.
pub trait Confirmer {
    fn confirm(&mut self, preview: &MaskPreview) -> Result<Decision>;
}

impl<F> Confirmer for F
where
    F: FnMut(&MaskPreview) -> Result<Decision>,
{
    fn confirm(&mut self, preview: &MaskPreview) -> Result<Decision> {
        self(preview)
    }
}

/// Accepts the first candidate
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoAccept;

impl Confirmer for AutoAccept {
    fn confirm(&mut self, _preview: &MaskPreview) -> Result<Decision> {
        Ok(Decision::Accept)
    }
}

/// Replays a fixed list of decisions
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfirmer {
    decisions: VecDeque<Decision>,
    seen: Vec<ThresholdPair>,
}

impl ScriptedConfirmer {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            seen: Vec::new(),
        }
    }

    /// Thresholds of every preview shown so far
    pub fn seen(&self) -> &[ThresholdPair] {
        &self.seen
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&mut self, preview: &MaskPreview) -> Result<Decision> {
        self.seen.push(preview.thresholds);
        self.decisions.pop_front().ok_or_else(|| {
            QcError::Confirmation(format!(
                "no scripted decision left for attempt {}",
                preview.attempt
            ))
        })
    }
}

/// Gives up after `max_attempts` previews
#[derive(Debug, Clone)]
pub struct BoundedConfirmer<C> {
    inner: C,
    max_attempts: usize,
}

impl<C: Confirmer> BoundedConfirmer<C> {
    pub const fn new(inner: C, max_attempts: usize) -> Self {
        Self {
            inner,
            max_attempts,
        }
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Confirmer> Confirmer for BoundedConfirmer<C> {
    fn confirm(&mut self, preview: &MaskPreview) -> Result<Decision> {
        if preview.attempt > self.max_attempts {
            return Err(QcError::Confirmation(format!(
                "mask not accepted within {} attempts",
                self.max_attempts
            )));
        }
        self.inner.confirm(preview)
    }
}

/// Which of the three per-slice masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskKind {
    Accepted,
    Phantom,
    Air,
}

impl fmt::Display for MaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "accepted",
            Self::Phantom => "phantom",
            Self::Air => "air",
        };
        f.write_str(name)
    }
}

/// Masks derived from one accepted segmentation
#[derive(Debug, Clone, PartialEq)]
pub struct SliceMasks {
    /// Operator-confirmed watershed result covering the whole phantom
    pub accepted: Mask,
    /// `accepted` contracted away from the phantom edge
    pub phantom: Mask,
    /// Inverse of `accepted`, contracted away from phantom and image edges
    pub air: Mask,
    /// Thresholds that produced `accepted`
    pub thresholds: ThresholdPair,
}

impl SliceMasks {
    pub fn from_accepted(
        accepted: Mask,
        thresholds: ThresholdPair,
        phantom_contraction: usize,
        air_contraction: usize,
    ) -> Self {
        let phantom = accepted.contract(phantom_contraction);
        let air = accepted.invert().contract(air_contraction);
        Self {
            accepted,
            phantom,
            air,
            thresholds,
        }
    }

    pub fn get(&self, kind: MaskKind) -> &Mask {
        match kind {
            MaskKind::Accepted => &self.accepted,
            MaskKind::Phantom => &self.phantom,
            MaskKind::Air => &self.air,
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        self.accepted.dims()
    }

    /// Fail on any empty mask
    pub fn validate(&self, slice: u32) -> Result<()> {
        for kind in [MaskKind::Accepted, MaskKind::Phantom, MaskKind::Air] {
            if self.get(kind).is_empty() {
                return Err(QcError::SegmentationDegenerate { slice, mask: kind });
            }
        }
        Ok(())
    }
}

/// Interactive threshold-seeded segmentation
#[derive(Debug, Clone)]
pub struct SegmentationEngine {
    thresholds: ThresholdPair,
    phantom_contraction: usize,
    air_contraction: usize,
}

impl SegmentationEngine {
    pub fn new(thresholds: ThresholdPair, config: &AnalysisConfig) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            phantom_contraction: config.phantom_contraction,
            air_contraction: config.air_contraction,
        })
    }

    /// Current thresholds; updated by every retry
    pub const fn thresholds(&self) -> ThresholdPair {
        self.thresholds
    }

    /// Segment `reference` until `confirmer` accepts a candidate
    ///
    /// Revised thresholds stay in effect for later slices. Empty masks are
    /// returned as-is; [`SliceMasks::validate`] decides whether they are usable.
    pub fn segment<C: Confirmer + ?Sized>(
        &mut self,
        reference: &Image,
        confirmer: &mut C,
    ) -> Result<SliceMasks> {
        let smoothed = low_pass(reference.data());
        let max_intensity = reference.max_intensity();
        let total = smoothed.len();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let candidate = segment_candidate(&smoothed, max_intensity, self.thresholds);
            let area = candidate.count();
            debug!(
                "Segmentation attempt {} ({}): {} of {} pixels in candidate",
                attempt, self.thresholds, area, total
            );
            if area == 0 || area == total {
                warn!(
                    "Candidate mask covers {} of {} pixels with {}; check thresholds and phantom position",
                    area, total, self.thresholds
                );
            }

            let preview = MaskPreview {
                attempt,
                thresholds: self.thresholds,
                overlay: render_overlay(&smoothed, &candidate),
                candidate,
            };

            match confirmer.confirm(&preview)? {
                Decision::Accept => {
                    info!(
                        "Mask accepted after {} attempt(s) with {}",
                        attempt, self.thresholds
                    );
                    return Ok(SliceMasks::from_accepted(
                        preview.candidate,
                        self.thresholds,
                        self.phantom_contraction,
                        self.air_contraction,
                    ));
                }
                Decision::Retry(revised) => {
                    revised.validate()?;
                    info!("Retrying segmentation with {}", revised);
                    self.thresholds = revised;
                }
            }
        }
    }
}

const OVERLAY_TINT: [f64; 3] = [255.0, 0.0, 255.0];
const OVERLAY_ALPHA: f64 = 0.25;

/// Grayscale rendering of `smoothed` with `mask` tinted translucently
pub fn render_overlay(smoothed: &Array2<f64>, mask: &Mask) -> RgbaImage {
    let (rows, cols) = smoothed.dim();
    let peak = smoothed.iter().copied().fold(0.0, f64::max);
    let scale = if peak > 0.0 { 255.0 / peak } else { 0.0 };

    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let (r, c) = (y as usize, x as usize);
        let gray = (smoothed[[r, c]] * scale).clamp(0.0, 255.0);
        let mut rgb = [gray; 3];
        if mask.data()[[r, c]] {
            for (channel, tint) in rgb.iter_mut().zip(OVERLAY_TINT) {
                *channel = (*channel).mul_add(1.0 - OVERLAY_ALPHA, tint * OVERLAY_ALPHA);
            }
        }
        Rgba([rgb[0] as u8, rgb[1] as u8, rgb[2] as u8, 255])
    })
}
