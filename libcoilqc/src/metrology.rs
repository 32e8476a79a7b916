//! Per-acquisition SNR/uniformity and repeat aggregation
//!
//! The engine is stateless: each repeat pair is measured independently from
//! its images and the slice masks, then a second pass averages the rounded
//! values of every aggregation group and copies the group values onto each
//! member record.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::acquisition::{
    AcquisitionKey, AcquisitionSet, AggregationKey, ImageCategory, RepeatGroupKey, RepeatPair,
};
use crate::config::{AnalysisConfig, ScaleFactor};
use crate::error::{QcError, Result};
use crate::segmentation::SliceMasks;
use crate::snr::{bandwidth_scalar, nema_snr, single_image_snr, NemaStatus, SnrMethod, SnrResult};
use crate::stats::{mean, round2};
use crate::uniformity::integral_uniformity;

/// Element count used for individually reconstructed element images
const SINGLE_ELEMENT: u32 = 1;

/// Group averages copied onto every member of an aggregation group
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupValues {
    pub nema: Option<f64>,
    pub noise_std: Option<f64>,
    pub noise_av: Option<f64>,
    pub uniformity: Option<f64>,
    /// Number of records averaged
    pub members: usize,
}

impl GroupValues {
    pub const fn get(&self, method: SnrMethod) -> Option<f64> {
        match method {
            SnrMethod::Nema => self.nema,
            SnrMethod::NoiseStd => self.noise_std,
            SnrMethod::NoiseAv => self.noise_av,
        }
    }
}

/// Metrology result for one acquisition unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitResult {
    pub key: AcquisitionKey,
    pub snr: SnrResult,
    /// Combined images only
    pub uniformity: Option<f64>,
    pub group: GroupValues,
}

/// All unit results of one run, ordered by acquisition key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetrologyReport {
    pub element_count: u32,
    pub results: Vec<UnitResult>,
}

impl MetrologyReport {
    pub fn get(&self, key: &AcquisitionKey) -> Option<&UnitResult> {
        self.results.iter().find(|r| &r.key == key)
    }

    /// Units whose NEMA value is absent because the second repeat is missing
    pub fn missing_repeats(&self) -> impl Iterator<Item = &UnitResult> {
        self.results
            .iter()
            .filter(|r| r.snr.nema_status == NemaStatus::MissingRepeat)
    }
}

/// SNR and uniformity measurement over an acquisition set
#[derive(Debug, Clone)]
pub struct MetrologyEngine<'a> {
    config: &'a AnalysisConfig,
    element_count: u32,
    combined_scale: ScaleFactor,
    element_scale: ScaleFactor,
}

impl<'a> MetrologyEngine<'a> {
    /// Fails when either scale-factor row needed for this coil is missing
    pub fn new(config: &'a AnalysisConfig, element_count: u32) -> Result<Self> {
        Ok(Self {
            config,
            element_count,
            combined_scale: config.scale_factors.get(element_count)?,
            element_scale: config.scale_factors.get(SINGLE_ELEMENT)?,
        })
    }

    /// Measure every unit of `set` and aggregate repeats
    pub fn measure(
        &self,
        set: &AcquisitionSet,
        masks: &BTreeMap<u32, SliceMasks>,
    ) -> Result<MetrologyReport> {
        let pairs = set.repeat_pairs();
        debug!("Measuring {} repeat groups", pairs.len());

        #[cfg(feature = "parallel")]
        let measured: Vec<Result<Vec<UnitResult>>> = pairs
            .par_iter()
            .map(|(key, pair)| self.measure_pair(key, pair, masks))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let measured: Vec<Result<Vec<UnitResult>>> = pairs
            .iter()
            .map(|(key, pair)| self.measure_pair(key, pair, masks))
            .collect();

        let mut results = Vec::with_capacity(set.len());
        for group in measured {
            results.extend(group?);
        }
        results.sort_by(|a, b| a.key.cmp(&b.key));
        aggregate(&mut results);

        Ok(MetrologyReport {
            element_count: self.element_count,
            results,
        })
    }

    /// Measure both repeats of one image
    pub fn measure_pair(
        &self,
        key: &RepeatGroupKey,
        pair: &RepeatPair<'_>,
        masks: &BTreeMap<u32, SliceMasks>,
    ) -> Result<Vec<UnitResult>> {
        let slice_masks = masks
            .get(&key.slice)
            .ok_or(QcError::MissingMasks { slice: key.slice })?;
        let scale = match key.category {
            ImageCategory::Combined => self.combined_scale,
            ImageCategory::DelRec => self.element_scale,
        };

        let nema = match pair.second {
            Some(second) => {
                let scalar = bandwidth_scalar(pair.first.pixel_bandwidth_hz, self.config);
                Some(
                    nema_snr(&pair.first.image, &second.image, &slice_masks.phantom, scalar)
                        .map_err(|e| e.at_slice(key.slice))?,
                )
            }
            None => {
                info!(
                    "Second repeat missing for {}; NEMA SNR omitted",
                    pair.first.key
                );
                None
            }
        };
        let nema_status = if nema.is_some() {
            NemaStatus::Computed
        } else {
            NemaStatus::MissingRepeat
        };

        pair.units()
            .map(|unit| {
                let scalar = bandwidth_scalar(unit.pixel_bandwidth_hz, self.config);
                let single = single_image_snr(
                    &unit.image,
                    &slice_masks.phantom,
                    &slice_masks.air,
                    scale,
                    scalar,
                )
                .map_err(|e| e.at_slice(key.slice))?;
                let uniformity = match key.category {
                    ImageCategory::Combined => Some(
                        integral_uniformity(&unit.image, &slice_masks.phantom)
                            .map_err(|e| e.at_slice(key.slice))?,
                    ),
                    ImageCategory::DelRec => None,
                };
                Ok(UnitResult {
                    key: unit.key.clone(),
                    snr: SnrResult {
                        nema,
                        nema_status,
                        noise_std: single.noise_std,
                        noise_av: single.noise_av,
                    },
                    uniformity,
                    group: GroupValues::default(),
                })
            })
            .collect()
    }
}

fn group_mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.flatten().collect();
    mean(&present).map(round2)
}

/// Average every aggregation group and write the result onto its members
pub fn aggregate(results: &mut [UnitResult]) {
    let mut groups: BTreeMap<AggregationKey, Vec<usize>> = BTreeMap::new();
    for (index, result) in results.iter().enumerate() {
        groups
            .entry(result.key.aggregation_group())
            .or_default()
            .push(index);
    }

    for members in groups.values() {
        let values = |f: fn(&UnitResult) -> Option<f64>| {
            group_mean(members.iter().map(|&i| f(&results[i])))
        };
        let group = GroupValues {
            nema: values(|r| r.snr.nema),
            noise_std: values(|r| Some(r.snr.noise_std)),
            noise_av: values(|r| Some(r.snr.noise_av)),
            uniformity: values(|r| r.uniformity),
            members: members.len(),
        };
        for &i in members {
            results[i].group = group;
        }
    }
}
