//! End-to-end analysis of one coil's acquisitions

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::acquisition::AcquisitionSet;
use crate::config::{AnalysisConfig, CoilConfig};
use crate::error::{QcError, Result};
use crate::metrology::{MetrologyEngine, MetrologyReport};
use crate::report::{build_tables, ResultTable};
use crate::segmentation::{Confirmer, SegmentationEngine, SliceMasks};

/// Everything one session produces
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    #[serde(skip)]
    pub masks: BTreeMap<u32, SliceMasks>,
    pub report: MetrologyReport,
    pub tables: Vec<ResultTable>,
}

/// Segmentation followed by metrology for one coil
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    coil: CoilConfig,
    config: AnalysisConfig,
}

impl AnalysisSession {
    /// Validate the configuration before any image is touched
    pub fn new(coil: CoilConfig, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        coil.validate(&config)?;
        Ok(Self { coil, config })
    }

    pub const fn coil(&self) -> &CoilConfig {
        &self.coil
    }

    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Segment one reference image per slice
    ///
    /// Threshold revisions made while confirming one slice carry over to the
    /// next slice.
    pub fn segment<C: Confirmer + ?Sized>(
        &self,
        set: &AcquisitionSet,
        confirmer: &mut C,
    ) -> Result<BTreeMap<u32, SliceMasks>> {
        let mut engine = SegmentationEngine::new(self.coil.thresholds(), &self.config)?;
        let mut masks = BTreeMap::new();
        for slice in set.slices() {
            let reference = set.reference_image(slice)?;
            info!("Segmenting slice {} from {}", slice, reference.key);
            let slice_masks = engine.segment(&reference.image, confirmer)?;
            slice_masks.validate(slice)?;
            debug!(
                "Slice {}: {} phantom and {} air pixels",
                slice,
                slice_masks.phantom.count(),
                slice_masks.air.count()
            );
            masks.insert(slice, slice_masks);
        }
        Ok(masks)
    }

    /// Validate, segment and measure `set`
    pub fn run<C: Confirmer + ?Sized>(
        &self,
        set: &AcquisitionSet,
        confirmer: &mut C,
    ) -> Result<SessionOutcome> {
        if set.is_empty() {
            return Err(QcError::InvalidAcquisition(
                "no acquisitions to analyse".to_string(),
            ));
        }
        set.validate_counts(&self.coil)?;
        info!(
            "Analysing {} images over {} slice(s) for a {}-element coil",
            set.len(),
            set.slices().len(),
            self.coil.element_count
        );

        let masks = self.segment(set, confirmer)?;
        let engine = MetrologyEngine::new(&self.config, self.coil.element_count)?;
        let report = engine.measure(set, &masks)?;
        let tables = build_tables(&report);

        let missing = report.missing_repeats().count();
        if missing > 0 {
            info!("{} image(s) without a second repeat; NEMA omitted", missing);
        }

        Ok(SessionOutcome {
            masks,
            report,
            tables,
        })
    }
}
