#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! CoilQC - MRI receive coil quality control from phantom images
//!
//! This library segments a uniform phantom from its background with a
//! threshold-seeded watershed, derives signal and noise regions from the
//! accepted mask, and measures coil performance: SNR by the NEMA subtraction
//! method and by two single-image noise estimators, plus IPEM integral
//! uniformity. Results of repeated acquisitions are averaged per date.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrology;
pub mod raster;
pub mod report;
pub mod segmentation;
pub mod session;
pub mod snr;
pub mod stats;
pub mod uniformity;
pub mod watershed;

pub use acquisition::{AcquisitionKey, AcquisitionSet, AcquisitionUnit, ImageCategory};
pub use config::{AnalysisConfig, CoilConfig, CoilRegistry, ScaleFactor, ScaleFactorTable};
pub use error::{QcError, Result};
pub use metrology::{GroupValues, MetrologyEngine, MetrologyReport, UnitResult};
pub use raster::{Image, Mask};
pub use report::{build_tables, ResultRow, ResultTable};
pub use segmentation::{
    AutoAccept, Confirmer, Decision, MaskKind, MaskPreview, SegmentationEngine, SliceMasks,
    ThresholdPair,
};
pub use session::{AnalysisSession, SessionOutcome};
pub use snr::{NemaStatus, SnrMethod, SnrResult};

/// CoilQC library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
