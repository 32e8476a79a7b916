use thiserror::Error;

use crate::segmentation::MaskKind;

/// Result type for CoilQC operations
pub type Result<T> = std::result::Result<T, QcError>;

/// Errors that can occur while segmenting phantoms or measuring coil performance
#[derive(Error, Debug)]
pub enum QcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No noise scale factors defined for {element_count} elements")]
    UnknownElementCount { element_count: u32 },

    #[error("Expected {expected} {what}, found {found}")]
    CountMismatch {
        what: String,
        expected: usize,
        found: usize,
    },

    #[error("{mask} mask is empty for slice {slice}")]
    SegmentationDegenerate { slice: u32, mask: MaskKind },

    #[error("No masks available for slice {slice}")]
    MissingMasks { slice: u32 },

    #[error("No combined image available to segment slice {slice}")]
    MissingReference { slice: u32 },

    #[error("Numeric domain error: {0}")]
    NumericDomain(String),

    #[error("Dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid image data: {0}")]
    InvalidImage(String),

    #[error("Duplicate acquisition: {0}")]
    DuplicateAcquisition(String),

    #[error("Invalid acquisition: {0}")]
    InvalidAcquisition(String),

    #[error("Mask confirmation failed: {0}")]
    Confirmation(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

impl QcError {
    /// Returns true if this error comes from the coil or analysis configuration
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownElementCount { .. }
                | Self::CountMismatch { .. }
                | Self::ConfigParse(_)
        )
    }

    /// Attribute a degenerate-mask error to `slice`
    #[must_use]
    pub fn at_slice(self, slice: u32) -> Self {
        match self {
            Self::SegmentationDegenerate { mask, .. } => Self::SegmentationDegenerate { slice, mask },
            other => other,
        }
    }

    /// Returns true if this error must abort the analysis session
    ///
    /// Configuration faults and degenerate masks point at a thresholding,
    /// positioning or setup problem the operator has to look at.
    pub const fn is_fatal(&self) -> bool {
        self.is_configuration_error()
            || matches!(
                self,
                Self::SegmentationDegenerate { .. }
                    | Self::MissingMasks { .. }
                    | Self::MissingReference { .. }
            )
    }
}
