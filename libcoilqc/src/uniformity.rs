//! IPEM Report 112 integral uniformity

use crate::error::{QcError, Result};
use crate::filter::low_pass;
use crate::raster::{Image, Mask};
use crate::segmentation::MaskKind;
use crate::stats::{masked_values, min_max, round2};

/// `1 - (max - min) / (max + min)` over the low-pass filtered phantom ROI
///
/// Rounded to two decimals. A perfectly flat ROI gives exactly 1.
pub fn integral_uniformity(image: &Image, phantom: &Mask) -> Result<f64> {
    image.check_mask(phantom)?;
    let filtered = low_pass(image.data());
    let roi = masked_values(&filtered, phantom);
    let (min, max) = min_max(&roi).ok_or(QcError::SegmentationDegenerate {
        slice: 0,
        mask: MaskKind::Phantom,
    })?;
    let total = max + min;
    if total <= 0.0 {
        return Err(QcError::NumericDomain(
            "phantom ROI has no signal; uniformity is undefined".to_string(),
        ));
    }
    Ok(round2(1.0 - (max - min) / total))
}
