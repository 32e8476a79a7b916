//! Image and mask containers
//!
//! Both wrap row-major `ndarray` arrays of shape `(rows, cols)`. Images are
//! immutable once built; masks are produced by segmentation and only ever
//! shrunk, grown or inverted into new masks.

use image::{GrayImage, ImageBuffer, Luma};
use ndarray::{Array2, Zip};

use crate::error::{QcError, Result};

/// A single magnitude image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array2<f64>,
}

impl Image {
    /// Wrap an array of signal intensities
    ///
    /// Samples must be finite and non-negative.
    pub fn new(data: Array2<f64>) -> Result<Self> {
        if data.is_empty() {
            return Err(QcError::InvalidImage("image has no pixels".to_string()));
        }
        if let Some(bad) = data.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(QcError::InvalidImage(format!(
                "sample {bad} is not a finite non-negative intensity"
            )));
        }
        Ok(Self { data })
    }

    /// Build an image from row-major samples
    pub fn from_vec(rows: usize, cols: usize, samples: Vec<f64>) -> Result<Self> {
        let found = samples.len();
        let data = Array2::from_shape_vec((rows, cols), samples).map_err(|_| {
            QcError::InvalidImage(format!(
                "{found} samples cannot fill a {rows}x{cols} image"
            ))
        })?;
        Self::new(data)
    }

    /// Build an image from a 16-bit grayscale buffer (e.g. an exported pixel array)
    pub fn from_luma16(buffer: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Result<Self> {
        let (width, height) = buffer.dimensions();
        let samples = buffer.pixels().map(|p| f64::from(p[0])).collect();
        Self::from_vec(height as usize, width as usize, samples)
    }

    /// Underlying samples
    pub const fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// `(rows, cols)`
    pub fn dims(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Largest sample in the image
    pub fn max_intensity(&self) -> f64 {
        self.data.iter().copied().fold(0.0, f64::max)
    }

    /// Fail unless `mask` was derived from an image of the same shape
    pub fn check_mask(&self, mask: &Mask) -> Result<()> {
        if self.dims() == mask.dims() {
            Ok(())
        } else {
            Err(QcError::DimensionMismatch {
                expected: self.dims(),
                found: mask.dims(),
            })
        }
    }
}

/// Binary pixel selection; `true` marks an included pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Array2<bool>,
}

impl Mask {
    pub const fn new(data: Array2<bool>) -> Self {
        Self { data }
    }

    /// Mask with every pixel set to `value`
    pub fn filled(dims: (usize, usize), value: bool) -> Self {
        Self::new(Array2::from_elem(dims, value))
    }

    pub const fn data(&self) -> &Array2<bool> {
        &self.data
    }

    pub fn dims(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Number of included pixels
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    #[must_use]
    pub fn invert(&self) -> Self {
        Self::new(self.data.mapv(|v| !v))
    }

    /// Shrink the mask by `iterations` pixels
    ///
    /// A pixel survives an iteration only when it and all eight neighbours are
    /// set in that iteration's input. Border pixels lack a full neighbourhood
    /// and never survive. Removed pixels are never restored.
    #[must_use]
    pub fn contract(&self, iterations: usize) -> Self {
        let mut current = self.clone();
        for _ in 0..iterations {
            current = current.contract_once();
        }
        current
    }

    fn contract_once(&self) -> Self {
        let (rows, cols) = self.dims();
        let mut out = Array2::from_elem((rows, cols), false);
        if rows < 3 || cols < 3 {
            return Self::new(out);
        }
        for r in 1..rows - 1 {
            for c in 1..cols - 1 {
                out[[r, c]] = self.full_neighbourhood(r, c);
            }
        }
        Self::new(out)
    }

    /// Grow the mask by `iterations` pixels
    ///
    /// Set pixels whose 3x3 neighbourhood is not fully set switch their whole
    /// neighbourhood on (clipped to the image).
    #[must_use]
    pub fn expand(&self, iterations: usize) -> Self {
        let mut current = self.clone();
        for _ in 0..iterations {
            current = current.expand_once();
        }
        current
    }

    fn expand_once(&self) -> Self {
        let (rows, cols) = self.dims();
        let mut out = Array2::from_elem((rows, cols), false);
        for ((r, c), &set) in self.data.indexed_iter() {
            if !set {
                continue;
            }
            if r > 0 && c > 0 && r + 1 < rows && c + 1 < cols && self.full_neighbourhood(r, c) {
                out[[r, c]] = true;
                continue;
            }
            for nr in r.saturating_sub(1)..=(r + 1).min(rows - 1) {
                for nc in c.saturating_sub(1)..=(c + 1).min(cols - 1) {
                    out[[nr, nc]] = true;
                }
            }
        }
        Self::new(out)
    }

    /// Caller guarantees `(r, c)` is an interior pixel
    fn full_neighbourhood(&self, r: usize, c: usize) -> bool {
        self.data
            .slice(ndarray::s![r - 1..=r + 1, c - 1..=c + 1])
            .iter()
            .all(|&v| v)
    }

    /// True when every pixel set here is also set in `other`
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.dims() == other.dims()
            && Zip::from(&self.data)
                .and(&other.data)
                .all(|&a, &b| !a || b)
    }

    /// True when no pixel is set in both masks
    pub fn is_disjoint_from(&self, other: &Self) -> bool {
        self.dims() == other.dims()
            && Zip::from(&self.data)
                .and(&other.data)
                .all(|&a, &b| !(a && b))
    }

    /// Render as a black/white 8-bit image for export
    pub fn to_luma8(&self) -> GrayImage {
        let (rows, cols) = self.dims();
        GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
            Luma([if self.data[[y as usize, x as usize]] { 255 } else { 0 }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(size: usize, start: usize, end: usize) -> Mask {
        let mut data = Array2::from_elem((size, size), false);
        data.slice_mut(ndarray::s![start..end, start..end]).fill(true);
        Mask::new(data)
    }

    #[test]
    fn test_image_rejects_negative_samples() {
        let err = Image::from_vec(1, 2, vec![1.0, -1.0]).unwrap_err();
        assert!(matches!(err, QcError::InvalidImage(_)));
    }

    #[test]
    fn test_image_rejects_wrong_sample_count() {
        assert!(Image::from_vec(2, 2, vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_image_from_luma16() {
        let buffer = ImageBuffer::from_fn(3, 2, |x, y| Luma([(x + 10 * y) as u16]));
        let image = Image::from_luma16(&buffer).unwrap();
        assert_eq!(image.dims(), (2, 3));
        assert_eq!(image.data()[[1, 2]], 12.0);
        assert_eq!(image.max_intensity(), 12.0);
    }

    #[test]
    fn test_contract_zero_is_identity() {
        let mask = square_mask(10, 2, 8);
        assert_eq!(mask.contract(0), mask);
    }

    #[test]
    fn test_contract_shrinks_by_one_ring() {
        let contracted = square_mask(10, 2, 8).contract(1);
        assert_eq!(contracted, square_mask(10, 3, 7));
    }

    #[test]
    fn test_contract_removes_border_pixels() {
        let full = Mask::filled((6, 6), true);
        let contracted = full.contract(1);
        assert_eq!(contracted.count(), 16);
        assert!(!contracted.data()[[0, 3]]);
        assert!(contracted.data()[[1, 1]]);
    }

    #[test]
    fn test_contract_small_mask_vanishes() {
        assert!(Mask::filled((2, 5), true).contract(1).is_empty());
        assert!(square_mask(10, 4, 6).contract(1).is_empty());
    }

    #[test]
    fn test_expand_grows_by_one_ring() {
        let expanded = square_mask(10, 3, 7).expand(1);
        assert_eq!(expanded, square_mask(10, 2, 8));
    }

    #[test]
    fn test_expand_clips_at_border() {
        let mut data = Array2::from_elem((4, 4), false);
        data[[0, 0]] = true;
        let expanded = Mask::new(data).expand(1);
        assert_eq!(expanded.count(), 4);
    }

    #[test]
    fn test_subset_and_disjoint() {
        let outer = square_mask(10, 2, 8);
        let inner = outer.contract(2);
        assert!(inner.is_subset_of(&outer));
        assert!(!outer.is_subset_of(&inner));
        assert!(outer.invert().is_disjoint_from(&outer));
        assert!(!inner.is_disjoint_from(&outer));
    }

    #[test]
    fn test_to_luma8() {
        let img = square_mask(4, 1, 3).to_luma8();
        assert_eq!(img.dimensions(), (4, 4));
        assert_eq!(img.get_pixel(1, 1)[0], 255);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
    }
}
