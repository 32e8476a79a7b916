//! Masked selection and summary statistics

use ndarray::{Array2, Zip};

use crate::raster::Mask;

/// Values of `values` where `mask` is set, in row-major order
///
/// Arrays must share a shape; callers check this through [`crate::Image::check_mask`].
pub fn masked_values(values: &Array2<f64>, mask: &Mask) -> Vec<f64> {
    let mut out = Vec::with_capacity(mask.count());
    Zip::from(values).and(mask.data()).for_each(|&v, &m| {
        if m {
            out.push(v);
        }
    });
    out
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (no Bessel correction)
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Round to two decimal places
///
/// Rounds the exact binary value, so `2.675` (stored just below the tie)
/// goes down, and exact ties go to the even digit.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.2}").parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_values_row_major() {
        let values = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mask = Mask::new(
            Array2::from_shape_vec((2, 2), vec![false, true, true, false]).unwrap(),
        );
        assert_eq!(masked_values(&values, &mask), vec![2.0, 3.0]);
    }

    #[test]
    fn test_population_std() {
        let sd = std_dev(&[2.0, 18.0]).unwrap();
        assert!((sd - 8.0).abs() < 1e-12);
        assert_eq!(mean(&[2.0, 18.0]), Some(10.0));
    }

    #[test]
    fn test_empty_statistics() {
        assert_eq!(mean(&[]), None);
        assert_eq!(std_dev(&[]), None);
        assert_eq!(min_max(&[]), None);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min_max(&[3.0, -1.0, 7.5]), Some((-1.0, 7.5)));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(366.737_1), 366.74);
        assert_eq!(round2(0.994), 0.99);
        assert_eq!(round2(-1.236), -1.24);
    }

    #[test]
    fn test_round2_uses_exact_binary_value() {
        assert_eq!(round2((12.34 + 12.35) / 2.0), 12.34);
        assert_eq!(round2((50.05 + 50.06) / 2.0), 50.05);
        assert_eq!(round2((0.12 + 0.13) / 2.0), 0.12);
        assert_eq!(round2(2.675), 2.67);
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert!(round2(f64::NAN).is_nan());
    }
}
