//! Low-pass smoothing shared by segmentation and uniformity

use ndarray::Array2;

/// 3x3 binomial low-pass kernel, weights sum to one
pub const LOW_PASS_KERNEL: [[f64; 3]; 3] = [
    [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
    [2.0 / 16.0, 4.0 / 16.0, 2.0 / 16.0],
    [1.0 / 16.0, 2.0 / 16.0, 1.0 / 16.0],
];

/// Smooth `values` with [`LOW_PASS_KERNEL`]
///
/// Out-of-range taps are mirrored about the edge pixel without repeating it
/// (`reflect-101`: index -1 reads index 1).
pub fn low_pass(values: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = values.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut acc = 0.0;
        for (kr, kernel_row) in LOW_PASS_KERNEL.iter().enumerate() {
            let sr = reflect_101(r as isize + kr as isize - 1, rows);
            for (kc, weight) in kernel_row.iter().enumerate() {
                let sc = reflect_101(c as isize + kc as isize - 1, cols);
                acc += weight * values[[sr, sc]];
            }
        }
        acc
    })
}

#[inline]
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mirrored = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    mirrored.clamp(0, last) as usize
}
